use crate::context::Context;
use crate::error::GameError;
use crate::host::Collaborators;
use crate::lifecycle::{announce_and_finish, reset_participant, start_run, RunLifecycle};
use crate::model::RunVariant;
use shared::{GameMode, PlayerId};

/// Single-player runs against the clock.
#[derive(Debug, Default)]
pub struct SoloMode;

impl RunLifecycle for SoloMode {
    fn mode(&self) -> GameMode {
        GameMode::Solo
    }

    fn start<H: Collaborators>(
        &mut self,
        ctx: &mut Context<H>,
        initiator: PlayerId,
    ) -> Result<(), GameError> {
        if ctx.in_run(initiator) {
            return Err(GameError::AlreadyInRun);
        }
        start_run(ctx, GameMode::Solo, RunVariant::Solo, vec![initiator])?;
        Ok(())
    }

    fn reset<H: Collaborators>(
        &mut self,
        ctx: &mut Context<H>,
        participant: PlayerId,
    ) -> Result<(), GameError> {
        reset_participant(ctx, participant)
    }

    fn stop<H: Collaborators>(
        &mut self,
        ctx: &mut Context<H>,
        winner: PlayerId,
    ) -> Result<(), GameError> {
        let run = ctx.registry.run_id_of(winner).ok_or(GameError::NotInRun)?;
        announce_and_finish(ctx, run, &[winner], &[])
    }
}
