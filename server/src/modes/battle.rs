use crate::context::Context;
use crate::error::GameError;
use crate::host::Collaborators;
use crate::lifecycle::{
    abort_run, announce_and_finish, forfeit, reset_participant, start_run, RunLifecycle,
};
use crate::model::{RunId, RunVariant};
use crate::negotiation::{
    team_pair, validate_new_request, ChallengeProtocol, PendingRequest, RequestTable,
};
use crate::timers::RequestKind;
use log::info;
use shared::{GameMode, PlayerId};

/// Head-to-head races, one versus one or two versus two.
///
/// A challenge turns into a two-versus-two when both principals picked a
/// teammate beforehand and all four players are still free when the
/// challenge is accepted; otherwise it falls back to a one-versus-one.
#[derive(Debug)]
pub struct BattleMode {
    requests: RequestTable,
}

impl Default for BattleMode {
    fn default() -> Self {
        Self::new()
    }
}

impl BattleMode {
    pub fn new() -> Self {
        Self {
            requests: RequestTable::new(GameMode::Battle, RequestKind::Invite),
        }
    }

    pub fn requests(&self) -> &RequestTable {
        &self.requests
    }

    /// Picks (or with `None`, clears) the teammate used for the next
    /// team battle.
    pub fn select_teammate<H: Collaborators>(
        &mut self,
        ctx: &mut Context<H>,
        player: PlayerId,
        mate: Option<PlayerId>,
    ) -> Result<(), GameError> {
        let Some(mate) = mate else {
            if ctx.teammates.remove(&player).is_some() {
                ctx.notify(player, "Teammate cleared.");
            } else {
                ctx.notify(player, "You have no teammate selected.");
            }
            return Ok(());
        };

        if mate == player {
            return Err(GameError::SelfTeammate);
        }
        if !ctx.host.is_online(mate) {
            return Err(GameError::UnknownPlayer(ctx.name(mate)));
        }
        if ctx.in_run(mate) {
            return Err(GameError::TargetInRun(ctx.name(mate)));
        }

        ctx.teammates.insert(player, mate);
        let mate_name = ctx.name(mate);
        let player_name = ctx.name(player);
        ctx.notify(
            player,
            &format!("{} will be your teammate in your next battle.", mate_name),
        );
        ctx.notify(
            mate,
            &format!("{} picked you as their battle teammate.", player_name),
        );
        Ok(())
    }

    /// Forgets everything `player` had pending.
    pub fn on_quit<H: Collaborators>(&mut self, ctx: &mut Context<H>, player: PlayerId) {
        for request in self.requests.remove_involving(ctx, player) {
            let other = if request.initiator == player {
                request.target
            } else {
                request.initiator
            };
            let text = format!("{} left, the battle request was cancelled.", ctx.name(player));
            ctx.notify(other, &text);
        }
    }
}

impl RunLifecycle for BattleMode {
    fn mode(&self) -> GameMode {
        GameMode::Battle
    }

    /// Starting a battle means accepting the challenge addressed to you.
    fn start<H: Collaborators>(
        &mut self,
        ctx: &mut Context<H>,
        initiator: PlayerId,
    ) -> Result<(), GameError> {
        self.accept(ctx, initiator)
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
        let run = ctx
            .registry
            .get_active_run(winner)
            .ok_or(GameError::NotInRun)?;
        let id = run.id;
        let winners = run.side_of(winner);
        let losers = run.opponents_of(winner);
        announce_and_finish(ctx, id, &winners, &losers)
    }

    fn abort<H: Collaborators>(
        &mut self,
        ctx: &mut Context<H>,
        run: RunId,
        initiator: Option<PlayerId>,
        reason: Option<&str>,
    ) {
        let leaver = initiator.filter(|player| {
            ctx.registry.run(run).is_some_and(|r| {
                r.contains(*player) && r.variant.is_adversarial() && !r.state.is_terminal()
            })
        });

        match leaver {
            Some(leaver) => forfeit(ctx, run, leaver, reason),
            None => abort_run(ctx, run, reason),
        }
    }
}

impl ChallengeProtocol for BattleMode {
    fn request<H: Collaborators>(
        &mut self,
        ctx: &mut Context<H>,
        initiator: PlayerId,
        target: PlayerId,
    ) -> Result<(), GameError> {
        validate_new_request(ctx, initiator, target)?;
        self.requests.check_free(ctx, initiator, target)?;

        let team = team_pair(ctx, initiator, target);
        self.requests.insert(ctx, initiator, target, team.is_some());

        let initiator_name = ctx.name(initiator);
        let target_name = ctx.name(target);
        match team {
            Some((initiator_mate, target_mate)) => {
                let initiator_mate_name = ctx.name(initiator_mate);
                let target_mate_name = ctx.name(target_mate);
                ctx.notify(
                    initiator,
                    &format!(
                        "Team battle request sent to {} ({} with you, {} with them).",
                        target_name, initiator_mate_name, target_mate_name
                    ),
                );
                ctx.notify(
                    target,
                    &format!(
                        "{} and {} challenged you and {} to a team battle! Type 'battle accept' or 'battle decline'.",
                        initiator_name, initiator_mate_name, target_mate_name
                    ),
                );
                ctx.notify(
                    initiator_mate,
                    &format!("{} challenged {} to a team battle with you.", initiator_name, target_name),
                );
                ctx.notify(
                    target_mate,
                    &format!("{} challenged {} to a team battle with you.", initiator_name, target_name),
                );
            }
            None => {
                ctx.notify(initiator, &format!("Battle request sent to {}.", target_name));
                ctx.notify(
                    target,
                    &format!(
                        "{} challenged you to a battle! Type 'battle accept' or 'battle decline'.",
                        initiator_name
                    ),
                );
            }
        }
        Ok(())
    }

    fn accept<H: Collaborators>(
        &mut self,
        ctx: &mut Context<H>,
        target: PlayerId,
    ) -> Result<(), GameError> {
        let request = self.requests.pop_and_validate(ctx, target)?;
        let initiator = request.initiator;

        if request.team_invite {
            if let Some((initiator_mate, target_mate)) = team_pair(ctx, initiator, target) {
                start_run(
                    ctx,
                    GameMode::Battle,
                    RunVariant::TeamDuel,
                    vec![initiator, initiator_mate, target, target_mate],
                )?;
                return Ok(());
            }

            info!("Team battle {} vs {} falls back to 1v1", initiator, target);
            ctx.notify_all(
                &[initiator, target],
                "A teammate is no longer available, starting a 1v1 battle instead.",
            );
        }

        start_run(ctx, GameMode::Battle, RunVariant::Duel, vec![initiator, target])?;
        Ok(())
    }

    fn decline<H: Collaborators>(
        &mut self,
        ctx: &mut Context<H>,
        target: PlayerId,
    ) -> Result<(), GameError> {
        let request = self
            .requests
            .pop(ctx, target)
            .ok_or(GameError::NoPendingRequest)?;

        let initiator_name = ctx.name(request.initiator);
        let target_name = ctx.name(target);
        ctx.notify(
            target,
            &format!("You declined the battle request from {}.", initiator_name),
        );
        ctx.notify(
            request.initiator,
            &format!("{} declined your battle request.", target_name),
        );
        let mates = teammates_of(ctx, &request);
        ctx.notify_all(
            &mates,
            &format!("{} declined the team battle against {}.", target_name, initiator_name),
        );
        Ok(())
    }

    fn expire<H: Collaborators>(
        &mut self,
        ctx: &mut Context<H>,
        _kind: RequestKind,
        target: PlayerId,
        request_id: u64,
    ) {
        let Some(request) = self.requests.expire(target, request_id) else {
            return;
        };

        let initiator_name = ctx.name(request.initiator);
        let target_name = ctx.name(target);
        ctx.notify(
            request.initiator,
            &format!("Your battle request to {} expired.", target_name),
        );
        ctx.notify(
            target,
            &format!("The battle request from {} expired.", initiator_name),
        );
        let mates = teammates_of(ctx, &request);
        ctx.notify_all(
            &mates,
            &format!(
                "The team battle request from {} to {} expired.",
                initiator_name, target_name
            ),
        );
    }
}

/// Selected teammates of both principals of a team invite.
fn teammates_of<H: Collaborators>(ctx: &Context<H>, request: &PendingRequest) -> Vec<PlayerId> {
    if !request.team_invite {
        return Vec::new();
    }
    [request.initiator, request.target]
        .iter()
        .filter_map(|principal| ctx.teammates.get(principal).copied())
        .collect()
}
