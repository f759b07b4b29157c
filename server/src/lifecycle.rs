//! Run lifecycle shared by every mode.
//!
//! A run moves through `Provisioning -> Countdown -> Running` and ends either
//! `Finished` (someone won) or `Aborted`. Resets pass through
//! `Reprovisioning` when they regenerate every world of the run. The free
//! functions here implement those transitions; the modes decide who wins and
//! who may trigger what.

use crate::context::Context;
use crate::error::GameError;
use crate::host::Collaborators;
use crate::model::{RunId, RunState, RunVariant, Speedrun, WorldSet};
use crate::provisioning::{ProvisionPurpose, ProvisionTicket, ProvisionedWorlds};
use crate::seeds::SeedCategory;
use crate::timers::Scheduled;
use log::{debug, info, warn};
use shared::{duration_millis, format_elapsed, Action, GameMode, PlayerId};
use std::time::Duration;

/// Operations every mode supports on runs it owns.
pub trait RunLifecycle {
    fn mode(&self) -> GameMode;

    fn start<H: Collaborators>(
        &mut self,
        ctx: &mut Context<H>,
        initiator: PlayerId,
    ) -> Result<(), GameError>;

    fn reset<H: Collaborators>(
        &mut self,
        _ctx: &mut Context<H>,
        _participant: PlayerId,
    ) -> Result<(), GameError> {
        Err(GameError::UnsupportedAction {
            mode: self.mode(),
            action: Action::Reset,
        })
    }

    /// Ends the run of `winner` as a win.
    fn stop<H: Collaborators>(
        &mut self,
        ctx: &mut Context<H>,
        winner: PlayerId,
    ) -> Result<(), GameError>;

    /// Ends `run` without a regular winner and removes it from the registry
    /// right away. `initiator` is the participant who caused the abort, if
    /// any.
    fn abort<H: Collaborators>(
        &mut self,
        ctx: &mut Context<H>,
        run: RunId,
        _initiator: Option<PlayerId>,
        reason: Option<&str>,
    ) {
        abort_run(ctx, run, reason);
    }
}

/// Creates and registers a run, then asks for its worlds.
///
/// Callers validate eligibility with their own messages first; this only
/// guards the registry invariant.
pub fn start_run<H: Collaborators>(
    ctx: &mut Context<H>,
    mode: GameMode,
    variant: RunVariant,
    players: Vec<PlayerId>,
) -> Result<RunId, GameError> {
    if let Some(taken) = players.iter().find(|p| ctx.in_run(**p)) {
        return Err(GameError::ParticipantConflict(*taken));
    }

    let id = ctx.registry.next_run_id();
    let entries = players
        .iter()
        .map(|p| (*p, ctx.host.capture_state(*p)))
        .collect();
    let run = Speedrun::new(id, mode, variant, entries);
    let representatives: Vec<PlayerId> = run
        .world_groups()
        .iter()
        .filter_map(|group| group.first().copied())
        .collect();

    ctx.register_run(run)?;

    let choice = ctx.seeds.select_seed(&mut ctx.rng);
    ctx.notify_all(&players, "Creating the world...");
    if choice.category != SeedCategory::Random {
        let text = format!("Seed category: {}", choice.category);
        ctx.notify_all(&players, &text);
    }

    info!(
        "Starting {} run {} ({:?}) for players {:?}",
        mode, id, variant, players
    );
    ctx.request_worlds(id, ProvisionPurpose::Start, representatives, choice.seed);
    Ok(id)
}

/// Regenerates the worlds of `participant`'s world group from the run's seed.
///
/// Only a reset covering every world of the run pauses the run as a whole;
/// otherwise the rest of the run keeps going.
pub fn reset_participant<H: Collaborators>(
    ctx: &mut Context<H>,
    participant: PlayerId,
) -> Result<(), GameError> {
    let run = ctx
        .registry
        .get_active_run_mut(participant)
        .ok_or(GameError::NotInRun)?;
    if run.state != RunState::Running {
        return Err(GameError::RunNotRunning);
    }

    let group = run.world_group_of(participant);
    if group
        .iter()
        .any(|p| run.runner(*p).is_some_and(|r| r.resetting))
    {
        return Err(GameError::RunNotRunning);
    }

    let whole_run = run.world_groups().len() == 1;
    for player in &group {
        if let Some(runner) = run.runner_mut(*player) {
            runner.resetting = true;
            runner.clear_throws();
        }
    }
    if whole_run {
        run.state = RunState::Reprovisioning;
    }

    let id = run.id;
    let seed = run.seed();
    let representative = group.first().copied().unwrap_or(participant);

    ctx.notify_all(&group, "Resetting the world...");
    ctx.request_worlds(
        id,
        ProvisionPurpose::Reset {
            players: group.clone(),
        },
        vec![representative],
        seed,
    );
    Ok(())
}

fn delete_all<H: Collaborators>(ctx: &mut Context<H>, worlds: &ProvisionedWorlds) {
    for owner in worlds.owners() {
        if let Some(set) = worlds.world_sets.get(&owner) {
            ctx.host.delete_worlds(set);
        }
    }
}

/// Applies finished world creation to its run.
///
/// Worlds for tickets nobody waits for anymore, or for runs that ended in the
/// meantime, are deleted again. Returns the run to abort when the worlds came
/// back incomplete.
pub fn complete_provisioning<H: Collaborators>(
    ctx: &mut Context<H>,
    worlds: ProvisionedWorlds,
) -> Option<RunId> {
    let Some(pending) = ctx.take_provision(worlds.ticket) else {
        debug!("Discarding worlds for stale ticket {}", worlds.ticket.0);
        delete_all(ctx, &worlds);
        return None;
    };

    let run_id = pending.run;
    let Some(run) = ctx.registry.run_mut(run_id) else {
        debug!("Run {} ended before its worlds were ready", run_id);
        delete_all(ctx, &worlds);
        return None;
    };
    if run.state.is_terminal() {
        delete_all(ctx, &worlds);
        return None;
    }

    if pending
        .representatives
        .iter()
        .any(|rep| !worlds.world_sets.contains_key(rep))
    {
        warn!("Ticket {} returned incomplete worlds", worlds.ticket.0);
        delete_all(ctx, &worlds);
        return Some(run_id);
    }

    match pending.purpose {
        ProvisionPurpose::Start => {
            if run.state != RunState::Provisioning {
                delete_all(ctx, &worlds);
                return None;
            }
            run.set_seed(worlds.seed);

            let mut placements: Vec<(PlayerId, WorldSet)> = Vec::new();
            for group in run.world_groups() {
                let Some(set) = group.first().and_then(|rep| worlds.world_sets.get(rep)) else {
                    continue;
                };
                for player in group {
                    placements.push((player, set.clone()));
                }
            }
            for (player, set) in &placements {
                if let Some(runner) = run.runner_mut(*player) {
                    runner.world_set = Some(set.clone());
                    runner.frozen = true;
                }
            }
            run.state = RunState::Countdown;

            for (player, set) in &placements {
                ctx.host.set_frozen(*player, true);
                ctx.host.teleport_to_spawn(*player, set);
                ctx.host.reset_state(*player);
            }

            info!("Run {} worlds ready (seed {})", run_id, worlds.seed);
            let countdown = ctx.config.countdown_seconds;
            countdown_step(ctx, run_id, countdown);
        }
        ProvisionPurpose::Reset { players } => {
            if !matches!(run.state, RunState::Running | RunState::Reprovisioning) {
                delete_all(ctx, &worlds);
                return None;
            }
            let Some(set) = players.first().and_then(|rep| worlds.world_sets.get(rep)) else {
                delete_all(ctx, &worlds);
                return None;
            };

            let mut stale: Vec<WorldSet> = Vec::new();
            for player in &players {
                if let Some(runner) = run.runner_mut(*player) {
                    if let Some(old) = runner.world_set.replace(set.clone()) {
                        if !stale.contains(&old) {
                            stale.push(old);
                        }
                    }
                    runner.resetting = false;
                }
            }
            if run.state == RunState::Reprovisioning {
                run.state = RunState::Running;
            }

            let set = set.clone();
            for player in &players {
                ctx.host.teleport_to_spawn(*player, &set);
                ctx.host.reset_state(*player);
            }
            ctx.notify_all(&players, "The world has been reset!");
            for old in &stale {
                ctx.host.delete_worlds(old);
            }
        }
    }
    None
}

/// Drops a failed provisioning request. Returns the run that now has to be
/// aborted, if it is still waiting on this ticket.
pub fn fail_provisioning<H: Collaborators>(
    ctx: &mut Context<H>,
    ticket: ProvisionTicket,
    reason: &str,
) -> Option<RunId> {
    let pending = ctx.take_provision(ticket)?;
    warn!(
        "World creation for run {} failed: {}",
        pending.run, reason
    );
    ctx.registry.run(pending.run).map(|run| run.id)
}

/// One second of the pre-start countdown. At zero every participant is
/// released and the shared stopwatch starts.
pub fn countdown_step<H: Collaborators>(ctx: &mut Context<H>, run_id: RunId, remaining: u32) {
    let Some(run) = ctx.registry.run(run_id) else {
        return;
    };
    if run.state != RunState::Countdown {
        return;
    }
    let players = run.participants();

    if remaining > 0 {
        ctx.title_all(&players, &remaining.to_string(), "Get ready!");
        ctx.timers.schedule(
            Duration::from_secs(1),
            Scheduled::Countdown {
                run: run_id,
                remaining: remaining - 1,
            },
        );
        return;
    }

    let now = ctx.now();
    let Some(run) = ctx.registry.run_mut(run_id) else {
        return;
    };
    for runner in run.runners_mut() {
        runner.frozen = false;
    }
    run.state = RunState::Running;
    run.stopwatch.start(now);
    let stopwatch = run.stopwatch.clone();

    for player in &players {
        ctx.host.set_frozen(*player, false);
    }
    ctx.title_all(&players, "Go!", "");
    ctx.host.start_timer_display(&players, &stopwatch);
    info!("Run {} is running", run_id);
}

fn join_names<H: Collaborators>(ctx: &Context<H>, players: &[PlayerId]) -> String {
    players
        .iter()
        .map(|p| ctx.name(*p))
        .collect::<Vec<_>>()
        .join(" & ")
}

/// Marks a running run as won by `winners`, announces the result and
/// schedules the teardown. The run stays registered until then.
pub fn announce_and_finish<H: Collaborators>(
    ctx: &mut Context<H>,
    run_id: RunId,
    winners: &[PlayerId],
    losers: &[PlayerId],
) -> Result<(), GameError> {
    let now = ctx.now();
    let run = ctx.registry.run_mut(run_id).ok_or(GameError::NotInRun)?;
    if run.state != RunState::Running {
        return Err(GameError::RunNotRunning);
    }

    run.state = RunState::Finished;
    run.stopwatch.stop(now);
    let millis = duration_millis(run.stopwatch.elapsed(now));
    let time = format_elapsed(millis);

    let names = join_names(ctx, winners);
    ctx.title_all(winners, "You won!", &time);
    let subtitle = format!("{} won in {}", names, time);
    ctx.title_all(losers, "You lost!", &subtitle);

    let mut everyone = winners.to_vec();
    everyone.extend_from_slice(losers);
    let text = format!("{} finished the run in {}", names, time);
    ctx.notify_all(&everyone, &text);

    info!("Run {} finished by {} in {}", run_id, names, time);
    let delay = ctx.config.finish_delay();
    ctx.schedule_teardown(run_id, delay);
    Ok(())
}

/// Ends a run immediately: no winner, teardown right away.
///
/// A finished run is left alone: its teardown is already scheduled and the
/// finish delay runs out even when a participant leaves in the meantime.
pub fn abort_run<H: Collaborators>(ctx: &mut Context<H>, run_id: RunId, reason: Option<&str>) {
    let now = ctx.now();
    let Some(run) = ctx.registry.run_mut(run_id) else {
        return;
    };
    if run.state == RunState::Finished {
        debug!(
            "Run {} already finished, teardown stays scheduled ({})",
            run_id,
            reason.unwrap_or("no reason")
        );
        return;
    }
    run.state = RunState::Aborted;
    run.stopwatch.stop(now);
    let players = run.participants();

    let text = match reason {
        Some(reason) => format!("The run was aborted: {}", reason),
        None => "The run was aborted.".to_string(),
    };
    ctx.notify_all(&players, &text);

    info!("Aborting run {} ({})", run_id, reason.unwrap_or("no reason"));
    ctx.cancel_teardown(run_id);
    if let Some(run) = ctx.take_run(run_id) {
        ctx.teardown(run);
    }
}

/// Ends an adversarial run because `leaver` gave up. The opposing side is
/// announced as the winner; no finishing time is recorded. The run leaves the
/// registry right away while teardown waits for the usual finish delay.
pub fn forfeit<H: Collaborators>(
    ctx: &mut Context<H>,
    run_id: RunId,
    leaver: PlayerId,
    reason: Option<&str>,
) {
    let now = ctx.now();
    let Some(run) = ctx.registry.run_mut(run_id) else {
        return;
    };
    if run.state.is_terminal() {
        abort_run(ctx, run_id, reason);
        return;
    }

    let winners = run.opponents_of(leaver);
    let losers = run.side_of(leaver);
    run.state = RunState::Aborted;
    run.stopwatch.stop(now);

    let leaver_name = ctx.name(leaver);
    let winner_names = join_names(ctx, &winners);
    let subtitle = match reason {
        Some(reason) => reason.to_string(),
        None => format!("{} forfeited", leaver_name),
    };
    ctx.title_all(&winners, "You won!", &subtitle);
    ctx.title_all(&losers, "Run aborted", &subtitle);

    let mut everyone = winners.clone();
    everyone.extend_from_slice(&losers);
    let text = format!("{} forfeited, {} win by default!", leaver_name, winner_names);
    ctx.notify_all(&everyone, &text);

    info!("Run {} forfeited by {}", run_id, leaver_name);
    ctx.retire(run_id);
    let delay = ctx.config.finish_delay();
    ctx.schedule_teardown(run_id, delay);
}

/// Scheduled teardown of a finished or forfeited run.
pub fn finish_run<H: Collaborators>(ctx: &mut Context<H>, run_id: RunId) {
    if let Some(run) = ctx.take_run(run_id) {
        ctx.teardown(run);
    }
}
