//! Engine facade: commands, player events, collaborator callbacks and time.

use crate::config::GameConfig;
use crate::context::Context;
use crate::error::GameError;
use crate::host::Collaborators;
use crate::leaderboard::Leaderboard;
use crate::lifecycle::{self, RunLifecycle};
use crate::model::{RunId, RunState};
use crate::modes::{BattleMode, CoopMode, SoloMode};
use crate::negotiation::ChallengeProtocol;
use crate::provisioning::{ProvisionTicket, ProvisionedWorlds};
use crate::registry::RunRegistry;
use crate::seeds::{SeedCatalog, SeedCategory, SeedFetchOutcome, SeedFetchRequest};
use crate::timers::Scheduled;
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use shared::triangulation::{triangulate, ThrowEvent, Triangulation};
use shared::{duration_millis, format_elapsed, Action, GameMode, PlayerId, Vec3};
use std::collections::{HashMap, HashSet};
use std::time::Duration;

const HELP: &[&str] = &[
    "solo start | solo reset | solo stop",
    "battle request <player> | battle accept | battle decline | battle team [player] | battle reset | battle stop",
    "coop request <player> | coop accept | coop decline | coop start | coop duel <leader> | coop stop",
    "leaderboard",
    "admin stop [player] | admin seed <category> <amount>",
];

/// Arguments of a mode command after the action word.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandArgs {
    pub mode: GameMode,
    pub target: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Mode { action: Action, args: CommandArgs },
    AdminStop { target: Option<String> },
    AdminSeed { category: SeedCategory, amount: u32 },
    Leaderboard,
    Help,
}

/// Parses a chat command such as `battle request bob` or `/solo start`.
pub fn parse_command(line: &str) -> Result<Command, GameError> {
    let line = line.trim().trim_start_matches('/');
    let mut words = line.split_whitespace();
    let Some(head) = words.next() else {
        return Ok(Command::Help);
    };

    match head.to_ascii_lowercase().as_str() {
        "help" => Ok(Command::Help),
        "leaderboard" | "top" => Ok(Command::Leaderboard),
        "admin" => match words.next().map(|w| w.to_ascii_lowercase()).as_deref() {
            Some("stop") => Ok(Command::AdminStop {
                target: words.next().map(str::to_string),
            }),
            Some("seed") => {
                const USAGE: &str = "admin seed <category> <amount>";
                let category = words.next().ok_or(GameError::Usage(USAGE))?.parse()?;
                let amount = words
                    .next()
                    .and_then(|w| w.parse().ok())
                    .ok_or(GameError::Usage(USAGE))?;
                Ok(Command::AdminSeed { category, amount })
            }
            _ => Err(GameError::Usage("admin stop [player] | admin seed <category> <amount>")),
        },
        other => {
            let mode: GameMode = other
                .parse()
                .map_err(|_| GameError::UnknownCommand(head.to_string()))?;
            let action: Action = words
                .next()
                .ok_or(GameError::Usage("<mode> <action> [player]"))?
                .parse()
                .map_err(|_| GameError::Usage("<mode> <action> [player]"))?;
            Ok(Command::Mode {
                action,
                args: CommandArgs {
                    mode,
                    target: words.next().map(str::to_string),
                },
            })
        }
    }
}

pub type CommandHandler<H> = fn(&mut Game<H>, PlayerId, &CommandArgs) -> Result<(), GameError>;

fn command_table<H: Collaborators>() -> HashMap<Action, CommandHandler<H>> {
    let mut table: HashMap<Action, CommandHandler<H>> = HashMap::new();
    table.insert(Action::Start, |game, actor, args| game.start(args.mode, actor));
    table.insert(Action::Reset, |game, actor, args| game.reset(args.mode, actor));
    table.insert(Action::Stop, |game, actor, _| game.stop(actor));
    table.insert(Action::Request, |game, actor, args| {
        let target = game.resolve_target(args)?;
        game.request(args.mode, actor, target)
    });
    table.insert(Action::Accept, |game, actor, args| game.accept(args.mode, actor));
    table.insert(Action::Decline, |game, actor, args| game.decline(args.mode, actor));
    table.insert(Action::Team, |game, actor, args| {
        let mate = match args.target {
            Some(_) => Some(game.resolve_target(args)?),
            None => None,
        };
        game.select_teammate(actor, mate)
    });
    table.insert(Action::Duel, |game, actor, args| {
        let target = game.resolve_target(args)?;
        game.coop_duel(actor, target)
    });
    table
}

/// The run engine.
///
/// Owns every piece of run state and is driven entirely from outside:
/// commands and player events from the host, completion callbacks from the
/// world provisioner and the seed fetcher, and clock advances from the tick
/// loop. Nothing runs concurrently with a call into the engine.
pub struct Game<H: Collaborators> {
    ctx: Context<H>,
    solo: SoloMode,
    battle: BattleMode,
    coop: CoopMode,
    handlers: HashMap<Action, CommandHandler<H>>,
    admins: HashSet<PlayerId>,
}

impl<H: Collaborators> Game<H> {
    pub fn new(config: GameConfig, host: H) -> Self {
        let leaderboard = Leaderboard::new(config.leaderboard_size);
        Self::with_stores(config, host, SeedCatalog::new(), leaderboard)
    }

    pub fn with_stores(
        config: GameConfig,
        host: H,
        seeds: SeedCatalog,
        leaderboard: Leaderboard,
    ) -> Self {
        Self {
            ctx: Context::new(config, host, seeds, leaderboard),
            solo: SoloMode,
            battle: BattleMode::new(),
            coop: CoopMode::new(),
            handlers: command_table(),
            admins: HashSet::new(),
        }
    }

    /// Makes seed selection reproducible.
    pub fn seed_rng(&mut self, seed: u64) {
        self.ctx.rng = StdRng::seed_from_u64(seed);
    }

    pub fn host(&self) -> &H {
        &self.ctx.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.ctx.host
    }

    pub fn registry(&self) -> &RunRegistry {
        &self.ctx.registry
    }

    pub fn leaderboard(&self) -> &Leaderboard {
        &self.ctx.leaderboard
    }

    pub fn seeds(&self) -> &SeedCatalog {
        &self.ctx.seeds
    }

    pub fn config(&self) -> &GameConfig {
        &self.ctx.config
    }

    pub fn battle(&self) -> &BattleMode {
        &self.battle
    }

    pub fn coop(&self) -> &CoopMode {
        &self.coop
    }

    pub fn teammate_of(&self, player: PlayerId) -> Option<PlayerId> {
        self.ctx.teammates.get(&player).copied()
    }

    pub fn now(&self) -> Duration {
        self.ctx.now()
    }

    pub fn grant_admin(&mut self, player: PlayerId) {
        self.admins.insert(player);
    }

    pub fn is_in_run(&self, player: PlayerId) -> bool {
        self.ctx.in_run(player)
    }

    pub fn is_action_allowed_during_run(&self, mode: GameMode, action: Action) -> bool {
        mode.is_action_allowed_during_run(action)
    }

    /// Runs one chat command for `actor`. A rejection is reported to the
    /// actor and returned.
    pub fn execute(&mut self, actor: PlayerId, line: &str) -> Result<(), GameError> {
        let now = self.now();
        self.ctx.registry.afk_mut().record_activity(actor, now);

        let result = parse_command(line).and_then(|command| self.dispatch(actor, command));
        if let Err(e) = &result {
            debug!("Command '{}' from {} rejected: {}", line.trim(), actor, e);
            self.ctx.notify(actor, &e.to_string());
        }
        result
    }

    fn dispatch(&mut self, actor: PlayerId, command: Command) -> Result<(), GameError> {
        match command {
            Command::Mode { action, args } => {
                if !args.mode.supports(action) {
                    return Err(GameError::UnsupportedAction {
                        mode: args.mode,
                        action,
                    });
                }
                self.check_run_commands(actor, args.mode, action)?;

                let handler = *self.handlers.get(&action).ok_or(GameError::UnsupportedAction {
                    mode: args.mode,
                    action,
                })?;
                handler(self, actor, &args)
            }
            Command::AdminStop { target } => {
                self.require_admin(actor)?;
                let target = match target {
                    Some(name) => Some(
                        self.ctx
                            .host
                            .find_player(&name)
                            .ok_or(GameError::UnknownPlayer(name))?,
                    ),
                    None => None,
                };
                self.admin_stop(actor, target)
            }
            Command::AdminSeed { category, amount } => {
                self.require_admin(actor)?;
                self.request_additional_seeds(Some(actor), category, amount)
            }
            Command::Leaderboard => {
                self.show_leaderboard(actor);
                Ok(())
            }
            Command::Help => {
                for line in HELP {
                    self.ctx.notify(actor, line);
                }
                Ok(())
            }
        }
    }

    /// Participants may only use the commands their run's mode allows while
    /// running, and none at all while frozen.
    fn check_run_commands(
        &self,
        actor: PlayerId,
        mode: GameMode,
        action: Action,
    ) -> Result<(), GameError> {
        let Some(run) = self.ctx.registry.get_active_run(actor) else {
            return Ok(());
        };
        if run.runner(actor).is_some_and(|r| r.frozen) {
            return Err(GameError::Frozen);
        }
        if run.mode != mode || !self.is_action_allowed_during_run(mode, action) {
            return Err(GameError::BlockedDuringRun);
        }
        Ok(())
    }

    fn require_admin(&self, actor: PlayerId) -> Result<(), GameError> {
        if self.admins.contains(&actor) {
            Ok(())
        } else {
            Err(GameError::NotPermitted)
        }
    }

    fn resolve_target(&self, args: &CommandArgs) -> Result<PlayerId, GameError> {
        let name = args.target.as_deref().ok_or(GameError::MissingTarget)?;
        self.ctx
            .host
            .find_player(name)
            .ok_or_else(|| GameError::UnknownPlayer(name.to_string()))
    }

    fn show_leaderboard(&mut self, actor: PlayerId) {
        let lines: Vec<String> = self
            .ctx
            .leaderboard
            .top(self.ctx.config.leaderboard_size)
            .iter()
            .enumerate()
            .map(|(i, e)| format!("#{} {} - {}", i + 1, e.player, format_elapsed(e.millis)))
            .collect();

        if lines.is_empty() {
            self.ctx.notify(actor, "No runs have been completed yet.");
        }
        for line in lines {
            self.ctx.notify(actor, &line);
        }
    }

    pub fn start(&mut self, mode: GameMode, actor: PlayerId) -> Result<(), GameError> {
        let ctx = &mut self.ctx;
        match mode {
            GameMode::Solo => self.solo.start(ctx, actor),
            GameMode::Coop => self.coop.start(ctx, actor),
            GameMode::Battle => self.battle.start(ctx, actor),
        }
    }

    pub fn reset(&mut self, mode: GameMode, actor: PlayerId) -> Result<(), GameError> {
        let ctx = &mut self.ctx;
        match mode {
            GameMode::Solo => self.solo.reset(ctx, actor),
            GameMode::Coop => self.coop.reset(ctx, actor),
            GameMode::Battle => self.battle.reset(ctx, actor),
        }
    }

    /// Leaves the actor's run. In a battle this forfeits it.
    pub fn stop(&mut self, actor: PlayerId) -> Result<(), GameError> {
        let run = self
            .ctx
            .registry
            .get_active_run(actor)
            .ok_or(GameError::NotInRun)?;
        if run.state == RunState::Finished {
            return Err(GameError::RunNotRunning);
        }
        let run = run.id;
        let reason = format!("{} stopped the run", self.ctx.name(actor));
        self.abort_run(run, Some(actor), Some(&reason));
        Ok(())
    }

    pub fn request(
        &mut self,
        mode: GameMode,
        actor: PlayerId,
        target: PlayerId,
    ) -> Result<(), GameError> {
        let ctx = &mut self.ctx;
        match mode {
            GameMode::Solo => Err(GameError::UnsupportedAction {
                mode,
                action: Action::Request,
            }),
            GameMode::Coop => self.coop.request(ctx, actor, target),
            GameMode::Battle => self.battle.request(ctx, actor, target),
        }
    }

    pub fn accept(&mut self, mode: GameMode, actor: PlayerId) -> Result<(), GameError> {
        let ctx = &mut self.ctx;
        match mode {
            GameMode::Solo => Err(GameError::UnsupportedAction {
                mode,
                action: Action::Accept,
            }),
            GameMode::Coop => self.coop.accept(ctx, actor),
            GameMode::Battle => self.battle.accept(ctx, actor),
        }
    }

    pub fn decline(&mut self, mode: GameMode, actor: PlayerId) -> Result<(), GameError> {
        let ctx = &mut self.ctx;
        match mode {
            GameMode::Solo => Err(GameError::UnsupportedAction {
                mode,
                action: Action::Decline,
            }),
            GameMode::Coop => self.coop.decline(ctx, actor),
            GameMode::Battle => self.battle.decline(ctx, actor),
        }
    }

    pub fn select_teammate(
        &mut self,
        actor: PlayerId,
        mate: Option<PlayerId>,
    ) -> Result<(), GameError> {
        self.battle.select_teammate(&mut self.ctx, actor, mate)
    }

    pub fn coop_duel(&mut self, actor: PlayerId, target_leader: PlayerId) -> Result<(), GameError> {
        self.coop.duel(&mut self.ctx, actor, target_leader)
    }

    /// The player reached the end of the run. Only counts while the run is
    /// running and the player's worlds are not being regenerated.
    pub fn complete_run(&mut self, player: PlayerId) -> Result<(), GameError> {
        let now = self.now();
        let run = self
            .ctx
            .registry
            .get_active_run(player)
            .ok_or(GameError::NotInRun)?;
        if run.state != RunState::Running || run.runner(player).is_some_and(|r| r.resetting) {
            return Err(GameError::RunNotRunning);
        }
        let mode = run.mode;
        let millis = duration_millis(run.stopwatch.elapsed(now));

        let ctx = &mut self.ctx;
        match mode {
            GameMode::Solo => self.solo.stop(ctx, player)?,
            GameMode::Coop => self.coop.stop(ctx, player)?,
            GameMode::Battle => self.battle.stop(ctx, player)?,
        }

        let name = self.ctx.name(player);
        if let Some(rank) = self.ctx.leaderboard.record_finish(&name, millis) {
            info!("{} placed #{} on the leaderboard", name, rank);
            let text = format!("You placed #{} on the leaderboard!", rank);
            self.ctx.notify(player, &text);
        }
        Ok(())
    }

    /// Aborts `run` through the mode that owns it. A participant initiating
    /// the abort of a battle forfeits it.
    pub fn abort_run(&mut self, run: RunId, initiator: Option<PlayerId>, reason: Option<&str>) {
        let Some(mode) = self.ctx.registry.run(run).map(|r| r.mode) else {
            debug!("Abort of unknown run {} ignored", run);
            return;
        };

        let ctx = &mut self.ctx;
        match mode {
            GameMode::Solo => self.solo.abort(ctx, run, initiator, reason),
            GameMode::Coop => self.coop.abort(ctx, run, initiator, reason),
            GameMode::Battle => self.battle.abort(ctx, run, initiator, reason),
        }
    }

    /// Aborts every run and tears down runs still waiting for a delayed
    /// teardown. Meant for shutdown: other pending timers are dropped.
    pub fn abort_all(&mut self, reason: &str) {
        for run in self.ctx.registry.run_ids() {
            self.abort_run(run, None, Some(reason));
        }
        self.flush_teardowns();
    }

    fn flush_teardowns(&mut self) {
        while let Some(event) = self.ctx.timers.pop_due(Duration::MAX) {
            if let Scheduled::FinishRun { run } = event {
                lifecycle::finish_run(&mut self.ctx, run);
            }
        }
    }

    /// Aborts the run of `target`, or every run when no target is given.
    pub fn admin_stop(&mut self, actor: PlayerId, target: Option<PlayerId>) -> Result<(), GameError> {
        match target {
            Some(target) => {
                let run = self
                    .ctx
                    .registry
                    .run_id_of(target)
                    .ok_or_else(|| GameError::TargetNotInRun(self.ctx.name(target)))?;
                self.abort_run(run, None, Some("Stopped by an admin"));
                let text = format!("Stopped the run of {}.", self.ctx.name(target));
                self.ctx.notify(actor, &text);
            }
            None => {
                let count = self.ctx.registry.len();
                for run in self.ctx.registry.run_ids() {
                    self.abort_run(run, None, Some("Stopped by an admin"));
                }
                let text = format!("Stopped {} runs.", count);
                self.ctx.notify(actor, &text);
            }
        }
        Ok(())
    }

    pub fn request_additional_seeds(
        &mut self,
        requester: Option<PlayerId>,
        category: SeedCategory,
        count: u32,
    ) -> Result<(), GameError> {
        let request =
            SeedFetchRequest::new(requester, category, count, self.ctx.config.max_seed_request)?;

        if let Some(requester) = requester {
            let text = format!("Fetching {} {} seeds...", count, category);
            self.ctx.notify(requester, &text);
        }
        info!("Fetching {} {} seeds", count, category);
        self.ctx.host.fetch_seeds(request);
        Ok(())
    }

    pub fn on_seeds_fetched(&mut self, outcome: SeedFetchOutcome) {
        let request = outcome.request;
        let added = self.ctx.seeds.extend(request.category, &outcome.seeds);
        if added < request.count as usize {
            warn!(
                "Only {} of {} {} seeds could be fetched",
                added, request.count, request.category
            );
        }

        if let Some(requester) = request.requester {
            let text = if added > 0 {
                format!("Successfully added {} new {} seeds!", added, request.category)
            } else {
                format!("Unsuccessfully added 0 new {} seeds!", request.category)
            };
            self.ctx.notify(requester, &text);
        }
    }

    pub fn on_worlds_ready(&mut self, worlds: ProvisionedWorlds) {
        if let Some(run) = lifecycle::complete_provisioning(&mut self.ctx, worlds) {
            self.abort_run(run, None, Some("World creation failed"));
        }
    }

    pub fn on_worlds_failed(&mut self, ticket: ProvisionTicket, reason: &str) {
        if let Some(run) = lifecycle::fail_provisioning(&mut self.ctx, ticket, reason) {
            self.abort_run(run, None, Some("World creation failed"));
        }
    }

    /// Returns `true` when the host must cancel the movement.
    pub fn handle_move(&mut self, player: PlayerId, position: Vec3) -> bool {
        let now = self.now();
        let Some(run) = self.ctx.registry.get_active_run(player) else {
            return false;
        };
        let frozen = run.runner(player).is_some_and(|r| r.frozen);
        self.ctx
            .registry
            .afk_mut()
            .record_movement(player, position, now);
        frozen
    }

    /// Returns `true` when the host must cancel the interaction.
    pub fn handle_interact(&mut self, player: PlayerId) -> bool {
        let now = self.now();
        let Some(run) = self.ctx.registry.get_active_run(player) else {
            return false;
        };
        let frozen = run.runner(player).is_some_and(|r| r.frozen);
        self.ctx.registry.afk_mut().record_activity(player, now);
        frozen
    }

    /// Records a thrown tracking eye and, from the second throw on,
    /// triangulates the target from the latest two.
    pub fn handle_throw(&mut self, player: PlayerId, throw: ThrowEvent) -> Option<Triangulation> {
        let run = self.ctx.registry.get_active_run_mut(player)?;
        if run.state != RunState::Running {
            return None;
        }
        let runner = run.runner_mut(player)?;
        if runner.frozen {
            return None;
        }
        runner.record_throw(throw);

        if runner.throw_count() < 2 {
            self.ctx
                .notify(player, "Throw another eye from a different spot to locate the stronghold.");
            return None;
        }

        let result = triangulate(runner.latest_throws());
        match result {
            Some(found) => {
                let text = format!(
                    "Stronghold estimate: x {:.0}, z {:.0} (nether: x {:.0}, z {:.0})",
                    found.surface.x, found.surface.z, found.compressed.x, found.compressed.z
                );
                self.ctx.notify(player, &text);
            }
            None => {
                self.ctx.notify(
                    player,
                    "Could not triangulate, move further to the side between throws.",
                );
            }
        }
        result
    }

    /// The player left the server.
    pub fn handle_quit(&mut self, player: PlayerId) {
        if let Some(run) = self.ctx.registry.run_id_of(player) {
            let reason = format!("{} left the game", self.ctx.name(player));
            self.abort_run(run, Some(player), Some(&reason));
        }

        self.ctx.teammates.remove(&player);
        self.ctx.teammates.retain(|_, mate| *mate != player);
        self.battle.on_quit(&mut self.ctx, player);
        self.coop.on_quit(&mut self.ctx, player);
        self.ctx.registry.afk_mut().forget(player);
        self.admins.remove(&player);
    }

    pub fn advance(&mut self, by: Duration) {
        let target = self.now() + by;
        self.advance_to(target);
    }

    /// Fires every timer due at or before `now`, in deadline order.
    pub fn advance_to(&mut self, now: Duration) {
        while let Some(event) = self.ctx.timers.pop_due(now) {
            self.fire(event);
        }
        self.ctx.timers.settle(now);
    }

    fn fire(&mut self, event: Scheduled) {
        match event {
            Scheduled::RequestExpired {
                mode,
                kind,
                target,
                request_id,
            } => match mode {
                GameMode::Battle => self.battle.expire(&mut self.ctx, kind, target, request_id),
                GameMode::Coop => self.coop.expire(&mut self.ctx, kind, target, request_id),
                GameMode::Solo => {}
            },
            Scheduled::Countdown { run, remaining } => {
                lifecycle::countdown_step(&mut self.ctx, run, remaining)
            }
            Scheduled::FinishRun { run } => lifecycle::finish_run(&mut self.ctx, run),
            Scheduled::ProvisioningWatchdog { run, ticket } => {
                if self.ctx.take_provision(ticket).is_some() {
                    warn!("World creation for run {} timed out", run);
                    self.abort_run(run, None, Some("World creation timed out"));
                }
            }
            Scheduled::AfkCheck => self.afk_sweep(),
        }
    }

    fn afk_sweep(&mut self) {
        if !self.ctx.registry.afk().is_enabled() {
            self.ctx.registry.afk_mut().set_check_handle(None);
            return;
        }

        let now = self.now();
        let participants = self.ctx.registry.all_participants_across_runs();
        let report = self.ctx.registry.afk_mut().check(&participants, now);

        let lead = self.ctx.config.afk_warning_lead.as_secs();
        for player in report.warn {
            let text = format!(
                "You will be removed from your run for inactivity in {} seconds!",
                lead
            );
            self.ctx.notify(player, &text);
        }
        for player in report.evict {
            let run = self
                .ctx
                .registry
                .get_active_run(player)
                .filter(|run| run.state != RunState::Finished)
                .map(|run| run.id);
            if let Some(run) = run {
                info!("Evicting {} from run {} for inactivity", player, run);
                self.ctx.notify(player, "You were removed from your run for being AFK.");
                self.abort_run(run, None, Some("AFK"));
            }
        }

        if self.ctx.registry.afk().is_enabled() {
            let handle = self
                .ctx
                .timers
                .schedule(self.ctx.config.afk_check_interval, Scheduled::AfkCheck);
            self.ctx.registry.afk_mut().set_check_handle(Some(handle));
        } else {
            self.ctx.registry.afk_mut().set_check_handle(None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RunVariant;
    use crate::testing::RecordingHost;
    use assert_approx_eq::assert_approx_eq;

    fn game() -> Game<RecordingHost> {
        let host = RecordingHost::with_players(&[
            (1, "ann"),
            (2, "bob"),
            (3, "cid"),
            (4, "dee"),
            (5, "eve"),
        ]);
        let mut game = Game::new(GameConfig::default(), host);
        game.seed_rng(7);
        game
    }

    fn provide_worlds(game: &mut Game<RecordingHost>) {
        let call = game
            .host()
            .last_provision()
            .cloned()
            .expect("no worlds were requested");
        game.on_worlds_ready(RecordingHost::worlds_for(&call, 1234));
    }

    fn run_state(game: &Game<RecordingHost>, player: PlayerId) -> Option<RunState> {
        game.registry().get_active_run(player).map(|r| r.state)
    }

    #[test]
    fn test_parse_mode_command() {
        assert_eq!(
            parse_command("/battle request Bob"),
            Ok(Command::Mode {
                action: Action::Request,
                args: CommandArgs {
                    mode: GameMode::Battle,
                    target: Some("Bob".to_string()),
                },
            })
        );
        assert_eq!(parse_command("  "), Ok(Command::Help));
        assert_eq!(
            parse_command("dance now"),
            Err(GameError::UnknownCommand("dance".to_string()))
        );
        assert!(matches!(parse_command("solo"), Err(GameError::Usage(_))));
    }

    #[test]
    fn test_parse_admin_seed() {
        assert_eq!(
            parse_command("admin seed village 3"),
            Ok(Command::AdminSeed {
                category: SeedCategory::Village,
                amount: 3,
            })
        );
        assert!(matches!(
            parse_command("admin seed village lots"),
            Err(GameError::Usage(_))
        ));
    }

    #[test]
    fn test_solo_run_from_start_to_teardown() {
        let mut game = game();

        game.start(GameMode::Solo, 1).unwrap();
        assert_eq!(run_state(&game, 1), Some(RunState::Provisioning));
        assert_eq!(game.host().last_provision().unwrap().representatives, vec![1]);

        provide_worlds(&mut game);
        assert_eq!(run_state(&game, 1), Some(RunState::Countdown));
        assert!(game.host().is_frozen(1));
        assert_eq!(game.host().resets, vec![1]);
        assert_eq!(game.registry().get_active_run(1).unwrap().seed(), Some(1234));

        game.advance(Duration::from_secs(5));
        assert_eq!(run_state(&game, 1), Some(RunState::Running));
        assert!(!game.host().is_frozen(1));
        assert_eq!(game.host().timer_displays, vec![vec![1]]);

        game.advance(Duration::from_secs(65));
        game.complete_run(1).unwrap();
        assert_eq!(run_state(&game, 1), Some(RunState::Finished));
        assert_eq!(game.leaderboard().entries()[0].millis, 65_000);
        assert_eq!(game.complete_run(1), Err(GameError::RunNotRunning));

        game.advance(Duration::from_secs(9));
        assert!(game.is_in_run(1));

        game.advance(Duration::from_secs(1));
        assert!(!game.is_in_run(1));
        assert_eq!(game.host().restored.len(), 1);
        assert_eq!(game.host().deleted_worlds.len(), 1);
    }

    #[test]
    fn test_quit_during_finish_delay_keeps_teardown_scheduled() {
        let mut game = game();
        game.request(GameMode::Battle, 1, 2).unwrap();
        game.accept(GameMode::Battle, 2).unwrap();
        provide_worlds(&mut game);
        game.advance(Duration::from_secs(5));
        game.advance(Duration::from_secs(42));
        game.complete_run(1).unwrap();

        game.advance(Duration::from_secs(3));
        game.handle_quit(2);
        game.host_mut().disconnect(2);
        assert_eq!(game.stop(1), Err(GameError::RunNotRunning));

        assert!(game.is_in_run(1));
        assert_eq!(run_state(&game, 1), Some(RunState::Finished));
        assert!(game.host().restored.is_empty());
        assert!(game.host().deleted_worlds.is_empty());
        assert!(!game.host().received(1, "The run was aborted"));

        game.advance(game.config().finish_delay() - Duration::from_secs(3));
        assert!(!game.is_in_run(1));
        assert_eq!(game.host().restored.len(), 2);
        assert_eq!(game.host().deleted_worlds.len(), 2);
        assert_eq!(game.leaderboard().entries()[0].player, "ann");
    }

    #[test]
    fn test_commands_blocked_while_frozen_and_running() {
        let mut game = game();
        game.execute(1, "solo start").unwrap();
        provide_worlds(&mut game);

        assert_eq!(game.execute(1, "solo stop"), Err(GameError::Frozen));

        game.advance(Duration::from_secs(5));
        assert_eq!(game.execute(1, "solo start"), Err(GameError::BlockedDuringRun));
        assert_eq!(
            game.execute(1, "battle reset"),
            Err(GameError::BlockedDuringRun)
        );
        assert!(game.host().received(1, "You cannot use that command during a run!"));

        game.execute(1, "solo stop").unwrap();
        assert!(!game.is_in_run(1));
    }

    #[test]
    fn test_unsupported_action_is_rejected() {
        let mut game = game();
        assert_eq!(
            game.execute(1, "coop reset"),
            Err(GameError::UnsupportedAction {
                mode: GameMode::Coop,
                action: Action::Reset,
            })
        );
        assert_eq!(
            game.execute(1, "solo request bob"),
            Err(GameError::UnsupportedAction {
                mode: GameMode::Solo,
                action: Action::Request,
            })
        );
    }

    #[test]
    fn test_solo_reset_keeps_seed_and_replaces_worlds() {
        let mut game = game();
        game.start(GameMode::Solo, 1).unwrap();
        provide_worlds(&mut game);
        game.advance(Duration::from_secs(5));

        game.reset(GameMode::Solo, 1).unwrap();
        assert_eq!(run_state(&game, 1), Some(RunState::Reprovisioning));
        assert_eq!(game.host().last_provision().unwrap().seed, Some(1234));
        assert_eq!(game.reset(GameMode::Solo, 1), Err(GameError::RunNotRunning));

        provide_worlds(&mut game);
        assert_eq!(run_state(&game, 1), Some(RunState::Running));
        assert_eq!(game.host().deleted_worlds.len(), 1);
        assert_eq!(game.host().teleports.len(), 2);
        assert!(game.host().received(1, "The world has been reset!"));
    }

    #[test]
    fn test_battle_reset_only_pauses_own_side() {
        let mut game = game();
        game.request(GameMode::Battle, 1, 2).unwrap();
        game.accept(GameMode::Battle, 2).unwrap();
        provide_worlds(&mut game);
        game.advance(Duration::from_secs(5));

        game.reset(GameMode::Battle, 1).unwrap();
        assert_eq!(run_state(&game, 1), Some(RunState::Running));
        assert_eq!(game.complete_run(1), Err(GameError::RunNotRunning));

        // The opponent can still win while the worlds regenerate.
        game.complete_run(2).unwrap();
        assert_eq!(run_state(&game, 2), Some(RunState::Finished));
        assert!(game.host().received(2, "You won!"));
        assert!(game.host().received(1, "You lost!"));

        // Late reset worlds are discarded.
        provide_worlds(&mut game);
        assert_eq!(game.host().deleted_worlds.len(), 1);
    }

    #[test]
    fn test_request_to_player_in_run_creates_nothing() {
        let mut game = game();
        game.start(GameMode::Solo, 2).unwrap();

        assert_eq!(
            game.request(GameMode::Battle, 1, 2),
            Err(GameError::TargetInRun("bob".to_string()))
        );
        assert!(game.battle().requests().is_empty());
        assert_eq!(game.config().request_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_accept_wins_over_decline_and_timeout() {
        let mut game = game();
        game.request(GameMode::Battle, 1, 2).unwrap();
        game.accept(GameMode::Battle, 2).unwrap();

        assert_eq!(
            game.decline(GameMode::Battle, 2),
            Err(GameError::NoPendingRequest)
        );
        game.advance(Duration::from_secs(31));
        assert!(!game.host().received(1, "expired"));
        assert_eq!(
            game.registry().get_active_run(1).map(|r| r.variant),
            Some(RunVariant::Duel)
        );
    }

    #[test]
    fn test_decline_then_new_request() {
        let mut game = game();
        game.request(GameMode::Battle, 1, 2).unwrap();
        game.decline(GameMode::Battle, 2).unwrap();
        assert!(game.host().received(1, "bob declined your battle request."));

        game.request(GameMode::Battle, 1, 2).unwrap();
        assert!(game.battle().requests().has_inbound(2));
    }

    #[test]
    fn test_request_expires() {
        let mut game = game();
        game.request(GameMode::Battle, 1, 2).unwrap();

        game.advance(Duration::from_secs(29));
        assert!(game.battle().requests().has_inbound(2));

        game.advance(Duration::from_secs(1));
        assert!(!game.battle().requests().has_inbound(2));
        assert!(game.host().received(1, "Your battle request to bob expired."));
        assert_eq!(
            game.accept(GameMode::Battle, 2),
            Err(GameError::NoPendingRequest)
        );
    }

    #[test]
    fn test_team_request_decline_and_expiry_reach_teammates() {
        let mut game = game();
        game.select_teammate(1, Some(3)).unwrap();
        game.select_teammate(2, Some(4)).unwrap();

        game.request(GameMode::Battle, 1, 2).unwrap();
        assert!(game.battle().requests().get(2).unwrap().team_invite);
        game.decline(GameMode::Battle, 2).unwrap();
        for mate in [3, 4] {
            assert!(game
                .host()
                .received(mate, "bob declined the team battle against ann."));
        }

        game.request(GameMode::Battle, 1, 2).unwrap();
        game.advance(Duration::from_secs(30));
        for mate in [3, 4] {
            assert!(game
                .host()
                .received(mate, "The team battle request from ann to bob expired."));
        }
        assert!(!game.host().received(5, "expired"));
    }

    #[test]
    fn test_duplicate_requests_rejected() {
        let mut game = game();
        game.request(GameMode::Battle, 1, 2).unwrap();
        assert_eq!(
            game.request(GameMode::Battle, 3, 2),
            Err(GameError::TargetHasPendingRequest("bob".to_string()))
        );
        assert_eq!(
            game.request(GameMode::Battle, 1, 3),
            Err(GameError::RequestOutstanding)
        );
        assert_eq!(game.request(GameMode::Battle, 1, 1), Err(GameError::SelfTarget));
    }

    #[test]
    fn test_team_battle_falls_back_to_duel() {
        let mut game = game();
        game.select_teammate(1, Some(3)).unwrap();
        game.select_teammate(2, Some(4)).unwrap();
        game.request(GameMode::Battle, 1, 2).unwrap();
        assert!(game.battle().requests().get(2).unwrap().team_invite);

        // A teammate got busy before the accept.
        game.start(GameMode::Solo, 4).unwrap();
        game.accept(GameMode::Battle, 2).unwrap();

        let run = game.registry().get_active_run(1).unwrap();
        assert_eq!(run.variant, RunVariant::Duel);
        assert_eq!(run.participants(), vec![1, 2]);
        assert!(game.registry().get_active_run(3).is_none());
    }

    #[test]
    fn test_team_battle_forfeit_ends_run_for_all_four() {
        let mut game = game();
        game.select_teammate(1, Some(2)).unwrap();
        game.select_teammate(3, Some(4)).unwrap();
        game.request(GameMode::Battle, 1, 3).unwrap();
        game.accept(GameMode::Battle, 3).unwrap();

        let run = game.registry().get_active_run(4).unwrap();
        assert_eq!(run.variant, RunVariant::TeamDuel);
        assert_eq!(run.participants(), vec![1, 2, 3, 4]);
        assert_eq!(game.host().last_provision().unwrap().representatives, vec![1, 3]);

        provide_worlds(&mut game);
        game.advance(Duration::from_secs(5));
        game.stop(1).unwrap();

        for player in 1..=4 {
            assert!(!game.is_in_run(player));
        }
        assert!(game.host().received(3, "You won!"));
        assert!(game.host().received(4, "You won!"));
        assert!(game.leaderboard().entries().is_empty());
        assert!(game.host().restored.is_empty());

        game.advance(game.config().finish_delay());
        assert_eq!(game.host().restored.len(), 4);
        assert_eq!(game.host().deleted_worlds.len(), 2);
    }

    #[test]
    fn test_select_teammate_rules() {
        let mut game = game();
        assert_eq!(game.select_teammate(1, Some(1)), Err(GameError::SelfTeammate));

        game.start(GameMode::Solo, 2).unwrap();
        assert_eq!(
            game.select_teammate(1, Some(2)),
            Err(GameError::TargetInRun("bob".to_string()))
        );

        game.select_teammate(1, Some(3)).unwrap();
        game.select_teammate(1, Some(4)).unwrap();
        assert_eq!(game.teammate_of(1), Some(4));

        game.execute(1, "battle team").unwrap();
        assert_eq!(game.teammate_of(1), None);
    }

    #[test]
    fn test_quit_forfeits_and_clears_selections() {
        let mut game = game();
        game.select_teammate(5, Some(1)).unwrap();
        game.request(GameMode::Battle, 1, 2).unwrap();
        game.accept(GameMode::Battle, 2).unwrap();

        game.host_mut().disconnect(1);
        game.handle_quit(1);

        assert!(!game.is_in_run(2));
        assert!(game.host().received(2, "You won!"));
        assert_eq!(game.teammate_of(5), None);
    }

    #[test]
    fn test_worlds_for_aborted_run_are_deleted() {
        let mut game = game();
        game.start(GameMode::Solo, 1).unwrap();
        game.stop(1).unwrap();
        assert!(!game.is_in_run(1));

        provide_worlds(&mut game);
        assert_eq!(game.host().deleted_worlds.len(), 1);
        assert!(game.host().teleports.is_empty());
    }

    #[test]
    fn test_provisioning_watchdog_aborts_run() {
        let mut game = game();
        game.start(GameMode::Solo, 1).unwrap();

        game.advance(Duration::from_secs(119));
        assert!(game.is_in_run(1));

        game.advance(Duration::from_secs(1));
        assert!(!game.is_in_run(1));
        assert!(game.host().received(1, "World creation timed out"));
    }

    #[test]
    fn test_failed_provisioning_aborts_run() {
        let mut game = game();
        game.start(GameMode::Solo, 1).unwrap();
        let ticket = game.host().last_provision().unwrap().ticket;

        game.on_worlds_failed(ticket, "disk full");
        assert!(!game.is_in_run(1));

        // Repeated failures for the same ticket are ignored.
        game.on_worlds_failed(ticket, "disk full");
    }

    #[test]
    fn test_coop_group_start_and_shared_win() {
        let mut game = game();
        game.execute(1, "coop request bob").unwrap();
        game.execute(2, "coop accept").unwrap();
        assert_eq!(
            game.coop().group_of(2),
            Some(crate::modes::CoopGroup {
                leader: 1,
                partner: 2
            })
        );
        assert!(!game.is_in_run(1));

        assert_eq!(game.execute(2, "coop start"), Err(GameError::NotCoopLeader));
        game.execute(1, "coop start").unwrap();
        assert!(game.coop().group_of(1).is_none());

        let run = game.registry().get_active_run(2).unwrap();
        assert_eq!(run.variant, RunVariant::Coop);
        assert_eq!(game.host().last_provision().unwrap().representatives, vec![1]);

        provide_worlds(&mut game);
        game.advance(Duration::from_secs(5));
        game.complete_run(2).unwrap();
        assert!(game.host().received(1, "You won!"));
        assert!(game.host().received(2, "You won!"));
    }

    #[test]
    fn test_coop_duel_builds_team_battle() {
        let mut game = game();
        game.execute(1, "coop request bob").unwrap();
        game.execute(2, "coop accept").unwrap();
        game.execute(3, "coop request dee").unwrap();
        game.execute(4, "coop accept").unwrap();

        assert_eq!(
            game.execute(2, "coop duel cid"),
            Err(GameError::NotCoopLeader)
        );
        assert_eq!(
            game.execute(1, "coop duel dee"),
            Err(GameError::TargetNotCoopLeader("dee".to_string()))
        );

        game.execute(1, "coop duel cid").unwrap();
        assert!(game.host().received(4, "challenged your coop"));
        game.execute(3, "coop accept").unwrap();

        let run = game.registry().get_active_run(4).unwrap();
        assert_eq!(run.mode, GameMode::Battle);
        assert_eq!(run.variant, RunVariant::TeamDuel);
        assert_eq!(run.participants(), vec![1, 2, 3, 4]);
        assert!(game.coop().group_of(1).is_none());
        assert!(game.coop().group_of(3).is_none());
    }

    #[test]
    fn test_coop_duel_expiry_and_decline() {
        let mut game = game();
        game.execute(1, "coop request bob").unwrap();
        game.execute(2, "coop accept").unwrap();
        game.execute(3, "coop request dee").unwrap();
        game.execute(4, "coop accept").unwrap();

        game.execute(1, "coop duel cid").unwrap();
        game.advance(Duration::from_secs(30));
        assert!(game.host().received(1, "Your coop battle to cid expired."));
        assert!(game.host().received(3, "The coop battle from ann expired."));
        for partner in [2, 4] {
            assert!(game
                .host()
                .received(partner, "The coop battle between ann and cid expired."));
        }

        game.execute(1, "coop duel cid").unwrap();
        game.execute(3, "coop decline").unwrap();
        assert!(game.host().received(2, "cid declined your coop battle."));
        assert!(game.host().received(4, "cid declined the coop battle from ann."));
        assert!(game.coop().group_of(1).is_some());
    }

    #[test]
    fn test_quit_dissolves_coop_group() {
        let mut game = game();
        game.execute(1, "coop request bob").unwrap();
        game.execute(2, "coop accept").unwrap();

        game.host_mut().disconnect(2);
        game.handle_quit(2);

        assert!(game.coop().group_of(1).is_none());
        assert!(game.host().received(1, "your coop was disbanded"));
    }

    #[test]
    fn test_afk_participant_is_evicted() {
        let mut game = game();
        game.start(GameMode::Solo, 1).unwrap();
        provide_worlds(&mut game);
        game.advance(Duration::from_secs(5));

        game.advance(Duration::from_secs(250));
        assert!(game.host().received(1, "inactivity in 60 seconds"));
        assert!(game.is_in_run(1));

        game.advance(Duration::from_secs(60));
        assert!(!game.is_in_run(1));
        assert!(game.host().received(1, "AFK"));
        assert!(!game.registry().afk().is_enabled());
    }

    #[test]
    fn test_moving_keeps_participant_active() {
        let mut game = game();
        game.start(GameMode::Solo, 1).unwrap();
        provide_worlds(&mut game);
        assert!(game.handle_move(1, Vec3::new(0.0, 64.0, 0.0)));
        game.advance(Duration::from_secs(5));
        assert!(!game.handle_move(1, Vec3::new(0.0, 64.0, 0.0)));

        for step in 1..=40 {
            game.advance(Duration::from_secs(10));
            game.handle_move(1, Vec3::new(step as f64 * 5.0, 64.0, 0.0));
        }
        assert!(game.is_in_run(1));
        assert!(!game.handle_move(2, Vec3::default()));
    }

    #[test]
    fn test_throws_triangulate_target() {
        let mut game = game();
        game.start(GameMode::Solo, 1).unwrap();
        provide_worlds(&mut game);

        let first = ThrowEvent::new(Vec3::new(0.0, 70.0, 0.0), Vec3::new(10.0, 80.0, 10.0), 1);
        let second = ThrowEvent::new(Vec3::new(10.0, 70.0, 0.0), Vec3::new(0.0, 80.0, 10.0), 2);

        // Frozen during the countdown.
        assert!(game.handle_throw(1, first).is_none());
        game.advance(Duration::from_secs(5));

        assert!(game.handle_throw(1, first).is_none());
        assert!(game.host().received(1, "Throw another eye"));

        let found = game.handle_throw(1, second).unwrap();
        assert_approx_eq!(found.surface.x, 5.0, 1e-9);
        assert_approx_eq!(found.surface.z, 5.0, 1e-9);
        assert!(game.host().received(1, "Stronghold estimate: x 5, z 5"));
    }

    #[test]
    fn test_seed_requests() {
        let mut game = game();
        assert_eq!(
            game.request_additional_seeds(Some(1), SeedCategory::Random, 2),
            Err(GameError::RandomSeedCategory)
        );
        assert_eq!(
            game.request_additional_seeds(Some(1), SeedCategory::Village, 11),
            Err(GameError::InvalidSeedAmount { max: 10 })
        );

        game.request_additional_seeds(Some(1), SeedCategory::Village, 3)
            .unwrap();
        let request = game.host().seed_requests[0].clone();
        assert_eq!(request.count, 3);

        game.on_seeds_fetched(SeedFetchOutcome {
            request,
            seeds: vec![10, 20],
        });
        assert_eq!(game.seeds().seeds(SeedCategory::Village), &[10, 20]);
        assert!(game.host().received(1, "Successfully added 2 new village seeds!"));
    }

    #[test]
    fn test_admin_commands_require_permission() {
        let mut game = game();
        game.start(GameMode::Solo, 2).unwrap();

        assert_eq!(game.execute(1, "admin stop bob"), Err(GameError::NotPermitted));
        assert!(game.is_in_run(2));

        game.grant_admin(1);
        game.execute(1, "admin stop bob").unwrap();
        assert!(!game.is_in_run(2));
        assert_eq!(
            game.execute(1, "admin stop bob"),
            Err(GameError::TargetNotInRun("bob".to_string()))
        );
    }

    #[test]
    fn test_abort_all_tears_everything_down() {
        let mut game = game();
        game.start(GameMode::Solo, 5).unwrap();
        game.request(GameMode::Battle, 1, 2).unwrap();
        game.accept(GameMode::Battle, 2).unwrap();
        provide_worlds(&mut game);
        game.advance(Duration::from_secs(5));
        game.complete_run(1).unwrap();

        game.abort_all("Server shutting down");
        assert!(game.registry().is_empty());
        assert_eq!(game.host().restored.len(), 3);
    }
}
