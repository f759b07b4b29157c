//! State shared by every mode: the registry, the scheduler and the host.
//!
//! One `Context` exists per engine and is passed explicitly to the mode
//! handlers. All mutation happens through `&mut Context`, so the engine has a
//! single writer without any locking.

use crate::config::GameConfig;
use crate::afk::AfkMonitor;
use crate::error::GameError;
use crate::host::Collaborators;
use crate::leaderboard::Leaderboard;
use crate::model::{RunId, Speedrun, WorldSet};
use crate::provisioning::{PendingProvision, ProvisionPurpose, ProvisionTicket};
use crate::registry::RunRegistry;
use crate::seeds::SeedCatalog;
use crate::timers::{Scheduled, TimerHandle, TimerQueue};
use log::{debug, info};
use rand::rngs::StdRng;
use rand::SeedableRng;
use shared::PlayerId;
use std::collections::HashMap;
use std::time::Duration;

pub struct Context<H: Collaborators> {
    pub config: GameConfig,
    pub host: H,
    pub registry: RunRegistry,
    pub timers: TimerQueue,
    pub seeds: SeedCatalog,
    pub leaderboard: Leaderboard,
    /// Teammate each player picked for team duels
    pub teammates: HashMap<PlayerId, PlayerId>,
    pub rng: StdRng,
    provisions: HashMap<ProvisionTicket, PendingProvision>,
    next_ticket: u64,
    /// Runs already out of the registry whose teardown is still scheduled
    retired: HashMap<RunId, Speedrun>,
    finish_timers: HashMap<RunId, TimerHandle>,
}

impl<H: Collaborators> Context<H> {
    pub fn new(config: GameConfig, host: H, seeds: SeedCatalog, leaderboard: Leaderboard) -> Self {
        let afk = AfkMonitor::new(
            config.afk_timeout,
            config.afk_warning_lead,
            config.afk_min_distance,
        );

        Self {
            config,
            host,
            registry: RunRegistry::new(afk),
            timers: TimerQueue::new(),
            seeds,
            leaderboard,
            teammates: HashMap::new(),
            rng: StdRng::from_entropy(),
            provisions: HashMap::new(),
            next_ticket: 1,
            retired: HashMap::new(),
            finish_timers: HashMap::new(),
        }
    }

    pub fn now(&self) -> Duration {
        self.timers.now()
    }

    pub fn name(&self, player: PlayerId) -> String {
        self.host.name(player)
    }

    pub fn notify(&mut self, player: PlayerId, text: &str) {
        self.host.send_message(player, text);
    }

    pub fn notify_all(&mut self, players: &[PlayerId], text: &str) {
        for player in players {
            self.host.send_message(*player, text);
        }
    }

    pub fn title_all(&mut self, players: &[PlayerId], title: &str, subtitle: &str) {
        for player in players {
            self.host.send_title(*player, title, subtitle);
        }
    }

    pub fn in_run(&self, player: PlayerId) -> bool {
        self.registry.is_in_any_run(player)
    }

    /// Online and free to join a run.
    pub fn is_available(&self, player: PlayerId) -> bool {
        self.host.is_online(player) && !self.in_run(player)
    }

    /// Registers `run` and makes sure the AFK sweep is scheduled while runs
    /// exist.
    pub fn register_run(&mut self, run: Speedrun) -> Result<RunId, GameError> {
        let id = self.registry.add_run(run)?;

        let sweeping = self
            .registry
            .afk()
            .check_handle()
            .is_some_and(|handle| self.timers.is_pending(handle));
        if self.registry.afk().is_enabled() && !sweeping {
            let handle = self
                .timers
                .schedule(self.config.afk_check_interval, Scheduled::AfkCheck);
            self.registry.afk_mut().set_check_handle(Some(handle));
        }

        Ok(id)
    }

    /// Asks the provisioner for one world set per representative and arms the
    /// provisioning watchdog.
    pub fn request_worlds(
        &mut self,
        run: RunId,
        purpose: ProvisionPurpose,
        representatives: Vec<PlayerId>,
        seed: Option<i64>,
    ) -> ProvisionTicket {
        let ticket = ProvisionTicket(self.next_ticket);
        self.next_ticket += 1;

        debug!(
            "Requesting worlds for run {} ({:?}), ticket {}",
            run, purpose, ticket.0
        );

        self.host.create_worlds(ticket, &representatives, seed);
        let watchdog = self.timers.schedule(
            self.config.provisioning_timeout,
            Scheduled::ProvisioningWatchdog { run, ticket },
        );
        self.provisions.insert(
            ticket,
            PendingProvision {
                run,
                purpose,
                representatives,
                watchdog,
            },
        );
        ticket
    }

    /// Removes the pending request for `ticket` and disarms its watchdog.
    pub fn take_provision(&mut self, ticket: ProvisionTicket) -> Option<PendingProvision> {
        let pending = self.provisions.remove(&ticket)?;
        self.timers.cancel(pending.watchdog);
        Some(pending)
    }

    pub fn is_provision_pending(&self, ticket: ProvisionTicket) -> bool {
        self.provisions.contains_key(&ticket)
    }

    pub fn is_provisioning(&self, run: RunId) -> bool {
        self.provisions.values().any(|p| p.run == run)
    }

    /// Forgets outstanding provisioning for `run`. Worlds arriving later for
    /// those tickets are deleted on arrival.
    pub fn drop_provisions(&mut self, run: RunId) {
        let timers = &mut self.timers;
        self.provisions.retain(|_, pending| {
            if pending.run == run {
                timers.cancel(pending.watchdog);
                false
            } else {
                true
            }
        });
    }

    /// Takes `run` out of the registry but keeps it for a delayed teardown.
    pub fn retire(&mut self, run: RunId) -> bool {
        match self.registry.remove_run(run) {
            Some(speedrun) => {
                self.retired.insert(run, speedrun);
                true
            }
            None => false,
        }
    }

    pub fn schedule_teardown(&mut self, run: RunId, delay: Duration) {
        let handle = self.timers.schedule(delay, Scheduled::FinishRun { run });
        if let Some(previous) = self.finish_timers.insert(run, handle) {
            self.timers.cancel(previous);
        }
    }

    pub fn cancel_teardown(&mut self, run: RunId) {
        if let Some(handle) = self.finish_timers.remove(&run) {
            self.timers.cancel(handle);
        }
    }

    /// Removes `run` from wherever it still lives, registered or retired.
    pub fn take_run(&mut self, run: RunId) -> Option<Speedrun> {
        self.finish_timers.remove(&run);
        self.registry
            .remove_run(run)
            .or_else(|| self.retired.remove(&run))
    }

    pub fn is_retired(&self, run: RunId) -> bool {
        self.retired.contains_key(&run)
    }

    /// Hands every participant back to the host and deletes the run's worlds.
    pub fn teardown(&mut self, run: Speedrun) {
        info!("Tearing down run {} ({:?})", run.id, run.state);
        run.stopwatch.stop(self.now());
        self.drop_provisions(run.id);

        for runner in run.runners() {
            if runner.frozen {
                self.host.set_frozen(runner.player, false);
            }
            self.host.restore_state(runner.player, &runner.snapshot);
        }

        let mut deleted: Vec<&WorldSet> = Vec::new();
        for runner in run.runners() {
            if let Some(worlds) = &runner.world_set {
                if !deleted.contains(&worlds) {
                    deleted.push(worlds);
                }
            }
        }
        for worlds in deleted {
            self.host.delete_worlds(worlds);
        }
    }
}
