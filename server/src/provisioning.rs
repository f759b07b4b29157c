//! Asynchronous world creation.
//!
//! The engine asks the provisioner for worlds and keeps going. The outcome
//! comes back later through [`crate::game::Game::on_worlds_ready`] or
//! [`crate::game::Game::on_worlds_failed`], tagged with the ticket handed out
//! at request time.

use crate::model::{RunId, WorldSet};
use crate::timers::TimerHandle;
use shared::PlayerId;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProvisionTicket(pub u64);

/// What a finished provisioning request is for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProvisionPurpose {
    /// First worlds of a new run
    Start,
    /// Regenerated worlds for the given participants
    Reset { players: Vec<PlayerId> },
}

#[derive(Debug, Clone)]
pub struct PendingProvision {
    pub run: RunId,
    pub purpose: ProvisionPurpose,
    pub representatives: Vec<PlayerId>,
    /// Aborts the run if the worlds never arrive
    pub watchdog: TimerHandle,
}

/// Worlds produced for one ticket, keyed by the representative that owns them.
#[derive(Debug, Clone)]
pub struct ProvisionedWorlds {
    pub ticket: ProvisionTicket,
    pub seed: i64,
    pub world_sets: HashMap<PlayerId, WorldSet>,
}

impl ProvisionedWorlds {
    pub fn owners(&self) -> Vec<PlayerId> {
        let mut owners: Vec<PlayerId> = self.world_sets.keys().copied().collect();
        owners.sort_unstable();
        owners
    }
}

pub trait WorldProvisioner {
    /// Starts creating one world set per representative, all from the same
    /// seed. `None` lets the provisioner pick the seed.
    fn create_worlds(&mut self, ticket: ProvisionTicket, representatives: &[PlayerId], seed: Option<i64>);

    fn delete_worlds(&mut self, worlds: &WorldSet);
}
