//! Index of active runs and of the players taking part in them.

use crate::afk::AfkMonitor;
use crate::error::GameError;
use crate::model::{RunId, Speedrun};
use log::debug;
use shared::PlayerId;
use std::collections::{HashMap, HashSet};

/// A player belongs to at most one registered run. Registration and removal
/// update both indexes together, so a lookup never sees half of a run.
///
/// The registry also owns the AFK monitor: it is switched on with the first
/// run and off when the last run leaves.
#[derive(Debug)]
pub struct RunRegistry {
    runs: HashMap<RunId, Speedrun>,
    by_player: HashMap<PlayerId, RunId>,
    next_id: RunId,
    afk: AfkMonitor,
}

impl RunRegistry {
    pub fn new(afk: AfkMonitor) -> Self {
        Self {
            runs: HashMap::new(),
            by_player: HashMap::new(),
            next_id: 1,
            afk,
        }
    }

    pub fn next_run_id(&mut self) -> RunId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Registers every participant of `run`. Fails without touching the
    /// registry if any participant already belongs to a run.
    pub fn add_run(&mut self, run: Speedrun) -> Result<RunId, GameError> {
        let participants = run.participants();
        if let Some(taken) = participants.iter().find(|p| self.by_player.contains_key(p)) {
            return Err(GameError::ParticipantConflict(*taken));
        }

        let id = run.id;
        for player in participants {
            self.by_player.insert(player, id);
        }
        self.runs.insert(id, run);
        self.afk.enable();

        debug!("Registered run {} ({} active)", id, self.runs.len());
        Ok(id)
    }

    pub fn remove_run(&mut self, id: RunId) -> Option<Speedrun> {
        let run = self.runs.remove(&id)?;
        for player in run.participants() {
            if self.by_player.get(&player) == Some(&id) {
                self.by_player.remove(&player);
            }
            self.afk.forget(player);
        }

        if self.runs.is_empty() {
            self.afk.disable();
        }

        debug!("Removed run {} ({} active)", id, self.runs.len());
        Some(run)
    }

    pub fn run(&self, id: RunId) -> Option<&Speedrun> {
        self.runs.get(&id)
    }

    pub fn run_mut(&mut self, id: RunId) -> Option<&mut Speedrun> {
        self.runs.get_mut(&id)
    }

    pub fn run_id_of(&self, player: PlayerId) -> Option<RunId> {
        self.by_player.get(&player).copied()
    }

    pub fn get_active_run(&self, player: PlayerId) -> Option<&Speedrun> {
        self.run_id_of(player).and_then(|id| self.runs.get(&id))
    }

    pub fn get_active_run_mut(&mut self, player: PlayerId) -> Option<&mut Speedrun> {
        let id = self.run_id_of(player)?;
        self.runs.get_mut(&id)
    }

    pub fn is_in_any_run(&self, player: PlayerId) -> bool {
        self.by_player.contains_key(&player)
    }

    pub fn all_participants(&self, id: RunId) -> HashSet<PlayerId> {
        self.runs
            .get(&id)
            .map(|run| run.participants().into_iter().collect())
            .unwrap_or_default()
    }

    pub fn all_participants_across_runs(&self) -> HashSet<PlayerId> {
        self.by_player.keys().copied().collect()
    }

    /// Active run ids in ascending order.
    pub fn run_ids(&self) -> Vec<RunId> {
        let mut ids: Vec<RunId> = self.runs.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    pub fn afk(&self) -> &AfkMonitor {
        &self.afk
    }

    pub fn afk_mut(&mut self) -> &mut AfkMonitor {
        &mut self.afk
    }
}
