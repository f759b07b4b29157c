//! In-memory collaborators that record every call, for exercising the engine
//! without a network or a world generator.

use crate::host::Host;
use crate::model::{PlayerSnapshot, Stopwatch, WorldSet};
use crate::provisioning::{ProvisionTicket, ProvisionedWorlds, WorldProvisioner};
use crate::seeds::{SeedFetchRequest, SeedFetcher};
use shared::PlayerId;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionCall {
    pub ticket: ProvisionTicket,
    pub representatives: Vec<PlayerId>,
    pub seed: Option<i64>,
}

#[derive(Debug, Default)]
pub struct RecordingHost {
    names: HashMap<PlayerId, String>,
    pub messages: Vec<(PlayerId, String)>,
    pub titles: Vec<(PlayerId, String, String)>,
    pub frozen: HashMap<PlayerId, bool>,
    pub resets: Vec<PlayerId>,
    pub restored: Vec<(PlayerId, PlayerSnapshot)>,
    pub teleports: Vec<(PlayerId, String)>,
    pub timer_displays: Vec<Vec<PlayerId>>,
    pub provision_calls: Vec<ProvisionCall>,
    pub deleted_worlds: Vec<WorldSet>,
    pub seed_requests: Vec<SeedFetchRequest>,
}

impl RecordingHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_players(players: &[(PlayerId, &str)]) -> Self {
        let mut host = Self::new();
        for (id, name) in players {
            host.connect(*id, name);
        }
        host
    }

    pub fn connect(&mut self, player: PlayerId, name: &str) {
        self.names.insert(player, name.to_string());
    }

    pub fn disconnect(&mut self, player: PlayerId) {
        self.names.remove(&player);
    }

    pub fn messages_for(&self, player: PlayerId) -> Vec<&str> {
        self.messages
            .iter()
            .filter(|(p, _)| *p == player)
            .map(|(_, text)| text.as_str())
            .collect()
    }

    pub fn received(&self, player: PlayerId, fragment: &str) -> bool {
        self.messages_for(player).iter().any(|m| m.contains(fragment))
            || self
                .titles
                .iter()
                .any(|(p, title, subtitle)| {
                    *p == player && (title.contains(fragment) || subtitle.contains(fragment))
                })
    }

    pub fn is_frozen(&self, player: PlayerId) -> bool {
        self.frozen.get(&player).copied().unwrap_or(false)
    }

    pub fn last_provision(&self) -> Option<&ProvisionCall> {
        self.provision_calls.last()
    }

    /// Builds the worlds a provisioner would report for `call`.
    pub fn worlds_for(call: &ProvisionCall, fallback_seed: i64) -> ProvisionedWorlds {
        let world_sets = call
            .representatives
            .iter()
            .map(|owner| {
                let base = format!("run_{}_{}", call.ticket.0, owner);
                (
                    *owner,
                    WorldSet {
                        owner: *owner,
                        overworld: format!("{}_overworld", base),
                        nether: format!("{}_nether", base),
                        end: format!("{}_end", base),
                    },
                )
            })
            .collect();

        ProvisionedWorlds {
            ticket: call.ticket,
            seed: call.seed.unwrap_or(fallback_seed),
            world_sets,
        }
    }
}

impl Host for RecordingHost {
    fn is_online(&self, player: PlayerId) -> bool {
        self.names.contains_key(&player)
    }

    fn name(&self, player: PlayerId) -> String {
        self.names
            .get(&player)
            .cloned()
            .unwrap_or_else(|| format!("#{}", player))
    }

    fn find_player(&self, name: &str) -> Option<PlayerId> {
        self.names
            .iter()
            .find(|(_, n)| n.eq_ignore_ascii_case(name))
            .map(|(id, _)| *id)
    }

    fn send_message(&mut self, player: PlayerId, text: &str) {
        self.messages.push((player, text.to_string()));
    }

    fn send_title(&mut self, player: PlayerId, title: &str, subtitle: &str) {
        self.titles
            .push((player, title.to_string(), subtitle.to_string()));
    }

    fn set_frozen(&mut self, player: PlayerId, frozen: bool) {
        self.frozen.insert(player, frozen);
    }

    fn capture_state(&mut self, player: PlayerId) -> PlayerSnapshot {
        PlayerSnapshot(player.to_le_bytes().to_vec())
    }

    fn reset_state(&mut self, player: PlayerId) {
        self.resets.push(player);
    }

    fn restore_state(&mut self, player: PlayerId, snapshot: &PlayerSnapshot) {
        self.restored.push((player, snapshot.clone()));
    }

    fn teleport_to_spawn(&mut self, player: PlayerId, worlds: &WorldSet) {
        self.teleports.push((player, worlds.spawn_world().to_string()));
    }

    fn start_timer_display(&mut self, players: &[PlayerId], _stopwatch: &Stopwatch) {
        self.timer_displays.push(players.to_vec());
    }
}

impl WorldProvisioner for RecordingHost {
    fn create_worlds(
        &mut self,
        ticket: ProvisionTicket,
        representatives: &[PlayerId],
        seed: Option<i64>,
    ) {
        self.provision_calls.push(ProvisionCall {
            ticket,
            representatives: representatives.to_vec(),
            seed,
        });
    }

    fn delete_worlds(&mut self, worlds: &WorldSet) {
        self.deleted_worlds.push(worlds.clone());
    }
}

impl SeedFetcher for RecordingHost {
    fn fetch_seeds(&mut self, request: SeedFetchRequest) {
        self.seed_requests.push(request);
    }
}
