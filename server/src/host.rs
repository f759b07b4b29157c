//! Seams between the run engine and the environment hosting the players.

use crate::model::{PlayerSnapshot, Stopwatch, WorldSet};
use crate::provisioning::WorldProvisioner;
use crate::seeds::SeedFetcher;
use shared::PlayerId;

/// Player-facing side effects the engine needs from its host.
///
/// Every call is fire-and-forget. Calls naming an offline player are expected
/// to be ignored.
pub trait Host {
    fn is_online(&self, player: PlayerId) -> bool;

    /// Display name, falling back to something readable for unknown ids.
    fn name(&self, player: PlayerId) -> String;

    fn find_player(&self, name: &str) -> Option<PlayerId>;

    fn send_message(&mut self, player: PlayerId, text: &str);

    fn send_title(&mut self, player: PlayerId, title: &str, subtitle: &str);

    fn set_frozen(&mut self, player: PlayerId, frozen: bool);

    fn capture_state(&mut self, player: PlayerId) -> PlayerSnapshot;

    /// Clears inventory, health and similar before a run begins.
    fn reset_state(&mut self, player: PlayerId);

    fn restore_state(&mut self, player: PlayerId, snapshot: &PlayerSnapshot);

    fn teleport_to_spawn(&mut self, player: PlayerId, worlds: &WorldSet);

    fn start_timer_display(&mut self, players: &[PlayerId], stopwatch: &Stopwatch);
}

/// Everything the engine is generic over.
pub trait Collaborators: Host + WorldProvisioner + SeedFetcher {}

impl<T: Host + WorldProvisioner + SeedFetcher> Collaborators for T {}
