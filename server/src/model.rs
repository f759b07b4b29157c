//! Runs, their participants and the shared stopwatch.

use shared::triangulation::{ThrowEvent, REQUIRED_THROWS};
use shared::{GameMode, PlayerId};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

pub type RunId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// Waiting for the first set of worlds
    Provisioning,
    /// Everyone is frozen in their worlds, start signal pending
    Countdown,
    Running,
    /// A reset regenerating the worlds of every participant
    Reprovisioning,
    Finished,
    Aborted,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Finished | RunState::Aborted)
    }
}

/// Shape of a run: how many participants and how they share worlds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunVariant {
    Solo,
    Duel,
    Coop,
    TeamDuel,
}

impl RunVariant {
    pub fn participant_count(&self) -> usize {
        match self {
            RunVariant::Solo => 1,
            RunVariant::Duel | RunVariant::Coop => 2,
            RunVariant::TeamDuel => 4,
        }
    }

    /// Whether the participants play against each other.
    pub fn is_adversarial(&self) -> bool {
        matches!(self, RunVariant::Duel | RunVariant::TeamDuel)
    }
}

/// Opaque copy of a player's state taken before the run, handed back to the
/// host on teardown.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlayerSnapshot(pub Vec<u8>);

/// The three linked worlds generated for one side of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorldSet {
    pub owner: PlayerId,
    pub overworld: String,
    pub nether: String,
    pub end: String,
}

impl WorldSet {
    pub fn spawn_world(&self) -> &str {
        &self.overworld
    }

    pub fn contains(&self, world: &str) -> bool {
        self.overworld == world || self.nether == world || self.end == world
    }
}

#[derive(Debug, Default)]
struct StopwatchState {
    started_at: Option<Duration>,
    stopped_at: Option<Duration>,
}

/// Elapsed-time counter measured against the engine's logical clock.
///
/// Clones share the same counter, which is how every participant of a run
/// observes one timer.
#[derive(Debug, Clone, Default)]
pub struct Stopwatch {
    state: Arc<Mutex<StopwatchState>>,
}

impl Stopwatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&self, now: Duration) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.started_at = Some(now);
        state.stopped_at = None;
    }

    /// Freezes the counter. Stopping an unstarted or already stopped watch
    /// does nothing.
    pub fn stop(&self, now: Duration) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.started_at.is_some() && state.stopped_at.is_none() {
            state.stopped_at = Some(now);
        }
    }

    pub fn is_running(&self) -> bool {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.started_at.is_some() && state.stopped_at.is_none()
    }

    pub fn elapsed(&self, now: Duration) -> Duration {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        match (state.started_at, state.stopped_at) {
            (Some(start), Some(stop)) => stop.saturating_sub(start),
            (Some(start), None) => now.saturating_sub(start),
            _ => Duration::ZERO,
        }
    }

    pub fn shares_counter_with(&self, other: &Stopwatch) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }
}

#[derive(Debug, Clone)]
pub struct Speedrunner {
    pub player: PlayerId,
    pub frozen: bool,
    /// Worlds are being regenerated for this runner
    pub resetting: bool,
    pub snapshot: PlayerSnapshot,
    pub world_set: Option<WorldSet>,
    pub stopwatch: Stopwatch,
    throws: Vec<ThrowEvent>,
}

impl Speedrunner {
    fn new(player: PlayerId, snapshot: PlayerSnapshot, stopwatch: Stopwatch) -> Self {
        Self {
            player,
            frozen: false,
            resetting: false,
            snapshot,
            world_set: None,
            stopwatch,
            throws: Vec::new(),
        }
    }

    pub fn record_throw(&mut self, throw: ThrowEvent) {
        self.throws.push(throw);
    }

    /// The most recent throws, oldest first. Empty until enough throws exist.
    pub fn latest_throws(&self) -> &[ThrowEvent] {
        if self.throws.len() < REQUIRED_THROWS {
            return &[];
        }
        &self.throws[self.throws.len() - REQUIRED_THROWS..]
    }

    pub fn clear_throws(&mut self) {
        self.throws.clear();
    }

    pub fn throw_count(&self) -> usize {
        self.throws.len()
    }
}

#[derive(Debug, Clone)]
pub struct Speedrun {
    pub id: RunId,
    pub mode: GameMode,
    pub variant: RunVariant,
    pub state: RunState,
    pub stopwatch: Stopwatch,
    runners: Vec<Speedrunner>,
    seed: Option<i64>,
}

impl Speedrun {
    /// Creates a run in the provisioning state.
    ///
    /// `players` and `snapshots` pair up by index. For team duels the first
    /// two players form one side and the last two the other.
    pub fn new(
        id: RunId,
        mode: GameMode,
        variant: RunVariant,
        players: Vec<(PlayerId, PlayerSnapshot)>,
    ) -> Self {
        debug_assert_eq!(players.len(), variant.participant_count());

        let stopwatch = Stopwatch::new();
        let runners = players
            .into_iter()
            .map(|(player, snapshot)| Speedrunner::new(player, snapshot, stopwatch.clone()))
            .collect();

        Self {
            id,
            mode,
            variant,
            state: RunState::Provisioning,
            stopwatch,
            runners,
            seed: None,
        }
    }

    pub fn participants(&self) -> Vec<PlayerId> {
        self.runners.iter().map(|r| r.player).collect()
    }

    pub fn contains(&self, player: PlayerId) -> bool {
        self.runners.iter().any(|r| r.player == player)
    }

    pub fn runners(&self) -> &[Speedrunner] {
        &self.runners
    }

    pub fn runners_mut(&mut self) -> &mut [Speedrunner] {
        &mut self.runners
    }

    pub fn runner(&self, player: PlayerId) -> Option<&Speedrunner> {
        self.runners.iter().find(|r| r.player == player)
    }

    pub fn runner_mut(&mut self, player: PlayerId) -> Option<&mut Speedrunner> {
        self.runners.iter_mut().find(|r| r.player == player)
    }

    pub fn seed(&self) -> Option<i64> {
        self.seed
    }

    /// Records the seed the run's worlds were generated from. The first seed
    /// sticks so that resets regenerate the same worlds.
    pub fn set_seed(&mut self, seed: i64) -> bool {
        if self.seed.is_some() {
            return false;
        }
        self.seed = Some(seed);
        true
    }

    /// The two opposing sides. Cooperative and solo runs have a single side.
    pub fn sides(&self) -> (Vec<PlayerId>, Vec<PlayerId>) {
        let players = self.participants();
        match self.variant {
            RunVariant::Duel => (players[..1].to_vec(), players[1..].to_vec()),
            RunVariant::TeamDuel => (players[..2].to_vec(), players[2..].to_vec()),
            RunVariant::Solo | RunVariant::Coop => (players, Vec::new()),
        }
    }

    pub fn side_of(&self, player: PlayerId) -> Vec<PlayerId> {
        let (first, second) = self.sides();
        if first.contains(&player) {
            first
        } else if second.contains(&player) {
            second
        } else {
            Vec::new()
        }
    }

    pub fn opponents_of(&self, player: PlayerId) -> Vec<PlayerId> {
        let (first, second) = self.sides();
        if first.contains(&player) {
            second
        } else if second.contains(&player) {
            first
        } else {
            Vec::new()
        }
    }

    /// Groups of participants that play in the same set of worlds. The first
    /// member of each group owns the worlds.
    pub fn world_groups(&self) -> Vec<Vec<PlayerId>> {
        let (first, second) = self.sides();
        match self.variant {
            RunVariant::Duel => vec![first, second],
            RunVariant::TeamDuel => vec![first, second],
            RunVariant::Solo | RunVariant::Coop => vec![first],
        }
    }

    pub fn world_group_of(&self, player: PlayerId) -> Vec<PlayerId> {
        self.world_groups()
            .into_iter()
            .find(|group| group.contains(&player))
            .unwrap_or_default()
    }

    /// Owners of every world set currently assigned to the run.
    pub fn world_owners(&self) -> Vec<PlayerId> {
        let mut owners: Vec<PlayerId> = self
            .runners
            .iter()
            .filter_map(|r| r.world_set.as_ref().map(|w| w.owner))
            .collect();
        owners.dedup();
        owners
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(variant: RunVariant, players: &[PlayerId]) -> Speedrun {
        Speedrun::new(
            1,
            GameMode::Battle,
            variant,
            players
                .iter()
                .map(|p| (*p, PlayerSnapshot::default()))
                .collect(),
        )
    }

    #[test]
    fn test_new_run_starts_provisioning() {
        let run = run(RunVariant::Solo, &[7]);
        assert_eq!(run.state, RunState::Provisioning);
        assert_eq!(run.participants(), vec![7]);
        assert!(run.seed().is_none());
        assert!(!run.stopwatch.is_running());
    }

    #[test]
    fn test_participants_share_one_stopwatch() {
        let run = run(RunVariant::TeamDuel, &[1, 2, 3, 4]);
        for runner in run.runners() {
            assert!(runner.stopwatch.shares_counter_with(&run.stopwatch));
        }

        run.stopwatch.start(Duration::from_secs(3));
        assert!(run.runners()[3].stopwatch.is_running());
        assert_eq!(
            run.runners()[2].stopwatch.elapsed(Duration::from_secs(10)),
            Duration::from_secs(7)
        );
    }

    #[test]
    fn test_stopwatch_stop_freezes_elapsed() {
        let watch = Stopwatch::new();
        assert_eq!(watch.elapsed(Duration::from_secs(5)), Duration::ZERO);

        watch.start(Duration::from_secs(1));
        watch.stop(Duration::from_secs(4));
        watch.stop(Duration::from_secs(9));

        assert!(!watch.is_running());
        assert_eq!(watch.elapsed(Duration::from_secs(60)), Duration::from_secs(3));
    }

    #[test]
    fn test_seed_is_set_once() {
        let mut run = run(RunVariant::Solo, &[1]);
        assert!(run.set_seed(42));
        assert!(!run.set_seed(7));
        assert_eq!(run.seed(), Some(42));
    }

    #[test]
    fn test_duel_sides() {
        let run = run(RunVariant::Duel, &[1, 2]);
        assert_eq!(run.sides(), (vec![1], vec![2]));
        assert_eq!(run.opponents_of(1), vec![2]);
        assert_eq!(run.opponents_of(2), vec![1]);
        assert!(run.opponents_of(9).is_empty());
    }

    #[test]
    fn test_team_duel_sides_and_worlds() {
        let run = run(RunVariant::TeamDuel, &[1, 2, 3, 4]);
        assert_eq!(run.sides(), (vec![1, 2], vec![3, 4]));
        assert_eq!(run.side_of(2), vec![1, 2]);
        assert_eq!(run.opponents_of(4), vec![1, 2]);
        assert_eq!(run.world_groups(), vec![vec![1, 2], vec![3, 4]]);
        assert_eq!(run.world_group_of(3), vec![3, 4]);
    }

    #[test]
    fn test_coop_shares_one_world_group() {
        let run = run(RunVariant::Coop, &[5, 6]);
        assert_eq!(run.world_groups(), vec![vec![5, 6]]);
        assert!(run.opponents_of(5).is_empty());
    }

    #[test]
    fn test_latest_throws_keeps_last_two() {
        let mut run = run(RunVariant::Solo, &[1]);
        let runner = run.runner_mut(1).unwrap();
        let throw = |t| ThrowEvent::new(Default::default(), Default::default(), t);

        runner.record_throw(throw(1));
        assert!(runner.latest_throws().is_empty());

        runner.record_throw(throw(2));
        runner.record_throw(throw(3));
        let latest: Vec<u64> = runner.latest_throws().iter().map(|t| t.timestamp).collect();
        assert_eq!(latest, vec![2, 3]);

        runner.clear_throws();
        assert_eq!(runner.throw_count(), 0);
    }
}
