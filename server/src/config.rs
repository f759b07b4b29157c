//! Tunable durations and limits for the run engine.

use shared::{COUNTDOWN_SECONDS, FINISH_DELAY_TICKS, TICK_MILLIS};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct GameConfig {
    /// Length of one scheduler tick
    pub tick: Duration,
    /// Countdown between world provisioning and the start signal, same for every mode
    pub countdown_seconds: u32,
    /// How long a challenge or invite stays open
    pub request_timeout: Duration,
    /// Ticks between a finished run and its teardown
    pub finish_delay_ticks: u64,
    /// Runs still waiting for worlds after this long are aborted
    pub provisioning_timeout: Duration,
    pub afk_timeout: Duration,
    pub afk_warning_lead: Duration,
    pub afk_check_interval: Duration,
    /// Movement shorter than this does not count as activity
    pub afk_min_distance: f64,
    pub leaderboard_size: usize,
    pub max_seed_request: u32,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_millis(TICK_MILLIS),
            countdown_seconds: COUNTDOWN_SECONDS,
            request_timeout: Duration::from_secs(30),
            finish_delay_ticks: FINISH_DELAY_TICKS,
            provisioning_timeout: Duration::from_secs(120),
            afk_timeout: Duration::from_secs(300),
            afk_warning_lead: Duration::from_secs(60),
            afk_check_interval: Duration::from_secs(10),
            afk_min_distance: 2.0,
            leaderboard_size: 10,
            max_seed_request: 10,
        }
    }
}

impl GameConfig {
    /// Converts a tick count into wall-clock duration.
    pub fn ticks(&self, ticks: u64) -> Duration {
        self.tick.saturating_mul(ticks.min(u32::MAX as u64) as u32)
    }

    pub fn finish_delay(&self) -> Duration {
        self.ticks(self.finish_delay_ticks)
    }
}
