//! Inactivity tracking for run participants.

use crate::timers::TimerHandle;
use log::debug;
use shared::{PlayerId, Vec3};
use std::collections::{HashMap, HashSet};
use std::time::Duration;

#[derive(Debug, Clone)]
struct Activity {
    last_position: Option<Vec3>,
    last_active: Duration,
    warned: bool,
}

/// Players to warn and players to evict after one sweep.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct AfkReport {
    pub warn: Vec<PlayerId>,
    pub evict: Vec<PlayerId>,
}

impl AfkReport {
    pub fn is_empty(&self) -> bool {
        self.warn.is_empty() && self.evict.is_empty()
    }
}

/// Watches participants while at least one run exists.
///
/// Movement below `min_distance` does not count. A player is warned once when
/// less than `warning_lead` remains and evicted when `timeout` passes without
/// activity.
#[derive(Debug)]
pub struct AfkMonitor {
    enabled: bool,
    timeout: Duration,
    warning_lead: Duration,
    min_distance: f64,
    activity: HashMap<PlayerId, Activity>,
    check_handle: Option<TimerHandle>,
}

impl AfkMonitor {
    pub fn new(timeout: Duration, warning_lead: Duration, min_distance: f64) -> Self {
        Self {
            enabled: false,
            timeout,
            warning_lead,
            min_distance,
            activity: HashMap::new(),
            check_handle: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Returns `true` if monitoring was off.
    pub fn enable(&mut self) -> bool {
        if self.enabled {
            return false;
        }
        debug!("AFK monitoring enabled");
        self.enabled = true;
        true
    }

    pub fn disable(&mut self) -> bool {
        if !self.enabled {
            return false;
        }
        debug!("AFK monitoring disabled");
        self.enabled = false;
        self.activity.clear();
        true
    }

    pub fn check_handle(&self) -> Option<TimerHandle> {
        self.check_handle
    }

    pub fn set_check_handle(&mut self, handle: Option<TimerHandle>) {
        self.check_handle = handle;
    }

    pub fn record_movement(&mut self, player: PlayerId, position: Vec3, now: Duration) {
        if !self.enabled {
            return;
        }

        let min_distance = self.min_distance;
        let entry = self.activity.entry(player).or_insert_with(|| Activity {
            last_position: None,
            last_active: now,
            warned: false,
        });

        match entry.last_position {
            Some(last) if last.distance(&position) < min_distance => {}
            _ => {
                entry.last_position = Some(position);
                entry.last_active = now;
                entry.warned = false;
            }
        }
    }

    /// Any non-movement interaction counts as activity.
    pub fn record_activity(&mut self, player: PlayerId, now: Duration) {
        if !self.enabled {
            return;
        }
        let entry = self.activity.entry(player).or_insert_with(|| Activity {
            last_position: None,
            last_active: now,
            warned: false,
        });
        entry.last_active = now;
        entry.warned = false;
    }

    pub fn forget(&mut self, player: PlayerId) {
        self.activity.remove(&player);
    }

    /// Sweeps the tracked participants. Players seen for the first time start
    /// their inactivity window now; records for non-participants are dropped.
    pub fn check(&mut self, participants: &HashSet<PlayerId>, now: Duration) -> AfkReport {
        let mut report = AfkReport::default();
        if !self.enabled {
            return report;
        }

        self.activity.retain(|player, _| participants.contains(player));

        let warn_after = self.timeout.saturating_sub(self.warning_lead);
        let mut players: Vec<PlayerId> = participants.iter().copied().collect();
        players.sort_unstable();

        for player in players {
            let entry = self.activity.entry(player).or_insert_with(|| Activity {
                last_position: None,
                last_active: now,
                warned: false,
            });

            let idle = now.saturating_sub(entry.last_active);
            if idle >= self.timeout {
                report.evict.push(player);
            } else if idle >= warn_after && !entry.warned {
                entry.warned = true;
                report.warn.push(player);
            }
        }

        for player in &report.evict {
            self.activity.remove(player);
        }

        report
    }
}
