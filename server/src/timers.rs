//! Deterministic scheduler driven by the engine's logical clock.
//!
//! Nothing here reads wall-clock time. The server loop advances the clock once
//! per tick and tests advance it by hand, so every delayed action (request
//! expiry, countdown steps, teardown, watchdogs) fires in a reproducible order:
//! by deadline, then by scheduling order.

use crate::model::RunId;
use crate::provisioning::ProvisionTicket;
use shared::{GameMode, PlayerId};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle(u64);

/// Which request table a pending request lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    Invite,
    Duel,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scheduled {
    RequestExpired {
        mode: GameMode,
        kind: RequestKind,
        target: PlayerId,
        request_id: u64,
    },
    Countdown {
        run: RunId,
        remaining: u32,
    },
    FinishRun {
        run: RunId,
    },
    ProvisioningWatchdog {
        run: RunId,
        ticket: ProvisionTicket,
    },
    AfkCheck,
}

#[derive(Debug, Default)]
pub struct TimerQueue {
    now: Duration,
    next_id: u64,
    queue: BTreeMap<(Duration, u64), Scheduled>,
    deadlines: HashMap<u64, Duration>,
}

impl TimerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now(&self) -> Duration {
        self.now
    }

    pub fn schedule(&mut self, delay: Duration, event: Scheduled) -> TimerHandle {
        let id = self.next_id;
        self.next_id += 1;

        let deadline = self.now + delay;
        self.queue.insert((deadline, id), event);
        self.deadlines.insert(id, deadline);
        TimerHandle(id)
    }

    /// Returns `true` if the timer was still pending.
    pub fn cancel(&mut self, handle: TimerHandle) -> bool {
        match self.deadlines.remove(&handle.0) {
            Some(deadline) => self.queue.remove(&(deadline, handle.0)).is_some(),
            None => false,
        }
    }

    pub fn is_pending(&self, handle: TimerHandle) -> bool {
        self.deadlines.contains_key(&handle.0)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Pops the earliest event due at or before `until`, moving the clock to
    /// its deadline. Events scheduled while handling a popped event are seen
    /// by the next call.
    pub fn pop_due(&mut self, until: Duration) -> Option<Scheduled> {
        let (&(deadline, id), _) = self.queue.iter().next()?;
        if deadline > until {
            return None;
        }

        let event = self.queue.remove(&(deadline, id))?;
        self.deadlines.remove(&id);
        if deadline > self.now {
            self.now = deadline;
        }
        Some(event)
    }

    /// Moves the clock forward once every due event has been popped.
    pub fn settle(&mut self, until: Duration) {
        if until > self.now {
            self.now = until;
        }
    }
}
