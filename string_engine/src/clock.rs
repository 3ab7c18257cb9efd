//! Periodic clock bookkeeping.
//!
//! The engine runs two independent clocks (arbitration and sampling).  Both
//! are driven by whoever calls [`crate::InteractionEngine::advance`]; a
//! `Periodic` only answers "is a tick due at `now`?".

use std::time::{Duration, Instant};

#[derive(Clone, Debug)]
pub struct Periodic {
    period: Duration,
    due:    Option<Instant>,
}

impl Periodic {
    /// A stopped clock with the given period.
    pub fn new(period: Duration) -> Self {
        Periodic { period, due: None }
    }

    pub fn period(&self) -> Duration { self.period }

    pub fn is_running(&self) -> bool { self.due.is_some() }

    /// Start ticking; the first tick is due one period after `now`.
    pub fn start(&mut self, now: Instant) {
        self.due = Some(now + self.period);
    }

    pub fn stop(&mut self) {
        self.due = None;
    }

    /// Consume the tick due at `now`, if any.
    ///
    /// At most one tick is reported per call.  A clock more than one period
    /// behind skips the missed ticks and reschedules from `now`.
    pub fn poll(&mut self, now: Instant) -> bool {
        let Some(due) = self.due else { return false };
        if now < due {
            return false;
        }
        let next = due + self.period;
        self.due = Some(if next <= now { now + self.period } else { next });
        true
    }
}
