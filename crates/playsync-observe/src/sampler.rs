//! Coalescing of native media events into observation triggers.
//!
//! Native events arrive in bursts (a seek typically fires `seeking`,
//! `timeupdate`, `waiting` and `seeked` within a few milliseconds). The
//! schedule keeps at most one pending trigger between two host ticks, keeping
//! the most significant reason, and falls back to a periodic
//! [`ObservationEvent::Interval`] trigger when nothing fires.
//!
//! The schedule is clock-agnostic: every method that depends on time takes
//! `now` explicitly.

use web_time::{Duration, Instant};

use crate::observation::ObservationEvent;

/// Pending trigger plus fallback-timer bookkeeping.
#[derive(Debug, Clone)]
pub struct SamplingSchedule {
    interval: Duration,
    pending: Option<ObservationEvent>,
    last_sample: Option<Instant>,
    coalesced: u64,
}

impl SamplingSchedule {
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            pending: None,
            last_sample: None,
            coalesced: 0,
        }
    }

    /// Record an event. Returns `true` when it replaced or merged with an
    /// already pending one.
    pub fn push(&mut self, event: ObservationEvent) -> bool {
        match self.pending {
            None => {
                self.pending = Some(event);
                false
            }
            Some(current) => {
                if event.significance() > current.significance() {
                    self.pending = Some(event);
                }
                self.coalesced += 1;
                true
            }
        }
    }

    /// Reason waiting for the next tick, if any.
    #[must_use]
    pub fn pending(&self) -> Option<ObservationEvent> {
        self.pending
    }

    /// Consume the trigger due at `now`: the pending event if any, else
    /// `Interval` once the fallback period elapsed since the last sample.
    pub fn take_due(&mut self, now: Instant) -> Option<ObservationEvent> {
        if let Some(event) = self.pending.take() {
            return Some(event);
        }
        match self.last_sample {
            Some(last) if now.saturating_duration_since(last) < self.interval => None,
            _ => Some(ObservationEvent::Interval),
        }
    }

    /// Note that a sample happened at `now`, restarting the fallback period.
    pub fn mark_sampled(&mut self, now: Instant) {
        self.last_sample = Some(now);
    }

    /// Time left before the fallback timer fires. Zero when a trigger is
    /// already due.
    #[must_use]
    pub fn time_until_due(&self, now: Instant) -> Duration {
        if self.pending.is_some() {
            return Duration::ZERO;
        }
        match self.last_sample {
            Some(last) => self
                .interval
                .saturating_sub(now.saturating_duration_since(last)),
            None => Duration::ZERO,
        }
    }

    /// Events merged into an already pending one since creation.
    #[must_use]
    pub fn coalesced_count(&self) -> u64 {
        self.coalesced
    }

    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Drop any pending trigger.
    pub fn clear(&mut self) {
        self.pending = None;
    }
}
