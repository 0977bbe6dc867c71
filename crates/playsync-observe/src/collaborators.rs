//! Read-only contracts of the components the core builder consults.
//!
//! Manifest parsing, segment buffering and text rendering live elsewhere;
//! the builder only asks them for the few values it fuses into a
//! [`CorePlaybackObservation`](crate::observation::CorePlaybackObservation).

use std::cell::RefCell;

use playsync_core::TimeRanges;
use serde::{Deserialize, Serialize};

use crate::observation::BufferType;

/// Time bounds of a manifest period, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PeriodBounds {
    pub start: f64,
    /// `None` while the end is not known yet.
    pub end: Option<f64>,
}

impl PeriodBounds {
    #[must_use]
    pub const fn new(start: f64, end: Option<f64>) -> Self {
        Self { start, end }
    }
}

/// What the builder needs from the manifest. Queried on every rebuild, so
/// implementations should reflect manifest updates immediately.
pub trait ManifestState {
    /// Whether the content may still grow (live).
    fn is_dynamic(&self) -> bool;
    /// Whether the last period of a dynamic content is final.
    fn is_last_period_known(&self) -> bool;
    /// Periods in chronological order.
    fn periods(&self) -> Vec<PeriodBounds>;
    /// Maximum position that is safe to seek to.
    fn maximum_safe_position(&self) -> f64;
}

/// Buffered ranges of the media buffers fed by the segment pipeline.
pub trait SegmentSinksStore {
    /// `None` when no buffer of that type was created.
    fn buffered(&self, buffer_type: BufferType) -> Option<TimeRanges>;
}

/// Buffered ranges of the text track renderer.
pub trait TextDisplayer {
    fn buffered(&self) -> TimeRanges;
}

/// Plain, mutable [`ManifestState`] for hosts that mirror a manifest they
/// parse elsewhere.
#[derive(Debug, Default)]
pub struct ManifestSnapshot {
    state: RefCell<SnapshotState>,
}

#[derive(Debug, Clone, Default)]
struct SnapshotState {
    dynamic: bool,
    last_period_known: bool,
    periods: Vec<PeriodBounds>,
    maximum_safe_position: f64,
}

impl ManifestSnapshot {
    /// A finished, static content made of `periods`.
    #[must_use]
    pub fn static_content(periods: Vec<PeriodBounds>) -> Self {
        let maximum = periods
            .last()
            .and_then(|p| p.end)
            .unwrap_or_default();
        Self {
            state: RefCell::new(SnapshotState {
                dynamic: false,
                last_period_known: true,
                periods,
                maximum_safe_position: maximum,
            }),
        }
    }

    /// A live content whose last period may still change.
    #[must_use]
    pub fn dynamic_content(periods: Vec<PeriodBounds>, maximum_safe_position: f64) -> Self {
        Self {
            state: RefCell::new(SnapshotState {
                dynamic: true,
                last_period_known: false,
                periods,
                maximum_safe_position,
            }),
        }
    }

    pub fn set_periods(&self, periods: Vec<PeriodBounds>) {
        self.state.borrow_mut().periods = periods;
    }

    pub fn set_maximum_safe_position(&self, position: f64) {
        self.state.borrow_mut().maximum_safe_position = position;
    }

    pub fn set_last_period_known(&self, known: bool) {
        self.state.borrow_mut().last_period_known = known;
    }

    /// Mark the content as no longer growing.
    pub fn end_content(&self) {
        let mut state = self.state.borrow_mut();
        state.dynamic = false;
        state.last_period_known = true;
    }
}

impl ManifestState for ManifestSnapshot {
    fn is_dynamic(&self) -> bool {
        self.state.borrow().dynamic
    }

    fn is_last_period_known(&self) -> bool {
        self.state.borrow().last_period_known
    }

    fn periods(&self) -> Vec<PeriodBounds> {
        self.state.borrow().periods.clone()
    }

    fn maximum_safe_position(&self) -> f64 {
        self.state.borrow().maximum_safe_position
    }
}
