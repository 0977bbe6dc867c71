//! Playback observers.
//!
//! Three variants share the [`PlaybackObserver`] capability trait:
//!
//! - [`MediaElementPlaybackObserver`]: samples a local [`MediaElement`].
//! - [`WorkerPlaybackObserver`]: fed by messages from another execution
//!   context; it has no clock of its own.
//! - [`DerivedObserver`]: built from any observer through a transform.
//!
//! Clock queries go through a [`ClockAccess`] handle that derived observers
//! share with their source, so a chain of derivations still reaches the
//! original media element (or still reports "unknown" across a boundary).
//!
//! [`MediaElement`]: crate::media::MediaElement

mod derived;
mod media_element;
mod worker;

pub use derived::{DerivedObserver, map_observer};
pub use media_element::MediaElementPlaybackObserver;
pub use worker::WorkerPlaybackObserver;

use std::rc::Rc;

use playsync_core::{CancellationSignal, Canceller, ListenOptions, ReadOnlyReference};

use crate::media::ReadyState;

/// Direct access to the media clock, when the observer has any.
///
/// Every query returns `None` when no authoritative value is available from
/// this side, which callers must treat as "unknown" rather than an error.
pub trait ClockAccess {
    fn current_time(&self) -> Option<f64>;
    fn ready_state(&self) -> Option<ReadyState>;
    fn is_paused(&self) -> Option<bool>;
    fn playback_rate(&self) -> Option<f64>;
    /// Request a rate change. May be applied locally or forwarded.
    fn set_playback_rate(&self, rate: f64);
}

/// Clock with nothing behind it.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoClock;

impl ClockAccess for NoClock {
    fn current_time(&self) -> Option<f64> {
        None
    }
    fn ready_state(&self) -> Option<ReadyState> {
        None
    }
    fn is_paused(&self) -> Option<bool> {
        None
    }
    fn playback_rate(&self) -> Option<f64> {
        None
    }
    fn set_playback_rate(&self, _rate: f64) {}
}

/// Read-only view on a stream of observations of type `T`.
pub trait PlaybackObserver<T: Clone + 'static> {
    /// Reference holding the latest observation.
    fn reference(&self) -> ReadOnlyReference<T>;

    /// Signal ending this observer's lifetime.
    fn signal(&self) -> &CancellationSignal;

    /// Clock handle shared along a derivation chain.
    fn clock(&self) -> Rc<dyn ClockAccess>;

    fn current_time(&self) -> Option<f64> {
        self.clock().current_time()
    }

    fn ready_state(&self) -> Option<ReadyState> {
        self.clock().ready_state()
    }

    fn is_paused(&self) -> Option<bool> {
        self.clock().is_paused()
    }

    fn playback_rate(&self) -> Option<f64> {
        self.clock().playback_rate()
    }

    fn set_playback_rate(&self, rate: f64) {
        self.clock().set_playback_rate(rate);
    }

    /// Subscribe to observations until either this observer or
    /// `options.clear_signal` is cancelled.
    ///
    /// Registration is skipped entirely when either signal is already
    /// cancelled.
    fn listen(&self, callback: impl Fn(&T) + 'static, options: ListenOptions<'_>)
    where
        Self: Sized,
    {
        listen_scoped(&self.reference(), self.signal(), callback, options);
    }

    /// Build a new observer whose reference is produced by `transform`.
    ///
    /// `transform` runs exactly once, right now. It receives this observer's
    /// reference and the signal bounding the new observer's lifetime, and
    /// returns the reference the new observer exposes. Subscriptions it makes
    /// must be scoped to that signal.
    fn derive_read_only_observer<U, R, F>(&self, transform: F) -> DerivedObserver<U>
    where
        Self: Sized,
        U: Clone + 'static,
        R: Into<ReadOnlyReference<U>>,
        F: FnOnce(&ReadOnlyReference<T>, &CancellationSignal) -> R,
    {
        let canceller = Canceller::child_of(self.signal());
        let reference = transform(&self.reference(), canceller.signal()).into();
        DerivedObserver::new(reference, canceller, self.clock())
    }
}

/// `on_update` bounded by both an observer lifetime and an optional caller
/// signal.
pub(crate) fn listen_scoped<T: Clone + 'static>(
    reference: &ReadOnlyReference<T>,
    lifetime: &CancellationSignal,
    callback: impl Fn(&T) + 'static,
    options: ListenOptions<'_>,
) {
    if lifetime.is_cancelled() || options.clear_signal.is_some_and(CancellationSignal::is_cancelled)
    {
        return;
    }
    let scope = Canceller::child_of(lifetime);
    if let Some(extra) = options.clear_signal {
        scope.link_to_signal(extra);
    }
    reference.on_update(
        callback,
        ListenOptions {
            emit_current_value: options.emit_current_value,
            clear_signal: Some(scope.signal()),
        },
    );
}
