use std::fmt;
use std::rc::Rc;

use playsync_core::{
    CancellationSignal, Canceller, ListenOptions, ReadOnlyReference, SharedReference,
};
use tracing::debug;

use super::{ClockAccess, PlaybackObserver};

/// Observer produced by [`PlaybackObserver::derive_read_only_observer`].
///
/// Owns a canceller linked to its source: cancelling the source tears this
/// observer down, while [`DerivedObserver::stop`] only ends this branch and
/// whatever was derived from it.
pub struct DerivedObserver<U> {
    reference: ReadOnlyReference<U>,
    canceller: Canceller,
    clock: Rc<dyn ClockAccess>,
}

impl<U: fmt::Debug> fmt::Debug for DerivedObserver<U> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DerivedObserver")
            .field("reference", &self.reference)
            .field("signal", self.canceller.signal())
            .finish_non_exhaustive()
    }
}

impl<U: Clone + 'static> DerivedObserver<U> {
    pub(crate) fn new(
        reference: ReadOnlyReference<U>,
        canceller: Canceller,
        clock: Rc<dyn ClockAccess>,
    ) -> Self {
        debug!(signal_id = canceller.signal().id(), "derived observer created");
        Self {
            reference,
            canceller,
            clock,
        }
    }

    /// Tear down this branch. Idempotent.
    pub fn stop(&self) {
        debug!(signal_id = self.canceller.signal().id(), "derived observer stopped");
        self.canceller.cancel();
    }

    /// Also stop this branch when `signal` is cancelled.
    pub fn stop_with(&self, signal: &CancellationSignal) {
        self.canceller.link_to_signal(signal);
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.canceller.is_cancelled()
    }
}

impl<U: Clone + 'static> PlaybackObserver<U> for DerivedObserver<U> {
    fn reference(&self) -> ReadOnlyReference<U> {
        self.reference.clone()
    }

    fn signal(&self) -> &CancellationSignal {
        self.canceller.signal()
    }

    fn clock(&self) -> Rc<dyn ClockAccess> {
        Rc::clone(&self.clock)
    }
}

/// Derive an observer applying a pure function to every observation.
pub fn map_observer<T, U, O, F>(source: &O, f: F) -> DerivedObserver<U>
where
    T: Clone + 'static,
    U: Clone + 'static,
    O: PlaybackObserver<T>,
    F: Fn(&T) -> U + 'static,
{
    source.derive_read_only_observer(move |input: &ReadOnlyReference<T>, signal| {
        let output = SharedReference::new(input.with(&f), Some(signal));
        let writer = output.clone();
        input.on_update(
            move |value| writer.set(f(value)),
            ListenOptions::new().clear_on(signal),
        );
        output
    })
}
