use std::fmt;
use std::rc::Rc;

use playsync_core::{CancellationSignal, ReadOnlyReference};

use super::{ClockAccess, PlaybackObserver};
use crate::observation::BaseObservation;

/// Observer living on the far side of a message channel.
///
/// Its reference is written only by the
/// [`WorkerObservationReceiver`](crate::transport::WorkerObservationReceiver)
/// that created it. Clock queries return `None`; rate changes are posted back
/// to the side owning the media element.
#[derive(Clone)]
pub struct WorkerPlaybackObserver {
    reference: ReadOnlyReference<BaseObservation>,
    signal: CancellationSignal,
    clock: Rc<dyn ClockAccess>,
}

impl fmt::Debug for WorkerPlaybackObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerPlaybackObserver")
            .field("signal", &self.signal)
            .finish_non_exhaustive()
    }
}

impl WorkerPlaybackObserver {
    pub(crate) fn new(
        reference: ReadOnlyReference<BaseObservation>,
        signal: CancellationSignal,
        clock: Rc<dyn ClockAccess>,
    ) -> Self {
        Self {
            reference,
            signal,
            clock,
        }
    }
}

impl PlaybackObserver<BaseObservation> for WorkerPlaybackObserver {
    fn reference(&self) -> ReadOnlyReference<BaseObservation> {
        self.reference.clone()
    }

    fn signal(&self) -> &CancellationSignal {
        &self.signal
    }

    fn clock(&self) -> Rc<dyn ClockAccess> {
        Rc::clone(&self.clock)
    }
}
