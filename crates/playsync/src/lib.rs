#![forbid(unsafe_code)]

//! playsync public facade crate.
//!
//! Re-exports the primitives and observers under stable paths. Most users
//! only need `use playsync::prelude::*;`.

pub use playsync_core as core;
#[cfg(feature = "observe")]
pub use playsync_observe as observe;

pub use playsync_core::{
    CancellationError, CancellationSignal, Canceller, ListenOptions, ReadOnlyReference,
    SharedReference, TimeRange, TimeRanges,
};

pub mod prelude {
    pub use playsync_core::{
        CancellationSignal, Canceller, ListenOptions, ReadOnlyReference, SharedReference,
        TimeRanges,
    };

    #[cfg(feature = "observe")]
    pub use playsync_observe::{
        BaseObservation, ClockAccess, ContentId, CoreObservationInputs, CorePlaybackObservation,
        DerivedObserver, MediaElement, MediaElementPlaybackObserver, MediaEvent, MessagePort,
        ObserverConfig, PlaybackObserver, WorkerPlaybackObserver, create_core_playback_observer,
        map_observer,
    };
}
