#![forbid(unsafe_code)]

//! Playback observation: from a noisy media clock to per-consumer snapshots.
//!
//! # Role in playsync
//! `playsync-observe` turns the state of a media element into a stream of
//! immutable observations and fans it out to the components that need it,
//! locally or across an execution boundary.
//!
//! # Primary responsibilities
//! - **MediaElementPlaybackObserver**: samples the element on native events
//!   and on a fallback timer, coalescing bursts into one observation.
//! - **Derived observers**: transform an observer's stream once-per-update,
//!   with lifetimes chained through cancellation signals.
//! - **Core observation**: fuses the base observation with manifest,
//!   speed and buffer state for buffering and adaptation logic.
//! - **Transport**: JSON messages tagged by content id, a channel-backed
//!   port, and the worker-side observer they feed.
//!
//! # How it fits in the system
//! The host owns the media element, forwards its events to a
//! [`MediaElementPlaybackObserver`] and ticks it once per scheduler turn.
//! Consumers derive what they need with
//! [`PlaybackObserver::derive_read_only_observer`] or
//! [`create_core_playback_observer`]. When consumers run in a worker, an
//! [`ObservationForwarder`] ships observations to a
//! [`WorkerObservationReceiver`], whose [`WorkerPlaybackObserver`] supports
//! the same derivations.

pub mod collaborators;
pub mod config;
pub mod core_observation;
pub mod error;
pub mod media;
pub mod observation;
pub mod observer;
pub mod sampler;
mod stall;
pub mod transport;
mod wire;

pub use collaborators::{
    ManifestSnapshot, ManifestState, PeriodBounds, SegmentSinksStore, TextDisplayer,
};
pub use config::ObserverConfig;
pub use core_observation::{CoreObservationInputs, create_core_playback_observer};
pub use error::TransportError;
pub use media::{MediaElement, MediaEvent, ReadyState};
pub use observation::{
    BaseObservation, BufferType, BufferedByType, CorePlaybackObservation, FreezingStatus,
    ObservationEvent, ObservationPosition, PausedState, RebufferingReason, RebufferingStatus,
    SeekingState,
};
pub use observer::{
    ClockAccess, DerivedObserver, MediaElementPlaybackObserver, NoClock, PlaybackObserver,
    WorkerPlaybackObserver, map_observer,
};
pub use sampler::SamplingSchedule;
pub use transport::{
    ChannelPort, ContentId, MainThreadMessage, MainThreadPort, MessagePort,
    ObservationForwarder, PlaybackRateApplier, WorkerMessage, WorkerObservationReceiver,
    WorkerPort,
};
