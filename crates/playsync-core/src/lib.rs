#![forbid(unsafe_code)]

//! Core: cancellation, observable references, and buffered time ranges.
//!
//! # Role in playsync
//! `playsync-core` holds the leaf primitives every observer is built from.
//! Nothing here knows about media elements or manifests.
//!
//! # Primary responsibilities
//! - **Canceller / CancellationSignal**: one-shot, hierarchical teardown.
//! - **SharedReference**: single-writer value cell with synchronous,
//!   ordered listener notification scoped by cancellation signals.
//! - **TimeRanges**: normalized buffered-interval sets.
//!
//! # How it fits in the system
//! `playsync-observe` samples the media element into a `SharedReference`,
//! derives further references from it, and ties every subscription to a
//! `CancellationSignal` so that stopping an observer tears down the whole
//! branch synchronously.

pub mod cancel;
pub mod logging;
pub mod shared_ref;
pub mod time_ranges;

pub use cancel::{CancellationError, CancellationSignal, Canceller, RegistrationId};
pub use shared_ref::{ListenOptions, ReadOnlyReference, SharedReference};
pub use time_ranges::{TimeRange, TimeRanges};
