//! Observation snapshots.
//!
//! Every type here is an immutable value: observers build a fresh snapshot
//! per update and hand it to their reference wholesale. All of them are
//! serializable so a snapshot can cross an execution boundary and be rebuilt
//! identically on the other side.

use serde::{Deserialize, Serialize};

use playsync_core::{TimeRange, TimeRanges};

use crate::media::{MediaEvent, ReadyState};

/// What triggered an observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ObservationEvent {
    /// First observation, emitted on start.
    Init,
    CanPlay,
    Ended,
    Play,
    Pause,
    Seeking,
    Seeked,
    LoadedMetadata,
    RateChange,
    TimeUpdate,
    /// A seek requested through the observer itself.
    InternalSeeking,
    /// Fallback timer.
    Interval,
}

impl ObservationEvent {
    /// Rank used to pick the reason of a coalesced observation: when several
    /// events arrive in one turn, the highest rank wins.
    #[must_use]
    pub fn significance(self) -> u8 {
        match self {
            Self::Interval => 0,
            Self::TimeUpdate => 1,
            Self::RateChange => 2,
            Self::Play | Self::Pause => 3,
            Self::CanPlay => 4,
            Self::LoadedMetadata => 5,
            Self::Ended => 6,
            Self::Seeked => 7,
            Self::Seeking => 8,
            Self::InternalSeeking => 9,
            Self::Init => 10,
        }
    }

    /// Whether this sample can reveal a frozen position.
    #[must_use]
    pub fn is_periodic(self) -> bool {
        matches!(self, Self::TimeUpdate | Self::Interval)
    }
}

impl From<MediaEvent> for ObservationEvent {
    fn from(event: MediaEvent) -> Self {
        match event {
            MediaEvent::CanPlay => Self::CanPlay,
            MediaEvent::Ended => Self::Ended,
            MediaEvent::Play => Self::Play,
            MediaEvent::Pause => Self::Pause,
            MediaEvent::Seeking => Self::Seeking,
            MediaEvent::Seeked => Self::Seeked,
            MediaEvent::LoadedMetadata => Self::LoadedMetadata,
            MediaEvent::RateChange => Self::RateChange,
            MediaEvent::TimeUpdate => Self::TimeUpdate,
        }
    }
}

/// Rendered position and the position playback is heading to.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ObservationPosition {
    #[serde(with = "crate::wire::non_finite_f64")]
    last: f64,
    #[serde(with = "crate::wire::non_finite_f64")]
    wanted: f64,
}

impl ObservationPosition {
    /// `wanted` defaults to `last` when no seek is pending.
    #[must_use]
    pub fn new(last: f64, wanted: Option<f64>) -> Self {
        Self {
            last,
            wanted: wanted.unwrap_or(last),
        }
    }

    /// Position as read from the media element.
    #[inline]
    #[must_use]
    pub fn polled(&self) -> f64 {
        self.last
    }

    /// Position playback should be at once pending seeks settle.
    #[inline]
    #[must_use]
    pub fn wanted(&self) -> f64 {
        self.wanted
    }

    /// Whether a seek target differs from the rendered position.
    #[must_use]
    pub fn is_awaiting_seek(&self) -> bool {
        self.wanted != self.last
    }

    /// Copy with a replaced wanted position.
    #[must_use]
    pub fn with_wanted(self, wanted: f64) -> Self {
        Self { wanted, ..self }
    }
}

/// Who initiated the seek currently in progress, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SeekingState {
    #[default]
    None,
    /// Seek requested through the observer.
    Internal,
    /// Seek coming from outside (user, native controls).
    External,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RebufferingReason {
    Seeking,
    NotReady,
    Buffering,
}

/// Playback is stalled waiting for data.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RebufferingStatus {
    pub reason: RebufferingReason,
    /// When the stall started, in ms since the observer was created.
    pub timestamp_ms: f64,
    /// Expected position at which data is missing, when known.
    #[serde(with = "crate::wire::non_finite_opt_f64")]
    pub position: Option<f64>,
}

/// Playback is supposedly running but the position does not move.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FreezingStatus {
    pub timestamp_ms: f64,
}

/// Raw sample of the media element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BaseObservation {
    pub event: ObservationEvent,
    pub position: ObservationPosition,
    #[serde(with = "crate::wire::non_finite_f64")]
    pub duration: f64,
    pub paused: bool,
    pub ready_state: ReadyState,
    pub buffered: TimeRanges,
    /// Seconds buffered ahead of the polled position, `None` when it is not
    /// buffered.
    #[serde(with = "crate::wire::non_finite_opt_f64")]
    pub buffer_gap: Option<f64>,
    pub current_range: Option<TimeRange>,
    pub seeking: SeekingState,
    pub ended: bool,
    #[serde(with = "crate::wire::non_finite_f64")]
    pub playback_rate: f64,
    pub rebuffering: Option<RebufferingStatus>,
    pub freezing: Option<FreezingStatus>,
}

impl BaseObservation {
    /// Placeholder used before the first sample.
    #[must_use]
    pub fn initial() -> Self {
        Self {
            event: ObservationEvent::Init,
            position: ObservationPosition::new(0.0, None),
            duration: f64::NAN,
            paused: true,
            ready_state: ReadyState::HaveNothing,
            buffered: TimeRanges::new(),
            buffer_gap: None,
            current_range: None,
            seeking: SeekingState::None,
            ended: false,
            playback_rate: 1.0,
            rebuffering: None,
            freezing: None,
        }
    }
}

/// Media buffers whose contents are tracked separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BufferType {
    Audio,
    Video,
    Text,
}

impl BufferType {
    pub const ALL: [BufferType; 3] = [BufferType::Audio, BufferType::Video, BufferType::Text];
}

/// Buffered ranges per buffer; `None` when that buffer does not exist.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BufferedByType {
    pub audio: Option<TimeRanges>,
    pub video: Option<TimeRanges>,
    pub text: Option<TimeRanges>,
}

impl BufferedByType {
    #[must_use]
    pub fn get(&self, buffer_type: BufferType) -> Option<&TimeRanges> {
        match buffer_type {
            BufferType::Audio => self.audio.as_ref(),
            BufferType::Video => self.video.as_ref(),
            BufferType::Text => self.text.as_ref(),
        }
    }
}

/// Paused state as observed, plus what the first play decision will do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PausedState {
    pub last: bool,
    /// `None` once the initial play action happened; before that, whether
    /// playback is expected to stay paused.
    pub pending: Option<bool>,
}

/// Fused snapshot consumed by buffering and adaptation logic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorePlaybackObservation {
    /// Maximum safe seekable position, from the manifest.
    #[serde(with = "crate::wire::non_finite_f64")]
    pub maximum_position: f64,
    #[serde(with = "crate::wire::non_finite_opt_f64")]
    pub buffer_gap: Option<f64>,
    pub position: ObservationPosition,
    pub buffered: BufferedByType,
    pub current_range: Option<TimeRange>,
    #[serde(with = "crate::wire::non_finite_f64")]
    pub duration: f64,
    pub rebuffering: Option<RebufferingStatus>,
    pub freezing: Option<FreezingStatus>,
    pub paused: PausedState,
    pub ready_state: ReadyState,
    pub seeking: SeekingState,
    pub ended: bool,
    /// Playback speed wanted by the application.
    #[serde(with = "crate::wire::non_finite_f64")]
    pub speed: f64,
}
