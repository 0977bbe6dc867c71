//! Contract for the media element being observed.
//!
//! The observer never caches anything read from here: every native event is
//! a bare "something changed" signal and the state is re-queried on each
//! sample.

use serde::{Deserialize, Serialize};

use playsync_core::TimeRanges;

/// `HTMLMediaElement.readyState` equivalent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ReadyState {
    HaveNothing = 0,
    HaveMetadata = 1,
    HaveCurrentData = 2,
    HaveFutureData = 3,
    HaveEnoughData = 4,
}

impl ReadyState {
    /// Map a raw numeric code; anything above 4 saturates to
    /// [`ReadyState::HaveEnoughData`].
    #[must_use]
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => Self::HaveNothing,
            1 => Self::HaveMetadata,
            2 => Self::HaveCurrentData,
            3 => Self::HaveFutureData,
            _ => Self::HaveEnoughData,
        }
    }

    #[must_use]
    pub fn code(self) -> u8 {
        self as u8
    }
}

/// Native events the host forwards to the observer. They carry no payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaEvent {
    CanPlay,
    Ended,
    Play,
    Pause,
    Seeking,
    Seeked,
    LoadedMetadata,
    RateChange,
    TimeUpdate,
}

/// Synchronous view of the underlying media clock and buffer.
pub trait MediaElement {
    /// Current playback position in seconds.
    fn current_time(&self) -> f64;
    /// Content duration in seconds (`NaN` while unknown).
    fn duration(&self) -> f64;
    fn is_paused(&self) -> bool;
    fn is_seeking(&self) -> bool;
    fn is_ended(&self) -> bool;
    fn ready_state(&self) -> ReadyState;
    /// Everything currently decodable, across all buffers.
    fn buffered(&self) -> TimeRanges;
    fn playback_rate(&self) -> f64;
    fn set_playback_rate(&self, rate: f64);
    /// Request a seek. The element reports progress through
    /// [`MediaEvent::Seeking`] / [`MediaEvent::Seeked`].
    fn set_current_time(&self, position: f64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ready_state_codes_round_trip() {
        for code in 0..=4u8 {
            assert_eq!(ReadyState::from_code(code).code(), code);
        }
        assert_eq!(ReadyState::from_code(9), ReadyState::HaveEnoughData);
    }

    #[test]
    fn ready_state_orders_by_code() {
        assert!(ReadyState::HaveMetadata < ReadyState::HaveFutureData);
        assert!(ReadyState::HaveNothing < ReadyState::HaveMetadata);
    }

    #[test]
    fn media_event_wire_names() {
        let json = serde_json::to_string(&MediaEvent::LoadedMetadata).expect("serialize");
        assert_eq!(json, r#""loadedmetadata""#);
    }
}
