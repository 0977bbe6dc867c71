//! Rebuffering and freezing detection.
//!
//! Both checks compare a fresh sample with the previous observation. They are
//! pure: the caller supplies the timestamp to stamp a new status with.

use crate::config::ObserverConfig;
use crate::media::ReadyState;
use crate::observation::{
    BaseObservation, FreezingStatus, ObservationEvent, RebufferingReason, RebufferingStatus,
    SeekingState,
};

/// Fields of the sample being built that stall detection looks at.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SampleFacts {
    pub event: ObservationEvent,
    pub position: f64,
    pub buffer_gap: Option<f64>,
    pub current_range_end: Option<f64>,
    pub duration: f64,
    pub paused: bool,
    pub ready_state: ReadyState,
    pub ended: bool,
    pub seeking: SeekingState,
    pub playback_rate: f64,
}

fn is_fully_loaded(facts: &SampleFacts, config: &ObserverConfig) -> bool {
    if facts.ended {
        return true;
    }
    match facts.current_range_end {
        Some(end) if facts.duration.is_finite() => {
            facts.duration - end <= config.end_of_content_tolerance
        }
        _ => false,
    }
}

fn resume_gap(reason: RebufferingReason, config: &ObserverConfig) -> f64 {
    match reason {
        RebufferingReason::Seeking => config.resume_gap_after_seeking,
        RebufferingReason::NotReady => config.resume_gap_after_not_enough_data,
        RebufferingReason::Buffering => config.resume_gap_after_buffering,
    }
}

/// Next rebuffering status given the previous observation and a new sample.
pub(crate) fn rebuffering_status(
    prev: &BaseObservation,
    facts: &SampleFacts,
    config: &ObserverConfig,
    now_ms: f64,
) -> Option<RebufferingStatus> {
    if !config.with_media_source {
        return None;
    }

    let fully_loaded = is_fully_loaded(facts, config);
    let prev_rebuffering = prev.rebuffering;
    let can_switch_to_rebuffering = facts.ready_state >= ReadyState::HaveMetadata
        && facts.event != ObservationEvent::LoadedMetadata
        && prev_rebuffering.is_none()
        && !fully_loaded;

    let mut should_rebuffer = false;
    let mut should_stop_rebuffer = false;
    let mut end_position: Option<f64> = None;

    if can_switch_to_rebuffering {
        match facts.buffer_gap {
            None if facts.ready_state < ReadyState::HaveFutureData => {
                should_rebuffer = true;
            }
            Some(gap) if gap <= config.rebuffering_gap => {
                should_rebuffer = true;
                end_position = Some(facts.position + gap);
            }
            _ => {}
        }
    } else if let Some(prev_status) = prev_rebuffering {
        let resume = resume_gap(prev_status.reason, config);
        let enough_data = fully_loaded || facts.buffer_gap.is_some_and(|gap| gap > resume);
        if (facts.ready_state > ReadyState::HaveMetadata && enough_data)
            || (facts.buffer_gap.is_none() && facts.ready_state >= ReadyState::HaveFutureData)
        {
            should_stop_rebuffer = true;
        } else if let Some(gap) = facts.buffer_gap {
            end_position = Some(facts.position + gap);
        }
    }

    if should_stop_rebuffer || !(should_rebuffer || prev_rebuffering.is_some()) {
        return None;
    }

    let reason = if facts.event == ObservationEvent::Seeking
        || facts.event == ObservationEvent::InternalSeeking
        || facts.seeking != SeekingState::None
        || prev_rebuffering.is_some_and(|p| p.reason == RebufferingReason::Seeking)
    {
        RebufferingReason::Seeking
    } else if facts.ready_state == ReadyState::HaveMetadata {
        RebufferingReason::NotReady
    } else {
        RebufferingReason::Buffering
    };

    let timestamp_ms = match prev_rebuffering {
        Some(p) if p.reason == reason => p.timestamp_ms,
        _ => now_ms,
    };
    Some(RebufferingStatus {
        reason,
        timestamp_ms,
        position: end_position,
    })
}

/// Next freezing status given the previous observation and a new sample.
pub(crate) fn freezing_status(
    prev: &BaseObservation,
    facts: &SampleFacts,
    config: &ObserverConfig,
    now_ms: f64,
) -> Option<FreezingStatus> {
    let position_moved = prev.position.polled() != facts.position;
    if let Some(prev_freezing) = prev.freezing {
        if facts.ended
            || facts.paused
            || facts.ready_state == ReadyState::HaveNothing
            || facts.playback_rate == 0.0
            || position_moved
        {
            return None;
        }
        return Some(prev_freezing);
    }

    let frozen = facts.event.is_periodic()
        && facts
            .buffer_gap
            .is_some_and(|gap| gap > config.minimum_buffer_before_freezing)
        && !facts.ended
        && !facts.paused
        && facts.ready_state >= ReadyState::HaveMetadata
        && facts.playback_rate != 0.0
        && !position_moved;
    frozen.then_some(FreezingStatus {
        timestamp_ms: now_ms,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observation::ObservationPosition;

    fn facts() -> SampleFacts {
        SampleFacts {
            event: ObservationEvent::TimeUpdate,
            position: 10.0,
            buffer_gap: Some(20.0),
            current_range_end: Some(30.0),
            duration: 100.0,
            paused: false,
            ready_state: ReadyState::HaveEnoughData,
            ended: false,
            seeking: SeekingState::None,
            playback_rate: 1.0,
        }
    }

    fn prev_at(position: f64) -> BaseObservation {
        BaseObservation {
            position: ObservationPosition::new(position, None),
            ..BaseObservation::initial()
        }
    }

    #[test]
    fn healthy_playback_is_not_rebuffering() {
        let config = ObserverConfig::default();
        assert!(rebuffering_status(&prev_at(9.0), &facts(), &config, 5.0).is_none());
    }

    #[test]
    fn low_gap_starts_buffering() {
        let config = ObserverConfig::default();
        let f = SampleFacts {
            buffer_gap: Some(0.3),
            ready_state: ReadyState::HaveCurrentData,
            ..facts()
        };
        let status = rebuffering_status(&prev_at(9.0), &f, &config, 5.0).expect("stalled");
        assert_eq!(status.reason, RebufferingReason::Buffering);
        assert_eq!(status.timestamp_ms, 5.0);
        assert_eq!(status.position, Some(10.3));
    }

    #[test]
    fn unbuffered_position_with_low_ready_state_stalls() {
        let config = ObserverConfig::default();
        let f = SampleFacts {
            buffer_gap: None,
            current_range_end: None,
            ready_state: ReadyState::HaveMetadata,
            ..facts()
        };
        let status = rebuffering_status(&prev_at(9.0), &f, &config, 1.0).expect("stalled");
        assert_eq!(status.reason, RebufferingReason::NotReady);
        assert_eq!(status.position, None);
    }

    #[test]
    fn seeking_event_gives_seeking_reason() {
        let config = ObserverConfig::default();
        let f = SampleFacts {
            event: ObservationEvent::Seeking,
            buffer_gap: None,
            current_range_end: None,
            ready_state: ReadyState::HaveMetadata,
            seeking: SeekingState::External,
            ..facts()
        };
        let status = rebuffering_status(&prev_at(9.0), &f, &config, 1.0).expect("stalled");
        assert_eq!(status.reason, RebufferingReason::Seeking);
    }

    #[test]
    fn stall_keeps_timestamp_and_ends_past_resume_gap() {
        let config = ObserverConfig::default();
        let mut prev = prev_at(10.0);
        prev.rebuffering = Some(RebufferingStatus {
            reason: RebufferingReason::Buffering,
            timestamp_ms: 2.0,
            position: Some(10.3),
        });

        let still_low = SampleFacts {
            buffer_gap: Some(3.0),
            ready_state: ReadyState::HaveCurrentData,
            ..facts()
        };
        let status = rebuffering_status(&prev, &still_low, &config, 9.0).expect("still stalled");
        assert_eq!(status.timestamp_ms, 2.0);
        assert_eq!(status.position, Some(13.0));

        let recovered = SampleFacts {
            buffer_gap: Some(6.0),
            ..facts()
        };
        assert!(rebuffering_status(&prev, &recovered, &config, 10.0).is_none());
    }

    #[test]
    fn loaded_until_end_never_stalls() {
        let config = ObserverConfig::default();
        let f = SampleFacts {
            position: 99.9,
            buffer_gap: Some(0.05),
            current_range_end: Some(99.95),
            ..facts()
        };
        assert!(rebuffering_status(&prev_at(99.8), &f, &config, 1.0).is_none());
    }

    #[test]
    fn no_stall_detection_without_media_source() {
        let config = ObserverConfig::default().with_media_source(false);
        let f = SampleFacts {
            buffer_gap: Some(0.0),
            ..facts()
        };
        assert!(rebuffering_status(&prev_at(9.0), &f, &config, 1.0).is_none());
    }

    #[test]
    fn still_position_while_playing_freezes() {
        let config = ObserverConfig::default();
        let status = freezing_status(&prev_at(10.0), &facts(), &config, 7.0).expect("frozen");
        assert_eq!(status.timestamp_ms, 7.0);
    }

    #[test]
    fn moving_position_does_not_freeze() {
        let config = ObserverConfig::default();
        assert!(freezing_status(&prev_at(9.5), &facts(), &config, 7.0).is_none());
    }

    #[test]
    fn freeze_only_on_periodic_samples() {
        let config = ObserverConfig::default();
        let f = SampleFacts {
            event: ObservationEvent::Play,
            ..facts()
        };
        assert!(freezing_status(&prev_at(10.0), &f, &config, 7.0).is_none());
    }

    #[test]
    fn freeze_persists_until_pause() {
        let config = ObserverConfig::default();
        let mut prev = prev_at(10.0);
        prev.freezing = Some(FreezingStatus { timestamp_ms: 3.0 });
        let kept = freezing_status(&prev, &facts(), &config, 8.0).expect("still frozen");
        assert_eq!(kept.timestamp_ms, 3.0);

        let paused = SampleFacts {
            paused: true,
            ..facts()
        };
        assert!(freezing_status(&prev, &paused, &config, 8.0).is_none());
    }
}
