//! Fusion of the base observation with manifest and buffer state.
//!
//! [`create_core_playback_observer`] derives, from any observer of
//! [`BaseObservation`]s, the observer consumed by buffering and adaptation
//! logic. It rebuilds a fresh [`CorePlaybackObservation`] whenever the base
//! observation, the wanted speed or the initial-play flag changes.

use std::cell::RefCell;
use std::rc::Rc;

use playsync_core::{CancellationSignal, ListenOptions, ReadOnlyReference, SharedReference};
use tracing::trace;

use crate::collaborators::{ManifestState, SegmentSinksStore, TextDisplayer};
use crate::observation::{
    BaseObservation, BufferType, BufferedByType, CorePlaybackObservation, ObservationPosition,
    PausedState,
};
use crate::observer::{DerivedObserver, PlaybackObserver};

/// Seconds before the end of the last period the wanted position is pulled
/// back to when the end of a finished content is not buffered.
const END_OF_CONTENT_MARGIN: f64 = 1.0;

/// Everything besides the base observation the core observation depends on.
#[derive(Clone)]
pub struct CoreObservationInputs {
    /// Whether playback should start on its own once loaded.
    pub auto_play: bool,
    /// Becomes `true` once the initial play decision was applied.
    pub initial_play_performed: ReadOnlyReference<bool>,
    /// Playback speed wanted by the application.
    pub speed: ReadOnlyReference<f64>,
    pub manifest: Rc<dyn ManifestState>,
    /// `None` before any media buffer exists.
    pub segment_sinks: Option<Rc<dyn SegmentSinksStore>>,
    pub text_displayer: Option<Rc<dyn TextDisplayer>>,
}

/// Latest value of every trigger.
struct Triggers {
    base: BaseObservation,
    speed: f64,
    initial_play_performed: bool,
}

struct CoreBuilder {
    auto_play: bool,
    manifest: Rc<dyn ManifestState>,
    segment_sinks: Option<Rc<dyn SegmentSinksStore>>,
    text_displayer: Option<Rc<dyn TextDisplayer>>,
}

impl CoreBuilder {
    fn build(&self, triggers: &Triggers) -> CorePlaybackObservation {
        let base = &triggers.base;
        CorePlaybackObservation {
            maximum_position: self.manifest.maximum_safe_position(),
            buffer_gap: base.buffer_gap,
            position: self.corrected_position(base),
            buffered: self.buffered_by_type(),
            current_range: base.current_range,
            duration: base.duration,
            rebuffering: base.rebuffering,
            freezing: base.freezing,
            paused: PausedState {
                last: base.paused,
                pending: if triggers.initial_play_performed {
                    None
                } else {
                    Some(!self.auto_play)
                },
            },
            ready_state: base.ready_state,
            seeking: base.seeking,
            ended: base.ended,
            speed: triggers.speed,
        }
    }

    /// Pull a wanted position sitting in the last second of a finished
    /// content back by one second while the end is not buffered, so playback
    /// does not stall on an imprecise last segment boundary.
    fn corrected_position(&self, base: &BaseObservation) -> ObservationPosition {
        let position = base.position;
        let manifest = &*self.manifest;
        if manifest.is_dynamic() && !manifest.is_last_period_known() {
            return position;
        }
        let Some(last_period) = manifest.periods().last().copied() else {
            return position;
        };
        let Some(period_end) = last_period.end else {
            return position;
        };

        let wanted = position.wanted();
        let near_end =
            wanted >= last_period.start && wanted >= period_end - END_OF_CONTENT_MARGIN;
        let end_buffered = base
            .buffered
            .last_end()
            .is_some_and(|end| end >= base.duration - END_OF_CONTENT_MARGIN);
        if near_end && !end_buffered {
            position.with_wanted(period_end - END_OF_CONTENT_MARGIN)
        } else {
            position
        }
    }

    fn buffered_by_type(&self) -> BufferedByType {
        let from_sinks = |buffer_type| {
            self.segment_sinks
                .as_ref()
                .and_then(|sinks| sinks.buffered(buffer_type))
        };
        BufferedByType {
            audio: from_sinks(BufferType::Audio),
            video: from_sinks(BufferType::Video),
            text: self.text_displayer.as_ref().map(|text| text.buffered()),
        }
    }
}

/// Recompute and publish. The trigger borrow is released before `set` so
/// downstream listeners may update the inputs again.
fn rebuild(
    builder: &CoreBuilder,
    triggers: &RefCell<Triggers>,
    output: &SharedReference<CorePlaybackObservation>,
    cause: &'static str,
) {
    let next = builder.build(&triggers.borrow());
    trace!(cause, wanted = next.position.wanted(), "core observation rebuilt");
    output.set(next);
}

/// Body of the derivation: runs once, then only the listeners it installs
/// produce new values.
fn core_reference(
    base_ref: &ReadOnlyReference<BaseObservation>,
    lifetime: &CancellationSignal,
    inputs: CoreObservationInputs,
) -> SharedReference<CorePlaybackObservation> {
    let CoreObservationInputs {
        auto_play,
        initial_play_performed,
        speed,
        manifest,
        segment_sinks,
        text_displayer,
    } = inputs;
    let builder = Rc::new(CoreBuilder {
        auto_play,
        manifest,
        segment_sinks,
        text_displayer,
    });
    let triggers = Rc::new(RefCell::new(Triggers {
        base: base_ref.get(),
        speed: speed.get(),
        initial_play_performed: initial_play_performed.get(),
    }));
    let output = SharedReference::new(builder.build(&triggers.borrow()), Some(lifetime));

    {
        let (builder, triggers, output) = (
            Rc::clone(&builder),
            Rc::clone(&triggers),
            output.clone(),
        );
        base_ref.on_update(
            move |base: &BaseObservation| {
                triggers.borrow_mut().base = base.clone();
                rebuild(&builder, &triggers, &output, "base");
            },
            ListenOptions::new().clear_on(lifetime),
        );
    }
    {
        let (builder, triggers, output) = (
            Rc::clone(&builder),
            Rc::clone(&triggers),
            output.clone(),
        );
        speed.on_update(
            move |speed: &f64| {
                triggers.borrow_mut().speed = *speed;
                rebuild(&builder, &triggers, &output, "speed");
            },
            ListenOptions::new().clear_on(lifetime),
        );
    }
    {
        let writer = output.clone();
        initial_play_performed.on_update(
            move |performed: &bool| {
                triggers.borrow_mut().initial_play_performed = *performed;
                rebuild(&builder, &triggers, &writer, "initial-play");
            },
            ListenOptions::new().clear_on(lifetime),
        );
    }
    output
}

/// Derive the core observer from `source`.
///
/// The returned observer is stopped when either `source` or `signal` is
/// cancelled.
pub fn create_core_playback_observer<O>(
    source: &O,
    inputs: CoreObservationInputs,
    signal: &CancellationSignal,
) -> DerivedObserver<CorePlaybackObservation>
where
    O: PlaybackObserver<BaseObservation>,
{
    let observer: DerivedObserver<CorePlaybackObservation> = source
        .derive_read_only_observer(move |base_ref, lifetime| {
            core_reference(base_ref, lifetime, inputs)
        });
    observer.stop_with(signal);
    observer
}

#[cfg(test)]
mod tests {
    use playsync_core::{Canceller, TimeRanges};

    use super::*;
    use crate::collaborators::{ManifestSnapshot, PeriodBounds};

    fn builder(manifest: ManifestSnapshot) -> CoreBuilder {
        CoreBuilder {
            auto_play: false,
            manifest: Rc::new(manifest),
            segment_sinks: None,
            text_displayer: None,
        }
    }

    fn base(wanted: f64, buffered: &[(f64, f64)]) -> BaseObservation {
        BaseObservation {
            position: ObservationPosition::new(wanted, None),
            duration: 100.0,
            buffered: buffered.iter().copied().collect::<TimeRanges>(),
            ..BaseObservation::initial()
        }
    }

    #[test]
    fn no_correction_mid_content() {
        let b = builder(ManifestSnapshot::static_content(vec![PeriodBounds::new(
            0.0,
            Some(100.0),
        )]));
        let pos = b.corrected_position(&base(50.0, &[(0.0, 60.0)]));
        assert_eq!(pos.wanted(), 50.0);
    }

    #[test]
    fn live_content_is_left_alone() {
        let b = builder(ManifestSnapshot::dynamic_content(
            vec![PeriodBounds::new(0.0, Some(100.0))],
            100.0,
        ));
        let pos = b.corrected_position(&base(99.5, &[(0.0, 90.0)]));
        assert_eq!(pos.wanted(), 99.5);
    }

    #[test]
    fn live_content_with_known_last_period_is_corrected() {
        let manifest =
            ManifestSnapshot::dynamic_content(vec![PeriodBounds::new(0.0, Some(100.0))], 100.0);
        manifest.set_last_period_known(true);
        let pos = builder(manifest).corrected_position(&base(99.5, &[(0.0, 90.0)]));
        assert_eq!(pos.wanted(), 99.0);
        assert_eq!(pos.polled(), 99.5);
    }

    #[test]
    fn unknown_period_end_is_left_alone() {
        let b = builder(ManifestSnapshot::static_content(vec![PeriodBounds::new(0.0, None)]));
        let pos = b.corrected_position(&base(99.5, &[(0.0, 90.0)]));
        assert_eq!(pos.wanted(), 99.5);
    }

    #[test]
    fn paused_pending_follows_auto_play() {
        let mut b = builder(ManifestSnapshot::static_content(vec![]));
        let mut triggers = Triggers {
            base: base(0.0, &[]),
            speed: 1.0,
            initial_play_performed: false,
        };
        assert_eq!(b.build(&triggers).paused.pending, Some(true));
        b.auto_play = true;
        assert_eq!(b.build(&triggers).paused.pending, Some(false));
        triggers.initial_play_performed = true;
        assert_eq!(b.build(&triggers).paused.pending, None);
    }

    #[test]
    fn external_signal_stops_core_observer() {
        struct Fixed {
            writer: SharedReference<BaseObservation>,
            canceller: Canceller,
        }
        impl PlaybackObserver<BaseObservation> for Fixed {
            fn reference(&self) -> ReadOnlyReference<BaseObservation> {
                self.writer.read_only()
            }
            fn signal(&self) -> &CancellationSignal {
                self.canceller.signal()
            }
            fn clock(&self) -> Rc<dyn crate::observer::ClockAccess> {
                Rc::new(crate::observer::NoClock)
            }
        }

        let canceller = Canceller::new();
        let source = Fixed {
            writer: SharedReference::new(BaseObservation::initial(), Some(canceller.signal())),
            canceller,
        };
        let scope = Canceller::new();
        let core = create_core_playback_observer(
            &source,
            CoreObservationInputs {
                auto_play: true,
                initial_play_performed: ReadOnlyReference::constant(false),
                speed: ReadOnlyReference::constant(1.0),
                manifest: Rc::new(ManifestSnapshot::static_content(vec![])),
                segment_sinks: None,
                text_displayer: None,
            },
            scope.signal(),
        );
        assert_eq!(source.writer.listener_count(), 1);
        scope.cancel();
        assert!(core.is_stopped());
        assert_eq!(source.writer.listener_count(), 0);
        assert!(!source.signal().is_cancelled());
    }
}
