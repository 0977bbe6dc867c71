use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use playsync_core::{CancellationSignal, Canceller, ReadOnlyReference, SharedReference};
use tracing::{debug, trace};
use web_time::{Duration, Instant};

use super::{ClockAccess, PlaybackObserver};
use crate::config::ObserverConfig;
use crate::media::{MediaElement, MediaEvent, ReadyState};
use crate::observation::{BaseObservation, ObservationEvent, ObservationPosition, SeekingState};
use crate::sampler::SamplingSchedule;
use crate::stall::{SampleFacts, freezing_status, rebuffering_status};

/// Clock backed by the media element itself.
struct MediaClock<M> {
    media: Rc<M>,
}

impl<M: MediaElement> ClockAccess for MediaClock<M> {
    fn current_time(&self) -> Option<f64> {
        Some(self.media.current_time())
    }
    fn ready_state(&self) -> Option<ReadyState> {
        Some(self.media.ready_state())
    }
    fn is_paused(&self) -> Option<bool> {
        Some(self.media.is_paused())
    }
    fn playback_rate(&self) -> Option<f64> {
        Some(self.media.playback_rate())
    }
    fn set_playback_rate(&self, rate: f64) {
        self.media.set_playback_rate(rate);
    }
}

/// Observer sampling a local [`MediaElement`].
///
/// The host forwards native events with [`handle_event`](Self::handle_event)
/// and calls [`tick`](Self::tick) once per scheduler turn; events received in
/// between collapse into one observation. When nothing fires for
/// [`ObserverConfig::sampling_interval`], `tick` samples anyway.
///
/// Cloning gives another handle on the same observer.
pub struct MediaElementPlaybackObserver<M> {
    inner: Rc<Inner<M>>,
}

struct Inner<M> {
    media: Rc<M>,
    clock: Rc<dyn ClockAccess>,
    config: ObserverConfig,
    canceller: Canceller,
    reference: SharedReference<BaseObservation>,
    schedule: RefCell<SamplingSchedule>,
    /// Target of the last seek requested through the observer.
    pending_seek: Cell<Option<f64>>,
    started: Cell<bool>,
    origin: Instant,
}

impl<M> Clone for MediaElementPlaybackObserver<M> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<M> fmt::Debug for MediaElementPlaybackObserver<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaElementPlaybackObserver")
            .field("signal", self.inner.canceller.signal())
            .field("started", &self.inner.started.get())
            .field("pending_seek", &self.inner.pending_seek.get())
            .finish_non_exhaustive()
    }
}

impl<M: MediaElement + 'static> MediaElementPlaybackObserver<M> {
    /// Create an observer with its own root lifetime.
    #[must_use]
    pub fn new(media: Rc<M>, config: ObserverConfig) -> Self {
        Self::with_canceller(media, config, Canceller::new())
    }

    /// Create an observer stopped whenever `parent` is cancelled.
    #[must_use]
    pub fn with_parent(media: Rc<M>, config: ObserverConfig, parent: &CancellationSignal) -> Self {
        Self::with_canceller(media, config, Canceller::child_of(parent))
    }

    fn with_canceller(media: Rc<M>, config: ObserverConfig, canceller: Canceller) -> Self {
        let reference = SharedReference::new(BaseObservation::initial(), Some(canceller.signal()));
        let clock: Rc<dyn ClockAccess> = Rc::new(MediaClock {
            media: Rc::clone(&media),
        });
        let schedule = RefCell::new(SamplingSchedule::new(config.sampling_interval));
        Self {
            inner: Rc::new(Inner {
                media,
                clock,
                config,
                canceller,
                reference,
                schedule,
                pending_seek: Cell::new(None),
                started: Cell::new(false),
                origin: Instant::now(),
            }),
        }
    }

    /// Emit the initial observation and begin accepting ticks. Idempotent.
    pub fn start(&self) {
        self.start_at(Instant::now());
    }

    /// [`start`](Self::start) with an explicit clock reading.
    pub fn start_at(&self, now: Instant) {
        if self.inner.started.get() || self.inner.canceller.is_cancelled() {
            return;
        }
        self.inner.started.set(true);
        self.inner.schedule.borrow_mut().clear();
        debug!(
            signal_id = self.inner.canceller.signal().id(),
            interval_ms = self.inner.config.sampling_interval.as_millis() as u64,
            "playback observer started"
        );
        self.sample(ObservationEvent::Init, now);
    }

    /// Stop sampling and dispose the reference and every derived branch.
    pub fn stop(&self) {
        if self.inner.canceller.is_cancelled() {
            return;
        }
        debug!(
            signal_id = self.inner.canceller.signal().id(),
            coalesced = self.inner.schedule.borrow().coalesced_count(),
            "playback observer stopped"
        );
        self.inner.canceller.cancel();
    }

    #[must_use]
    pub fn is_started(&self) -> bool {
        self.inner.started.get() && !self.inner.canceller.is_cancelled()
    }

    /// Record a native event; it is sampled on the next tick.
    pub fn handle_event(&self, event: MediaEvent) {
        if self.inner.canceller.is_cancelled() {
            return;
        }
        let merged = self.inner.schedule.borrow_mut().push(event.into());
        trace!(?event, merged, "media event queued");
    }

    /// Sample if an event is pending or the fallback period elapsed.
    /// Returns whether an observation was emitted.
    pub fn tick(&self) -> bool {
        self.tick_at(Instant::now())
    }

    /// [`tick`](Self::tick) with an explicit clock reading.
    pub fn tick_at(&self, now: Instant) -> bool {
        if !self.is_started() {
            return false;
        }
        let due = self.inner.schedule.borrow_mut().take_due(now);
        match due {
            Some(event) => {
                self.sample(event, now);
                true
            }
            None => false,
        }
    }

    /// Time left before the next tick would sample without any event.
    #[must_use]
    pub fn time_until_next_sample(&self, now: Instant) -> Duration {
        self.inner.schedule.borrow().time_until_due(now)
    }

    /// Seek the media element and emit an
    /// [`ObservationEvent::InternalSeeking`] observation right away.
    pub fn set_current_time(&self, position: f64) {
        self.set_current_time_at(position, Instant::now());
    }

    /// [`set_current_time`](Self::set_current_time) with an explicit clock
    /// reading.
    pub fn set_current_time_at(&self, position: f64, now: Instant) {
        if self.inner.canceller.is_cancelled() {
            return;
        }
        self.inner.pending_seek.set(Some(position));
        self.inner.media.set_current_time(position);
        if self.inner.started.get() {
            self.sample(ObservationEvent::InternalSeeking, now);
        }
    }

    /// Thresholds in use.
    #[must_use]
    pub fn config(&self) -> &ObserverConfig {
        &self.inner.config
    }

    /// Single entry point performing the `set` on the reference.
    fn sample(&self, event: ObservationEvent, now: Instant) {
        let inner = &*self.inner;
        if inner.canceller.is_cancelled() {
            return;
        }
        let media = &*inner.media;
        let prev = inner.reference.get();

        let seeking = next_seeking_state(event, prev.seeking, inner.pending_seek.get(), media);
        if seeking == SeekingState::None {
            inner.pending_seek.set(None);
        }

        let polled = media.current_time();
        let buffered = media.buffered();
        let current_range = buffered.range_containing(polled);
        let facts = SampleFacts {
            event,
            position: polled,
            buffer_gap: buffered.buffer_gap_at(polled),
            current_range_end: current_range.map(|r| r.end),
            duration: media.duration(),
            paused: media.is_paused(),
            ready_state: media.ready_state(),
            ended: media.is_ended(),
            seeking,
            playback_rate: media.playback_rate(),
        };
        let now_ms = now.saturating_duration_since(inner.origin).as_secs_f64() * 1000.0;
        let rebuffering = rebuffering_status(&prev, &facts, &inner.config, now_ms);
        let freezing = freezing_status(&prev, &facts, &inner.config, now_ms);

        let observation = BaseObservation {
            event,
            position: ObservationPosition::new(polled, inner.pending_seek.get()),
            duration: facts.duration,
            paused: facts.paused,
            ready_state: facts.ready_state,
            buffered,
            buffer_gap: facts.buffer_gap,
            current_range,
            seeking,
            ended: facts.ended,
            playback_rate: facts.playback_rate,
            rebuffering,
            freezing,
        };
        trace!(
            ?event,
            position = polled,
            wanted = observation.position.wanted(),
            rebuffering = observation.rebuffering.is_some(),
            freezing = observation.freezing.is_some(),
            "playback observation"
        );
        inner.schedule.borrow_mut().mark_sampled(now);
        inner.reference.set(observation);
    }
}

fn next_seeking_state<M: MediaElement>(
    event: ObservationEvent,
    prev: SeekingState,
    pending_seek: Option<f64>,
    media: &M,
) -> SeekingState {
    match event {
        ObservationEvent::InternalSeeking => SeekingState::Internal,
        // A Seeked coalesced into the same tick already ended this seek.
        ObservationEvent::Seeking if !media.is_seeking() => SeekingState::None,
        ObservationEvent::Seeking | ObservationEvent::Init if pending_seek.is_some() => {
            SeekingState::Internal
        }
        ObservationEvent::Seeking => SeekingState::External,
        ObservationEvent::Seeked => SeekingState::None,
        _ if prev != SeekingState::None && !media.is_seeking() => SeekingState::None,
        _ => prev,
    }
}

impl<M: MediaElement + 'static> PlaybackObserver<BaseObservation>
    for MediaElementPlaybackObserver<M>
{
    fn reference(&self) -> ReadOnlyReference<BaseObservation> {
        self.inner.reference.read_only()
    }

    fn signal(&self) -> &CancellationSignal {
        self.inner.canceller.signal()
    }

    fn clock(&self) -> Rc<dyn ClockAccess> {
        Rc::clone(&self.inner.clock)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use playsync_core::{ListenOptions, TimeRanges};

    use super::*;
    use crate::observation::RebufferingReason;

    #[derive(Default)]
    struct FakeMedia {
        time: Cell<f64>,
        paused: Cell<bool>,
        seeking: Cell<bool>,
        rate: Cell<f64>,
        ready: Cell<u8>,
        buffered_end: Cell<f64>,
    }

    impl FakeMedia {
        fn playing(time: f64, buffered_end: f64) -> Rc<Self> {
            let media = Self::default();
            media.time.set(time);
            media.rate.set(1.0);
            media.ready.set(4);
            media.buffered_end.set(buffered_end);
            Rc::new(media)
        }
    }

    impl MediaElement for FakeMedia {
        fn current_time(&self) -> f64 {
            self.time.get()
        }
        fn duration(&self) -> f64 {
            100.0
        }
        fn is_paused(&self) -> bool {
            self.paused.get()
        }
        fn is_seeking(&self) -> bool {
            self.seeking.get()
        }
        fn is_ended(&self) -> bool {
            false
        }
        fn ready_state(&self) -> ReadyState {
            ReadyState::from_code(self.ready.get())
        }
        fn buffered(&self) -> TimeRanges {
            [(0.0, self.buffered_end.get())].into_iter().collect()
        }
        fn playback_rate(&self) -> f64 {
            self.rate.get()
        }
        fn set_playback_rate(&self, rate: f64) {
            self.rate.set(rate);
        }
        fn set_current_time(&self, position: f64) {
            self.seeking.set(true);
            self.time.set(position);
        }
    }

    fn events_of(
        observer: &MediaElementPlaybackObserver<FakeMedia>,
    ) -> Rc<RefCell<Vec<ObservationEvent>>> {
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&log);
        observer.listen(
            move |obs: &BaseObservation| sink.borrow_mut().push(obs.event),
            ListenOptions::new(),
        );
        log
    }

    #[test]
    fn start_emits_init_once() {
        let media = FakeMedia::playing(3.0, 30.0);
        let observer = MediaElementPlaybackObserver::new(media, ObserverConfig::default());
        let log = events_of(&observer);
        observer.start();
        observer.start();
        assert_eq!(*log.borrow(), vec![ObservationEvent::Init]);
        let obs = observer.reference().get();
        assert_eq!(obs.position.polled(), 3.0);
        assert_eq!(obs.buffer_gap, Some(27.0));
    }

    #[test]
    fn ticks_before_start_do_nothing() {
        let media = FakeMedia::playing(3.0, 30.0);
        let observer = MediaElementPlaybackObserver::new(media, ObserverConfig::default());
        observer.handle_event(MediaEvent::Play);
        assert!(!observer.tick());
        assert_eq!(observer.reference().get().event, ObservationEvent::Init);
    }

    #[test]
    fn burst_collapses_into_one_observation() {
        let media = FakeMedia::playing(3.0, 30.0);
        let observer = MediaElementPlaybackObserver::new(Rc::clone(&media), ObserverConfig::default());
        let t0 = Instant::now();
        observer.start_at(t0);
        let log = events_of(&observer);

        observer.handle_event(MediaEvent::TimeUpdate);
        observer.handle_event(MediaEvent::Pause);
        observer.handle_event(MediaEvent::TimeUpdate);
        assert!(observer.tick_at(t0 + Duration::from_millis(5)));
        assert!(!observer.tick_at(t0 + Duration::from_millis(10)));
        assert_eq!(*log.borrow(), vec![ObservationEvent::Pause]);
    }

    #[test]
    fn interval_sampling_without_events() {
        let media = FakeMedia::playing(3.0, 30.0);
        let observer = MediaElementPlaybackObserver::new(
            Rc::clone(&media),
            ObserverConfig::default().with_sampling_interval(Duration::from_millis(200)),
        );
        let t0 = Instant::now();
        observer.start_at(t0);
        let log = events_of(&observer);

        assert!(!observer.tick_at(t0 + Duration::from_millis(100)));
        media.time.set(3.2);
        assert!(observer.tick_at(t0 + Duration::from_millis(200)));
        assert_eq!(*log.borrow(), vec![ObservationEvent::Interval]);
        assert_eq!(observer.reference().get().position.polled(), 3.2);
    }

    #[test]
    fn internal_seek_lifecycle() {
        let media = FakeMedia::playing(3.0, 30.0);
        let observer = MediaElementPlaybackObserver::new(Rc::clone(&media), ObserverConfig::default());
        let t0 = Instant::now();
        observer.start_at(t0);

        observer.set_current_time_at(20.0, t0);
        let obs = observer.reference().get();
        assert_eq!(obs.event, ObservationEvent::InternalSeeking);
        assert_eq!(obs.seeking, SeekingState::Internal);
        assert_eq!(obs.position.wanted(), 20.0);

        observer.handle_event(MediaEvent::Seeking);
        observer.tick_at(t0);
        assert_eq!(observer.reference().get().seeking, SeekingState::Internal);

        media.seeking.set(false);
        observer.handle_event(MediaEvent::Seeked);
        observer.tick_at(t0);
        let obs = observer.reference().get();
        assert_eq!(obs.seeking, SeekingState::None);
        assert!(!obs.position.is_awaiting_seek());
    }

    #[test]
    fn seek_finished_within_one_tick_is_not_reported() {
        let media = FakeMedia::playing(3.0, 30.0);
        let observer = MediaElementPlaybackObserver::new(Rc::clone(&media), ObserverConfig::default());
        let t0 = Instant::now();
        observer.start_at(t0);

        observer.set_current_time_at(20.0, t0);
        media.seeking.set(false);
        observer.handle_event(MediaEvent::Seeking);
        observer.handle_event(MediaEvent::Seeked);
        assert!(observer.tick_at(t0 + Duration::from_millis(5)));

        let obs = observer.reference().get();
        assert_eq!(obs.event, ObservationEvent::Seeking);
        assert_eq!(obs.seeking, SeekingState::None);
        assert!(!obs.position.is_awaiting_seek());
        assert!(
            obs.rebuffering
                .is_none_or(|stall| stall.reason != RebufferingReason::Seeking)
        );
    }

    #[test]
    fn seek_before_start_survives_init() {
        let media = FakeMedia::playing(3.0, 30.0);
        let observer = MediaElementPlaybackObserver::new(Rc::clone(&media), ObserverConfig::default());
        observer.set_current_time(20.0);
        let t0 = Instant::now();
        observer.start_at(t0);

        let obs = observer.reference().get();
        assert_eq!(obs.event, ObservationEvent::Init);
        assert_eq!(obs.seeking, SeekingState::Internal);
        assert_eq!(obs.position.wanted(), 20.0);

        observer.handle_event(MediaEvent::Seeking);
        observer.tick_at(t0 + Duration::from_millis(5));
        assert_eq!(observer.reference().get().seeking, SeekingState::Internal);

        media.seeking.set(false);
        observer.handle_event(MediaEvent::Seeked);
        observer.tick_at(t0 + Duration::from_millis(10));
        let obs = observer.reference().get();
        assert_eq!(obs.seeking, SeekingState::None);
        assert!(!obs.position.is_awaiting_seek());
    }

    #[test]
    fn external_seek_is_flagged() {
        let media = FakeMedia::playing(3.0, 30.0);
        let observer = MediaElementPlaybackObserver::new(Rc::clone(&media), ObserverConfig::default());
        let t0 = Instant::now();
        observer.start_at(t0);

        media.seeking.set(true);
        media.time.set(50.0);
        media.ready.set(1);
        observer.handle_event(MediaEvent::Seeking);
        observer.tick_at(t0 + Duration::from_millis(20));
        let obs = observer.reference().get();
        assert_eq!(obs.seeking, SeekingState::External);
        let stall = obs.rebuffering.expect("stalled after seek");
        assert_eq!(stall.reason, RebufferingReason::Seeking);
    }

    #[test]
    fn clock_passthrough_and_rate() {
        let media = FakeMedia::playing(7.0, 30.0);
        let observer = MediaElementPlaybackObserver::new(Rc::clone(&media), ObserverConfig::default());
        assert_eq!(observer.current_time(), Some(7.0));
        assert_eq!(observer.is_paused(), Some(false));
        assert_eq!(observer.ready_state(), Some(ReadyState::HaveEnoughData));
        observer.set_playback_rate(1.5);
        assert_eq!(media.rate.get(), 1.5);
        assert_eq!(observer.playback_rate(), Some(1.5));
    }

    #[test]
    fn stop_disposes_reference() {
        let media = FakeMedia::playing(3.0, 30.0);
        let observer = MediaElementPlaybackObserver::new(media, ObserverConfig::default());
        observer.start();
        let log = events_of(&observer);
        observer.stop();
        observer.handle_event(MediaEvent::Play);
        assert!(!observer.tick());
        assert!(observer.reference().is_disposed());
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn parent_signal_stops_observer() {
        let parent = Canceller::new();
        let media = FakeMedia::playing(3.0, 30.0);
        let observer =
            MediaElementPlaybackObserver::with_parent(media, ObserverConfig::default(), parent.signal());
        observer.start();
        parent.cancel();
        assert!(!observer.is_started());
        assert!(observer.reference().is_disposed());
    }
}
