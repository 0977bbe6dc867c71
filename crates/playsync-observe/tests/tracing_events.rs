#![forbid(unsafe_code)]

//! Log events emitted at the transport boundary.
//!
//! Stale messages are expected during content switches and must only show up
//! at trace level; failed fire-and-forget sends surface as warnings.

use std::rc::Rc;
use std::sync::{Arc, Mutex};

use playsync_core::TimeRanges;
use playsync_observe::{
    BaseObservation, ChannelPort, ContentId, MainThreadMessage, MainThreadPort, MediaElement,
    MediaElementPlaybackObserver, MediaEvent, ObservationForwarder, ObserverConfig,
    PlaybackObserver, ReadyState, WorkerObservationReceiver, WorkerPort,
};
use tracing::{Level, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::{Context, SubscriberExt};

#[derive(Default)]
struct Captured {
    events: Vec<(Level, String)>,
}

impl Captured {
    fn find(&self, message: &str) -> Option<Level> {
        self.events
            .iter()
            .find(|(_, m)| m == message)
            .map(|(level, _)| *level)
    }
}

struct Capture {
    state: Arc<Mutex<Captured>>,
}

impl<S> Layer<S> for Capture
where
    S: Subscriber + for<'lookup> tracing_subscriber::registry::LookupSpan<'lookup>,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        struct Msg {
            message: Option<String>,
        }
        impl tracing::field::Visit for Msg {
            fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
                if field.name() == "message" {
                    self.message = Some(value.to_string());
                }
            }

            fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
                if field.name() == "message" {
                    self.message = Some(format!("{value:?}").trim_matches('"').to_string());
                }
            }
        }
        let mut msg = Msg { message: None };
        event.record(&mut msg);
        if let Some(message) = msg.message {
            self.state
                .lock()
                .expect("capture lock")
                .events
                .push((*event.metadata().level(), message));
        }
    }
}

fn capture() -> (Arc<Mutex<Captured>>, tracing::subscriber::DefaultGuard) {
    let state = Arc::new(Mutex::new(Captured::default()));
    let subscriber = tracing_subscriber::registry().with(Capture {
        state: Arc::clone(&state),
    });
    (state, tracing::subscriber::set_default(subscriber))
}

struct StillMedia;

impl MediaElement for StillMedia {
    fn current_time(&self) -> f64 {
        1.0
    }
    fn duration(&self) -> f64 {
        10.0
    }
    fn is_paused(&self) -> bool {
        true
    }
    fn is_seeking(&self) -> bool {
        false
    }
    fn is_ended(&self) -> bool {
        false
    }
    fn ready_state(&self) -> ReadyState {
        ReadyState::HaveEnoughData
    }
    fn buffered(&self) -> TimeRanges {
        TimeRanges::new()
    }
    fn playback_rate(&self) -> f64 {
        1.0
    }
    fn set_playback_rate(&self, _rate: f64) {}
    fn set_current_time(&self, _position: f64) {}
}

#[test]
fn stale_observation_is_trace_only() {
    let (state, _guard) = capture();
    let (main_port, worker_port): (MainThreadPort, WorkerPort) = ChannelPort::pair();
    let receiver = WorkerObservationReceiver::new(
        Rc::new(worker_port),
        ContentId::new("live"),
        BaseObservation::initial(),
    );
    let _keep = main_port;

    assert!(!receiver.on_message(MainThreadMessage::PlaybackObservation {
        content_id: ContentId::new("gone"),
        value: BaseObservation::initial(),
    }));

    let captured = state.lock().expect("capture lock");
    assert_eq!(captured.find("stale observation dropped"), Some(Level::TRACE));
    assert!(
        captured
            .events
            .iter()
            .all(|(level, _)| *level != Level::WARN && *level != Level::ERROR)
    );
}

#[test]
fn forwarding_to_closed_worker_warns() {
    let (state, _guard) = capture();
    let observer =
        MediaElementPlaybackObserver::new(Rc::new(StillMedia), ObserverConfig::default());
    observer.start();

    let (main_port, worker_port): (MainThreadPort, WorkerPort) = ChannelPort::pair();
    drop(worker_port);
    let _forwarder =
        ObservationForwarder::start(&observer, Rc::new(main_port), ContentId::new("live"));

    observer.handle_event(MediaEvent::Pause);
    observer.tick();
    assert!(observer.reference().get().paused);

    let captured = state.lock().expect("capture lock");
    assert_eq!(
        captured.find("failed to forward playback observation"),
        Some(Level::WARN)
    );
    assert_eq!(captured.find("playback observer started"), Some(Level::DEBUG));
}

#[test]
fn disconnection_is_reported_once() {
    let (state, _guard) = capture();
    let (main_port, worker_port): (MainThreadPort, WorkerPort) = ChannelPort::pair();
    let receiver = WorkerObservationReceiver::new(
        Rc::new(worker_port),
        ContentId::new("live"),
        BaseObservation::initial(),
    );
    drop(main_port);

    for _ in 0..3 {
        assert_eq!(receiver.pump(), 0);
    }

    let captured = state.lock().expect("capture lock");
    let reports: Vec<_> = captured
        .events
        .iter()
        .filter(|(_, m)| m == "message port disconnected")
        .collect();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].0, Level::WARN);
    assert_eq!(captured.find("invalid inbound message"), None);
}
