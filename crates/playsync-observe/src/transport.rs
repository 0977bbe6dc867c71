//! Observation transport between the media-owning context and a worker.
//!
//! Each side owns its own state and exchanges JSON messages through a
//! [`MessagePort`]:
//!
//! ```text
//!  main context                               worker context
//!  MediaElementPlaybackObserver               WorkerObservationReceiver
//!        │ ObservationForwarder ── PlaybackObservation ──▶ │ set()
//!        │                                                 ▼
//!        │                                   WorkerPlaybackObserver
//!  PlaybackRateApplier ◀── UpdatePlaybackRate ── set_playback_rate()
//! ```
//!
//! Every message carries the [`ContentId`] it was produced for. Messages for
//! any other content are dropped: they are leftovers from a content that was
//! unloaded while they were in flight.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};

use playsync_core::{Canceller, ListenOptions, SharedReference};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::error::TransportError;
use crate::media::ReadyState;
use crate::observation::BaseObservation;
use crate::observer::{ClockAccess, PlaybackObserver, WorkerPlaybackObserver};

static NEXT_CONTENT_ID: AtomicU64 = AtomicU64::new(1);

/// Identifier of one loaded content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentId(String);

impl ContentId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// A new identifier, unique within this process.
    #[must_use]
    pub fn generate() -> Self {
        Self(format!(
            "content-{}",
            NEXT_CONTENT_ID.fetch_add(1, Ordering::Relaxed)
        ))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ContentId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Messages sent by the context owning the media element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum MainThreadMessage {
    PlaybackObservation {
        content_id: ContentId,
        value: BaseObservation,
    },
}

impl MainThreadMessage {
    #[must_use]
    pub fn content_id(&self) -> &ContentId {
        match self {
            Self::PlaybackObservation { content_id, .. } => content_id,
        }
    }
}

/// Messages sent by the worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum WorkerMessage {
    UpdatePlaybackRate { content_id: ContentId, value: f64 },
}

impl WorkerMessage {
    #[must_use]
    pub fn content_id(&self) -> &ContentId {
        match self {
            Self::UpdatePlaybackRate { content_id, .. } => content_id,
        }
    }
}

/// Encode a message as JSON text.
pub fn encode<M: Serialize>(message: &M) -> Result<String, TransportError> {
    serde_json::to_string(message).map_err(TransportError::Serialize)
}

/// Decode a message from JSON text.
pub fn decode<M: DeserializeOwned>(payload: &str) -> Result<M, TransportError> {
    serde_json::from_str(payload).map_err(TransportError::Deserialize)
}

/// One end of an ordered, bidirectional message channel.
pub trait MessagePort<Out, In> {
    /// Send without waiting for the other side.
    fn post(&self, message: &Out) -> Result<(), TransportError>;

    /// Next inbound message, `None` when nothing is waiting.
    fn try_recv(&self) -> Option<Result<In, TransportError>>;

    /// Every message currently waiting, stopping after a disconnection.
    fn drain(&self) -> Vec<Result<In, TransportError>> {
        let mut out = Vec::new();
        while let Some(next) = self.try_recv() {
            let disconnected = matches!(next, Err(TransportError::Disconnected));
            out.push(next);
            if disconnected {
                break;
            }
        }
        out
    }
}

/// [`MessagePort`] over `std::sync::mpsc`, carrying JSON text.
///
/// The two ends may live on different threads: only encoded strings cross.
pub struct ChannelPort<Out, In> {
    tx: Sender<String>,
    rx: Receiver<String>,
    _messages: PhantomData<fn(&Out) -> In>,
}

impl<Out, In> fmt::Debug for ChannelPort<Out, In> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelPort").finish_non_exhaustive()
    }
}

impl<A, B> ChannelPort<A, B> {
    /// Two connected ends.
    #[must_use]
    pub fn pair() -> (ChannelPort<A, B>, ChannelPort<B, A>) {
        let (a_tx, b_rx) = mpsc::channel();
        let (b_tx, a_rx) = mpsc::channel();
        (
            ChannelPort {
                tx: a_tx,
                rx: a_rx,
                _messages: PhantomData,
            },
            ChannelPort {
                tx: b_tx,
                rx: b_rx,
                _messages: PhantomData,
            },
        )
    }
}

impl<Out: Serialize, In: DeserializeOwned> MessagePort<Out, In> for ChannelPort<Out, In> {
    fn post(&self, message: &Out) -> Result<(), TransportError> {
        let payload = encode(message)?;
        self.tx
            .send(payload)
            .map_err(|_| TransportError::Disconnected)
    }

    fn try_recv(&self) -> Option<Result<In, TransportError>> {
        match self.rx.try_recv() {
            Ok(payload) => Some(decode(&payload)),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(TransportError::Disconnected)),
        }
    }
}

/// Port of the media-owning context.
pub type MainThreadPort = ChannelPort<MainThreadMessage, WorkerMessage>;
/// Port of the worker context.
pub type WorkerPort = ChannelPort<WorkerMessage, MainThreadMessage>;

// ─── Main side ───────────────────────────────────────────────────────────────

/// Posts every observation of a local observer to the worker.
#[derive(Debug)]
pub struct ObservationForwarder {
    canceller: Canceller,
    content_id: Rc<RefCell<ContentId>>,
}

impl ObservationForwarder {
    /// Start forwarding, beginning with the current observation.
    ///
    /// Forwarding ends when the forwarder or `observer` is stopped.
    pub fn start<O, P>(observer: &O, port: Rc<P>, content_id: ContentId) -> Self
    where
        O: PlaybackObserver<BaseObservation>,
        P: MessagePort<MainThreadMessage, WorkerMessage> + 'static,
    {
        let canceller = Canceller::new();
        let content_id = Rc::new(RefCell::new(content_id));
        let live = Rc::clone(&content_id);
        observer.listen(
            move |observation: &BaseObservation| {
                let message = MainThreadMessage::PlaybackObservation {
                    content_id: live.borrow().clone(),
                    value: observation.clone(),
                };
                if let Err(err) = port.post(&message) {
                    warn!(error = %err, "failed to forward playback observation");
                }
            },
            ListenOptions::new()
                .emit_current()
                .clear_on(canceller.signal()),
        );
        debug!(content_id = %content_id.borrow(), "observation forwarding started");
        Self {
            canceller,
            content_id,
        }
    }

    /// Tag later observations with `content_id`.
    pub fn set_content(&self, content_id: ContentId) {
        *self.content_id.borrow_mut() = content_id;
    }

    pub fn stop(&self) {
        self.canceller.cancel();
    }
}

/// Applies rate changes requested by the worker to the local clock.
pub struct PlaybackRateApplier {
    clock: Rc<dyn ClockAccess>,
    content_id: RefCell<ContentId>,
    disconnected: Cell<bool>,
}

impl fmt::Debug for PlaybackRateApplier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlaybackRateApplier")
            .field("content_id", &self.content_id.borrow())
            .field("disconnected", &self.disconnected.get())
            .finish_non_exhaustive()
    }
}

impl PlaybackRateApplier {
    pub fn new<O>(observer: &O, content_id: ContentId) -> Self
    where
        O: PlaybackObserver<BaseObservation>,
    {
        Self {
            clock: observer.clock(),
            content_id: RefCell::new(content_id),
            disconnected: Cell::new(false),
        }
    }

    pub fn set_content(&self, content_id: ContentId) {
        *self.content_id.borrow_mut() = content_id;
    }

    /// Apply `message` if it targets the live content. Returns whether it
    /// was applied.
    pub fn on_message(&self, message: &WorkerMessage) -> bool {
        if message.content_id() != &*self.content_id.borrow() {
            trace!(content_id = %message.content_id(), "stale worker message dropped");
            return false;
        }
        match *message {
            WorkerMessage::UpdatePlaybackRate { value, .. } => {
                trace!(rate = value, "applying playback rate from worker");
                self.clock.set_playback_rate(value);
            }
        }
        true
    }

    /// Handle everything waiting on `port`. Returns how many messages were
    /// applied; always 0 once the worker side is gone.
    pub fn pump<P>(&self, port: &P) -> usize
    where
        P: MessagePort<MainThreadMessage, WorkerMessage>,
    {
        if self.disconnected.get() {
            return 0;
        }
        handle_all(port.drain(), &self.disconnected, |message| {
            self.on_message(&message)
        })
    }

    /// Whether a pump saw the worker side disconnect.
    #[must_use]
    pub fn is_disconnected(&self) -> bool {
        self.disconnected.get()
    }
}

// ─── Worker side ─────────────────────────────────────────────────────────────

/// Clock of the worker side: nothing is known locally and rate changes are
/// posted back.
struct RemoteClock<P> {
    port: Rc<P>,
    content_id: Rc<RefCell<ContentId>>,
}

impl<P: MessagePort<WorkerMessage, MainThreadMessage>> ClockAccess for RemoteClock<P> {
    fn current_time(&self) -> Option<f64> {
        None
    }
    fn ready_state(&self) -> Option<ReadyState> {
        None
    }
    fn is_paused(&self) -> Option<bool> {
        None
    }
    fn playback_rate(&self) -> Option<f64> {
        None
    }
    fn set_playback_rate(&self, rate: f64) {
        let message = WorkerMessage::UpdatePlaybackRate {
            content_id: self.content_id.borrow().clone(),
            value: rate,
        };
        if let Err(err) = self.port.post(&message) {
            warn!(error = %err, rate, "failed to post playback rate update");
        }
    }
}

/// Sole writer of the worker-side observation reference.
pub struct WorkerObservationReceiver<P> {
    port: Rc<P>,
    canceller: Canceller,
    reference: SharedReference<BaseObservation>,
    content_id: Rc<RefCell<ContentId>>,
    observer: WorkerPlaybackObserver,
    disconnected: Cell<bool>,
}

impl<P> fmt::Debug for WorkerObservationReceiver<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerObservationReceiver")
            .field("content_id", &self.content_id.borrow())
            .field("signal", self.canceller.signal())
            .finish_non_exhaustive()
    }
}

impl<P> WorkerObservationReceiver<P>
where
    P: MessagePort<WorkerMessage, MainThreadMessage> + 'static,
{
    /// Receiver for `content_id`, exposing `initial` until the first
    /// matching message arrives.
    pub fn new(port: Rc<P>, content_id: ContentId, initial: BaseObservation) -> Self {
        let canceller = Canceller::new();
        let reference = SharedReference::new(initial, Some(canceller.signal()));
        let content_id = Rc::new(RefCell::new(content_id));
        let clock: Rc<dyn ClockAccess> = Rc::new(RemoteClock {
            port: Rc::clone(&port),
            content_id: Rc::clone(&content_id),
        });
        let observer =
            WorkerPlaybackObserver::new(reference.read_only(), canceller.signal().clone(), clock);
        debug!(content_id = %content_id.borrow(), "worker observation receiver created");
        Self {
            port,
            canceller,
            reference,
            content_id,
            observer,
            disconnected: Cell::new(false),
        }
    }

    /// The observer fed by this receiver.
    #[must_use]
    pub fn observer(&self) -> WorkerPlaybackObserver {
        self.observer.clone()
    }

    #[must_use]
    pub fn content_id(&self) -> ContentId {
        self.content_id.borrow().clone()
    }

    /// Switch to a newly loaded content. Messages for the previous one are
    /// dropped from now on.
    pub fn set_content(&self, content_id: ContentId) {
        debug!(from = %self.content_id.borrow(), to = %content_id, "worker content switched");
        *self.content_id.borrow_mut() = content_id;
    }

    /// Publish the observation carried by `message` if it targets the live
    /// content. Returns whether the reference was updated.
    pub fn on_message(&self, message: MainThreadMessage) -> bool {
        if self.canceller.is_cancelled() {
            return false;
        }
        if message.content_id() != &*self.content_id.borrow() {
            trace!(content_id = %message.content_id(), "stale observation dropped");
            return false;
        }
        match message {
            MainThreadMessage::PlaybackObservation { value, .. } => {
                trace!(event = ?value.event, "observation received");
                self.reference.set(value);
            }
        }
        true
    }

    /// Handle everything waiting on the port. Returns how many observations
    /// were published; always 0 once the main side is gone.
    pub fn pump(&self) -> usize {
        if self.disconnected.get() {
            return 0;
        }
        handle_all(self.port.drain(), &self.disconnected, |message| {
            self.on_message(message)
        })
    }

    /// Whether a pump saw the main side disconnect.
    #[must_use]
    pub fn is_disconnected(&self) -> bool {
        self.disconnected.get()
    }

    /// Dispose the reference and everything derived from the observer.
    pub fn stop(&self) {
        self.canceller.cancel();
    }
}

/// Dispatch a drained batch. A disconnection is reported once and latched
/// in `disconnected`.
fn handle_all<M>(
    batch: Vec<Result<M, TransportError>>,
    disconnected: &Cell<bool>,
    mut handle: impl FnMut(M) -> bool,
) -> usize {
    let mut handled = 0;
    for next in batch {
        match next {
            Ok(message) => {
                if handle(message) {
                    handled += 1;
                }
            }
            Err(TransportError::Disconnected) => {
                if !disconnected.replace(true) {
                    warn!("message port disconnected");
                }
            }
            Err(err) => warn!(error = %err, "invalid inbound message"),
        }
    }
    handled
}
