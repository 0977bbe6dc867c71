//! Cooperative cancellation: [`Canceller`] and [`CancellationSignal`].
//!
//! A [`CancellationSignal`] transitions from active to cancelled exactly once.
//! Cleanup callbacks registered on it run synchronously, in registration
//! order, at the moment of cancellation. Registering on an already-cancelled
//! signal runs the cleanup immediately instead of storing it, so a cleanup
//! always runs exactly once no matter when it was registered.
//!
//! # Design
//!
//! The signal is cheaply cloneable (`Rc` inside) and read-only from the
//! outside. Cancelling requires the companion [`Canceller`], which owns the
//! signal's lifetime.
//!
//! Signals form a tree through [`Canceller::link_to_signal`]: cancelling a
//! parent cancels every linked child, while a child can be cancelled on its
//! own without touching the parent. The parent only keeps a weak handle to
//! the child, and the child removes its hook from the parent once it is
//! cancelled, so long-lived parents do not accumulate dead children.
//!
//! Everything here is single-threaded (`Rc`/`RefCell`). Callbacks may
//! register, deregister or cancel re-entrantly: the callback list is taken out
//! of the signal before any callback runs.
//!
//! # Example
//!
//! ```
//! use playsync_core::cancel::Canceller;
//! use std::cell::Cell;
//! use std::rc::Rc;
//!
//! let canceller = Canceller::new();
//! let ran = Rc::new(Cell::new(0));
//! let ran2 = Rc::clone(&ran);
//! canceller.signal().register(move |_| ran2.set(ran2.get() + 1));
//!
//! canceller.cancel();
//! canceller.cancel();
//! assert_eq!(ran.get(), 1);
//! ```

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use thiserror::Error;

#[cfg(feature = "tracing")]
use crate::logging::{debug, trace};
#[cfg(not(feature = "tracing"))]
use crate::{debug, trace};

// ─── Id generation ───────────────────────────────────────────────────────────

static NEXT_SIGNAL_ID: AtomicU64 = AtomicU64::new(1);

fn next_signal_id() -> u64 {
    NEXT_SIGNAL_ID.fetch_add(1, Ordering::Relaxed)
}

// ─── Metrics counters ────────────────────────────────────────────────────────

/// Total number of signal cancellations observed in this process.
static CANCELLATIONS_TOTAL: AtomicU64 = AtomicU64::new(0);

/// Read the total cancellation count (for diagnostics).
#[must_use]
pub fn cancellations_total() -> u64 {
    CANCELLATIONS_TOTAL.load(Ordering::Relaxed)
}

// ─── CancellationError ───────────────────────────────────────────────────────

/// Why a signal was cancelled. Handed to every cleanup callback.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CancellationError {
    /// Cancelled without a reason.
    #[error("operation cancelled")]
    Cancelled,
    /// Cancelled with an explicit reason.
    #[error("operation cancelled: {0}")]
    WithReason(String),
}

impl CancellationError {
    /// The reason given to [`Canceller::cancel_with_reason`], if any.
    #[must_use]
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Cancelled => None,
            Self::WithReason(reason) => Some(reason),
        }
    }
}

// ─── Inner shared state ──────────────────────────────────────────────────────

/// Handle returned by [`CancellationSignal::register`], used to remove a
/// cleanup that has not run yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegistrationId(u64);

type Cleanup = Box<dyn FnOnce(&CancellationError)>;

struct SignalInner {
    id: u64,
    /// `Some` once cancelled.
    error: Option<CancellationError>,
    next_registration: u64,
    cleanups: Vec<(RegistrationId, Cleanup)>,
    /// Hook this signal holds on its linked parents, removed on cancellation.
    parent_hooks: Vec<(CancellationSignal, RegistrationId)>,
}

impl SignalInner {
    fn new() -> Self {
        Self {
            id: next_signal_id(),
            error: None,
            next_registration: 0,
            cleanups: Vec::new(),
            parent_hooks: Vec::new(),
        }
    }
}

// ─── CancellationSignal ──────────────────────────────────────────────────────

/// Read side of a cancellation: query it, or register cleanups on it.
///
/// Cloning shares the same underlying state.
#[derive(Clone)]
pub struct CancellationSignal {
    inner: Rc<RefCell<SignalInner>>,
}

impl fmt::Debug for CancellationSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("CancellationSignal")
            .field("id", &inner.id)
            .field("cancelled", &inner.error.is_some())
            .field("pending_cleanups", &inner.cleanups.len())
            .finish()
    }
}

impl CancellationSignal {
    /// A signal that is never cancelled (its canceller is dropped on the spot).
    #[must_use]
    pub fn never() -> Self {
        Self {
            inner: Rc::new(RefCell::new(SignalInner::new())),
        }
    }

    /// Unique identifier for this signal (for logging).
    #[inline]
    #[must_use]
    pub fn id(&self) -> u64 {
        self.inner.borrow().id
    }

    /// Whether the signal has been cancelled.
    #[inline]
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.borrow().error.is_some()
    }

    /// The cancellation error, `None` while the signal is active.
    #[must_use]
    pub fn error(&self) -> Option<CancellationError> {
        self.inner.borrow().error.clone()
    }

    /// The reason passed to [`Canceller::cancel_with_reason`], if any.
    #[must_use]
    pub fn reason(&self) -> Option<String> {
        self.inner
            .borrow()
            .error
            .as_ref()
            .and_then(|e| e.reason().map(str::to_owned))
    }

    /// Return `Err` once the signal is cancelled.
    ///
    /// Intended for yield points:
    /// ```ignore
    /// signal.check()?;
    /// ```
    pub fn check(&self) -> Result<(), CancellationError> {
        match &self.inner.borrow().error {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    /// Register a cleanup to run when the signal is cancelled.
    ///
    /// If the signal is already cancelled, `cleanup` runs immediately and is
    /// not stored.
    pub fn register(&self, cleanup: impl FnOnce(&CancellationError) + 'static) -> RegistrationId {
        let mut inner = self.inner.borrow_mut();
        let id = RegistrationId(inner.next_registration);
        inner.next_registration += 1;
        if let Some(err) = inner.error.clone() {
            drop(inner);
            cleanup(&err);
            return id;
        }
        inner.cleanups.push((id, Box::new(cleanup)));
        id
    }

    /// Remove a cleanup that has not run yet. Returns `false` if it already
    /// ran or was never registered here.
    pub fn deregister(&self, id: RegistrationId) -> bool {
        let mut inner = self.inner.borrow_mut();
        let before = inner.cleanups.len();
        inner.cleanups.retain(|(rid, _)| *rid != id);
        inner.cleanups.len() != before
    }

    /// Number of cleanups waiting for cancellation.
    #[must_use]
    pub fn pending_cleanups(&self) -> usize {
        self.inner.borrow().cleanups.len()
    }

    fn downgrade(&self) -> Weak<RefCell<SignalInner>> {
        Rc::downgrade(&self.inner)
    }
}

// ─── Canceller ───────────────────────────────────────────────────────────────

/// Owner of a [`CancellationSignal`], able to cancel it.
///
/// Dropping the canceller does **not** cancel the signal: cancellation is
/// always explicit.
#[derive(Debug)]
pub struct Canceller {
    signal: CancellationSignal,
}

impl Default for Canceller {
    fn default() -> Self {
        Self::new()
    }
}

impl Canceller {
    /// Create a canceller with a fresh, active signal.
    #[must_use]
    pub fn new() -> Self {
        Self {
            signal: CancellationSignal::never(),
        }
    }

    /// Create a canceller already linked to `parent`.
    #[must_use]
    pub fn child_of(parent: &CancellationSignal) -> Self {
        let canceller = Self::new();
        canceller.link_to_signal(parent);
        canceller
    }

    /// The signal controlled by this canceller.
    #[must_use]
    pub fn signal(&self) -> &CancellationSignal {
        &self.signal
    }

    /// Whether the signal has been cancelled.
    #[inline]
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.signal.is_cancelled()
    }

    /// Cancel the signal. Calling it again is a no-op.
    pub fn cancel(&self) {
        cancel_inner(&self.signal.inner, CancellationError::Cancelled);
    }

    /// Cancel the signal with a reason visible to cleanups and queries.
    pub fn cancel_with_reason(&self, reason: impl Into<String>) {
        cancel_inner(
            &self.signal.inner,
            CancellationError::WithReason(reason.into()),
        );
    }

    /// Cancel this canceller's signal whenever `parent` is cancelled.
    ///
    /// If `parent` is already cancelled, this cancels immediately with the
    /// parent's error.
    pub fn link_to_signal(&self, parent: &CancellationSignal) {
        let weak = self.signal.downgrade();
        let hook = parent.register(move |err| {
            if let Some(child) = weak.upgrade() {
                cancel_inner(&child, err.clone());
            }
        });
        if !self.signal.is_cancelled() {
            self.signal
                .inner
                .borrow_mut()
                .parent_hooks
                .push((parent.clone(), hook));
        }
    }
}

fn cancel_inner(inner: &Rc<RefCell<SignalInner>>, error: CancellationError) {
    let (id, cleanups, parent_hooks) = {
        let mut guard = inner.borrow_mut();
        if guard.error.is_some() {
            return;
        }
        guard.error = Some(error.clone());
        (
            guard.id,
            std::mem::take(&mut guard.cleanups),
            std::mem::take(&mut guard.parent_hooks),
        )
    };
    CANCELLATIONS_TOTAL.fetch_add(1, Ordering::Relaxed);
    debug!(signal_id = id, cleanups = cleanups.len(), "signal cancelled");

    for (parent, hook) in parent_hooks {
        parent.deregister(hook);
    }
    for (_, cleanup) in cleanups {
        cleanup(&error);
    }
    trace!(signal_id = id, "signal cleanups done");
}

// ─── Tests ───────────────────────────────────────────────────────────────────
