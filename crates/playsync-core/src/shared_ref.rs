#![forbid(unsafe_code)]

//! Observable value cell with synchronous change notification.
//!
//! # Design
//!
//! [`SharedReference<T>`] wraps a value of type `T` in shared,
//! reference-counted storage (`Rc<RefCell<..>>`). Every accepted
//! [`set`](SharedReference::set) replaces the value and then notifies the
//! listeners registered at that moment, in registration order.
//!
//! Listeners are scoped by a [`CancellationSignal`] instead of an RAII guard:
//! cancelling the `clear_signal` given to
//! [`on_update`](SharedReference::on_update) unregisters the callback.
//! A reference created with an owning signal is disposed when that signal is
//! cancelled: the listener list is cleared and later `set` calls are ignored.
//!
//! # Invariants
//!
//! 1. Listeners observe values in exactly the order `set` was called; distinct
//!    `set` calls are never coalesced.
//! 2. The listener list is snapshotted before a notification pass. A listener
//!    removed during the pass is not invoked later in that pass; a listener
//!    added during the pass waits for the next one.
//! 3. `version` increments by exactly 1 per accepted `set`.
//! 4. Once disposed, no update is accepted and no listener is retained.
//!
//! # Failure Modes
//!
//! - **Panicking listener**: the panic propagates to the caller of `set`. The
//!   borrow on the inner state is released before any callback runs, so the
//!   reference itself stays usable.
//! - **Re-entrant set**: allowed. The nested pass runs to completion before
//!   the outer pass continues with its own value.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use crate::cancel::{CancellationSignal, RegistrationId};

#[cfg(feature = "tracing")]
use crate::logging::trace;
#[cfg(not(feature = "tracing"))]
use crate::trace;

type Callback<T> = Rc<dyn Fn(&T)>;

struct ListenerEntry<T> {
    id: u64,
    callback: Callback<T>,
    /// Set once the listener is removed, so an in-flight pass skips it.
    cleared: Rc<Cell<bool>>,
    /// Cleanup registered on the listener's clear signal.
    hook: Option<(CancellationSignal, RegistrationId)>,
}

/// Shared interior for [`SharedReference<T>`].
struct SharedInner<T> {
    value: T,
    version: u64,
    disposed: bool,
    next_listener: u64,
    listeners: Vec<ListenerEntry<T>>,
    /// Cleanup registered on the owning signal.
    owner_hook: Option<(CancellationSignal, RegistrationId)>,
}

/// Options for [`SharedReference::on_update`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ListenOptions<'a> {
    /// Invoke the callback once with the current value before returning.
    pub emit_current_value: bool,
    /// Unregister the callback when this signal is cancelled.
    pub clear_signal: Option<&'a CancellationSignal>,
}

impl<'a> ListenOptions<'a> {
    /// Options with both fields unset.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Also emit the current value synchronously.
    #[must_use]
    pub fn emit_current(mut self) -> Self {
        self.emit_current_value = true;
        self
    }

    /// Scope the listener to `signal`.
    #[must_use]
    pub fn clear_on(mut self, signal: &'a CancellationSignal) -> Self {
        self.clear_signal = Some(signal);
        self
    }
}

/// A shared value with synchronous change notification.
///
/// Cloning a `SharedReference` creates a new handle to the **same** inner
/// state. By convention only the component that created it writes to it;
/// hand out [`ReadOnlyReference`] to everyone else.
pub struct SharedReference<T> {
    inner: Rc<RefCell<SharedInner<T>>>,
}

impl<T> Clone for SharedReference<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for SharedReference<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("SharedReference")
            .field("value", &inner.value)
            .field("version", &inner.version)
            .field("disposed", &inner.disposed)
            .field("listener_count", &inner.listeners.len())
            .finish()
    }
}

impl<T: Clone + 'static> SharedReference<T> {
    /// Create a reference holding `value`.
    ///
    /// When `owner` is given, the reference is disposed as soon as `owner` is
    /// cancelled (immediately, if it already is).
    #[must_use]
    pub fn new(value: T, owner: Option<&CancellationSignal>) -> Self {
        let reference = Self {
            inner: Rc::new(RefCell::new(SharedInner {
                value,
                version: 0,
                disposed: false,
                next_listener: 0,
                listeners: Vec::new(),
                owner_hook: None,
            })),
        };
        if let Some(signal) = owner {
            let weak = Rc::downgrade(&reference.inner);
            let hook = signal.register(move |_| {
                if let Some(inner) = weak.upgrade() {
                    dispose(&inner);
                }
            });
            let mut inner = reference.inner.borrow_mut();
            if !inner.disposed {
                inner.owner_hook = Some((signal.clone(), hook));
            }
        }
        reference
    }

    /// Get a clone of the current value.
    #[must_use]
    pub fn get(&self) -> T {
        self.inner.borrow().value.clone()
    }

    /// Access the current value by reference without cloning.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.borrow().value)
    }

    /// Replace the value and notify every listener registered right now.
    ///
    /// Ignored once the reference is disposed.
    pub fn set(&self, value: T) {
        let (snapshot, value) = {
            let mut inner = self.inner.borrow_mut();
            if inner.disposed {
                trace!("set on disposed reference ignored");
                return;
            }
            inner.value = value;
            inner.version += 1;
            let snapshot: Vec<(Callback<T>, Rc<Cell<bool>>)> = inner
                .listeners
                .iter()
                .map(|l| (Rc::clone(&l.callback), Rc::clone(&l.cleared)))
                .collect();
            (snapshot, inner.value.clone())
        };

        for (callback, cleared) in &snapshot {
            if cleared.get() {
                continue;
            }
            callback(&value);
        }
    }

    /// Register `callback` for future updates.
    ///
    /// - If `options.clear_signal` is already cancelled, nothing happens.
    /// - If `options.emit_current_value` is set, `callback` is invoked once
    ///   with the current value before this returns.
    /// - On a disposed reference the current value may still be emitted, but
    ///   the callback is never stored.
    pub fn on_update(&self, callback: impl Fn(&T) + 'static, options: ListenOptions<'_>) {
        if options.clear_signal.is_some_and(CancellationSignal::is_cancelled) {
            return;
        }

        let callback: Callback<T> = Rc::new(callback);
        let (id, disposed) = {
            let mut inner = self.inner.borrow_mut();
            if inner.disposed {
                (None, true)
            } else {
                let id = inner.next_listener;
                inner.next_listener += 1;
                inner.listeners.push(ListenerEntry {
                    id,
                    callback: Rc::clone(&callback),
                    cleared: Rc::new(Cell::new(false)),
                    hook: None,
                });
                (Some(id), false)
            }
        };

        if options.emit_current_value {
            let current = self.get();
            callback(&current);
        }
        if disposed {
            return;
        }

        let (Some(id), Some(signal)) = (id, options.clear_signal) else {
            return;
        };
        let weak: Weak<RefCell<SharedInner<T>>> = Rc::downgrade(&self.inner);
        let hook = signal.register(move |_| {
            if let Some(inner) = weak.upgrade() {
                remove_listener(&inner, id);
            }
        });
        // The signal may have been cancelled by the emitted callback itself,
        // in which case the listener is already gone.
        let mut inner = self.inner.borrow_mut();
        if let Some(entry) = inner.listeners.iter_mut().find(|l| l.id == id) {
            entry.hook = Some((signal.clone(), hook));
        }
    }

    /// Dispose the reference now: drop every listener and refuse later
    /// updates. Idempotent.
    pub fn finish(&self) {
        dispose(&self.inner);
    }

    /// Whether the reference has been disposed.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.inner.borrow().disposed
    }

    /// Number of currently registered listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.inner.borrow().listeners.len()
    }

    /// Number of accepted `set` calls so far.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.inner.borrow().version
    }

    /// A handle that can read and subscribe but not write.
    #[must_use]
    pub fn read_only(&self) -> ReadOnlyReference<T> {
        ReadOnlyReference {
            inner: self.clone(),
        }
    }
}

impl<T: Clone + PartialEq + 'static> SharedReference<T> {
    /// Like [`set`](Self::set), but a value equal to the current one is
    /// dropped without notifying anyone.
    pub fn set_if_changed(&self, value: T) {
        if self.inner.borrow().value == value {
            return;
        }
        self.set(value);
    }
}

fn remove_listener<T>(inner: &Rc<RefCell<SharedInner<T>>>, id: u64) {
    let removed = {
        let mut guard = inner.borrow_mut();
        guard
            .listeners
            .iter()
            .position(|l| l.id == id)
            .map(|idx| guard.listeners.remove(idx))
    };
    if let Some(entry) = removed {
        entry.cleared.set(true);
    }
}

fn dispose<T>(inner: &Rc<RefCell<SharedInner<T>>>) {
    let (listeners, owner_hook) = {
        let mut guard = inner.borrow_mut();
        if guard.disposed {
            return;
        }
        guard.disposed = true;
        (
            std::mem::take(&mut guard.listeners),
            guard.owner_hook.take(),
        )
    };
    if let Some((signal, hook)) = owner_hook {
        signal.deregister(hook);
    }
    for entry in listeners {
        entry.cleared.set(true);
        if let Some((signal, hook)) = entry.hook {
            signal.deregister(hook);
        }
    }
}

// ─── ReadOnlyReference ───────────────────────────────────────────────────────

/// Read/subscribe view over a [`SharedReference`].
pub struct ReadOnlyReference<T> {
    inner: SharedReference<T>,
}

impl<T> Clone for ReadOnlyReference<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for ReadOnlyReference<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ReadOnlyReference").field(&self.inner).finish()
    }
}

impl<T: Clone + 'static> ReadOnlyReference<T> {
    /// A read-only reference that never changes.
    #[must_use]
    pub fn constant(value: T) -> Self {
        SharedReference::new(value, None).read_only()
    }

    /// See [`SharedReference::get`].
    #[must_use]
    pub fn get(&self) -> T {
        self.inner.get()
    }

    /// See [`SharedReference::with`].
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.inner.with(f)
    }

    /// See [`SharedReference::on_update`].
    pub fn on_update(&self, callback: impl Fn(&T) + 'static, options: ListenOptions<'_>) {
        self.inner.on_update(callback, options);
    }

    /// See [`SharedReference::is_disposed`].
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.inner.is_disposed()
    }

    /// See [`SharedReference::listener_count`].
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.inner.listener_count()
    }

    /// See [`SharedReference::version`].
    #[must_use]
    pub fn version(&self) -> u64 {
        self.inner.version()
    }
}

impl<T: Clone + 'static> From<SharedReference<T>> for ReadOnlyReference<T> {
    fn from(reference: SharedReference<T>) -> Self {
        Self { inner: reference }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
