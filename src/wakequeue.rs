//! Wake queue
//!
//! Thread-safe wait/notify conditions shared by all channels. Each channel
//! registers two handles — its "readable" and its "writable" condition — and
//! blocked sessions park on one of them until the opposite role changes the
//! buffer state.
//!
//! # Waiting without losing wakeups
//!
//! The naive workflow is:
//!
//! 10. Session: check the buffer condition
//! 20. Session: call `wait_async`
//! 30. Queue-for-session: add the session to the waiting list
//! 40. Queue-for-session: wait for the handle notification
//!
//! 50. Peer: call `notify`
//! 60. Queue-for-peer: extract the waiters for the handle
//! 70. Queue-for-peer: wake them
//!
//! Because the peer runs on another task, step 60 can happen between steps
//! 10 and 30: the session would then wait for a notification that was
//! already consumed. To close the gap, the session takes the queue lock
//! before re-checking the condition, making steps 10-30 atomic:
//!
//! ```ignore
//! let lock = queue.get_lock();
//! if still_must_wait() {
//!     queue.wait_async(handle, hint, lock).await;
//!     // the lock is consumed by wait_async and released before awaiting
//! } else {
//!     drop(lock);
//! }
//! ```
//!
//! A woken session re-checks its condition and may wait again; no fairness
//! is guaranteed among waiters of the same handle.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// Identifier of one wait condition in the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle {
    id: i64,
}

impl Handle {
    #[must_use]
    pub fn new(id: i64) -> Self {
        Self { id }
    }

    #[must_use]
    pub fn id(&self) -> i64 {
        self.id
    }
}

/// Thread-safe generator of unique handle ids.
#[derive(Debug)]
pub struct IdGen {
    next_id: AtomicI64,
}

impl IdGen {
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_id: AtomicI64::new(1),
        }
    }

    pub fn get_next(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for IdGen {
    fn default() -> Self {
        Self::new()
    }
}

/// One session parked on a condition.
struct Waiter {
    sender: tokio::sync::oneshot::Sender<i64>,
    debug_hint: String,
}

impl std::fmt::Debug for Waiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Waiter")
            .field("debug_hint", &self.debug_hint)
            .finish_non_exhaustive()
    }
}

pub struct InnerState {
    /// Registered conditions. Waiting on an unregistered handle returns
    /// immediately instead of parking forever.
    registered: HashMap<Handle, String>,
    waiters: HashMap<Handle, Vec<Waiter>>,
}

impl InnerState {
    fn new() -> Self {
        Self {
            registered: HashMap::new(),
            waiters: HashMap::new(),
        }
    }
}

/// Shared wake queue; clones refer to the same state.
#[derive(Clone)]
pub struct WakeQueueArc {
    inner: Arc<Mutex<InnerState>>,
}

impl WakeQueueArc {
    #[must_use]
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(InnerState::new())),
        }
    }

    /// Get the queue lock for an atomic condition-check plus register.
    pub fn get_lock(&self) -> parking_lot::MutexGuard<'_, InnerState> {
        self.inner.lock()
    }

    /// Register a condition handle.
    pub fn register(&self, handle: Handle, debug_hint: &str) {
        let mut state = self.inner.lock();
        if let Some(old_hint) = state.registered.insert(handle, debug_hint.to_string()) {
            log::warn!("wakequeue.register: handle {handle:?} already registered (was: '{old_hint}')");
        }
    }

    /// Unregister a condition handle.
    ///
    /// Wakes every parked waiter with `-1`; later waits on this handle
    /// return immediately.
    pub fn unregister(&self, handle: Handle) {
        {
            let mut state = self.inner.lock();
            if state.registered.remove(&handle).is_none() {
                log::warn!("wakequeue.unregister: handle {handle:?} not registered");
            }
        }
        self.notify(handle, -1);
    }

    /// Wake all waiters currently parked on `handle`.
    ///
    /// `arg` is informational (byte count or `-1` for "peer role gone");
    /// woken sessions ignore it and re-check their condition.
    pub fn notify(&self, handle: Handle, arg: i64) {
        let waiters = {
            let mut state = self.inner.lock();
            state.waiters.remove(&handle).unwrap_or_default()
        };

        log::debug!(
            "wakequeue.notify: handle {handle:?}, arg={arg}, waiters: {}",
            waiters.len()
        );

        for waiter in waiters {
            if waiter.sender.send(arg).is_err() {
                // Receiver dropped: the waiter was cancelled while parked.
                log::debug!(
                    "wakequeue.notify: receiver gone for handle {:?} (hint: {})",
                    handle,
                    waiter.debug_hint
                );
            }
        }
    }

    /// Park on `handle` until the next [`notify`] or [`unregister`].
    ///
    /// Precondition: the caller holds the queue lock and has re-checked its
    /// condition under it. The lock is consumed and released before the
    /// returned future suspends.
    ///
    /// [`notify`]: WakeQueueArc::notify
    /// [`unregister`]: WakeQueueArc::unregister
    pub fn wait_async(
        &self,
        handle: Handle,
        debug_hint: &str,
        mut lock: parking_lot::MutexGuard<'_, InnerState>,
    ) -> impl std::future::Future<Output = ()> + Send {
        let (tx, rx) = tokio::sync::oneshot::channel();

        if lock.registered.contains_key(&handle) {
            let waiter = Waiter {
                sender: tx,
                debug_hint: debug_hint.to_string(),
            };
            lock.waiters.entry(handle).or_default().push(waiter);
            drop(lock);
        } else {
            // The condition is gone; resolve immediately so the caller
            // re-checks instead of parking forever.
            drop(lock);
            let _ = tx.send(0);
        }

        // The send side always fires before the senders are dropped (see
        // `notify`), so an Err from rx only happens if the whole queue is
        // torn down with sessions still parked; there is nothing useful to
        // do about that here.
        async move {
            let _ = rx.await;
        }
    }
}
