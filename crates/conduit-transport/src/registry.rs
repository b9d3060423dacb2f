//! Listener registry for inbound connection events.
//!
//! Every registered callback observes every inbound event. Dispatch works on
//! a snapshot of the registry, so callbacks may register or dispose
//! listeners (including their own) while they run.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use conduit_frame::Message;
use tracing::trace;

use crate::error::TransportError;

/// A transport error shared between every listener that observes it.
pub type SharedError = Arc<TransportError>;

/// What a receive callback is handed: a decoded message or an error.
pub type ReceiveResult<'a> = std::result::Result<&'a Message, SharedError>;

type Callback = Box<dyn FnMut(ReceiveResult<'_>) + Send>;

struct Listener {
    id: u64,
    active: AtomicBool,
    callback: Mutex<Callback>,
}

#[derive(Default)]
pub(crate) struct Registry {
    next_id: AtomicU64,
    listeners: Mutex<Vec<Arc<Listener>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Registry {
    pub(crate) fn register(self: &Arc<Self>, callback: Callback) -> Subscription {
        let listener = Arc::new(Listener {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            active: AtomicBool::new(true),
            callback: Mutex::new(callback),
        });
        lock(&self.listeners).push(Arc::clone(&listener));
        trace!(listener = listener.id, "listener registered");

        Subscription {
            registry: Arc::downgrade(self),
            listener,
        }
    }

    /// Hand `event` to every listener active at the time of the call.
    pub(crate) fn dispatch(&self, event: ReceiveResult<'_>) {
        let snapshot: Vec<Arc<Listener>> = lock(&self.listeners).clone();
        for listener in snapshot {
            if !listener.active.load(Ordering::Acquire) {
                continue;
            }
            let mut callback = lock(&listener.callback);
            // Re-check under the callback lock: a dispose may have landed in between.
            if listener.active.load(Ordering::Acquire) {
                (*callback)(event.clone());
            }
        }
    }

    pub(crate) fn len(&self) -> usize {
        lock(&self.listeners).len()
    }

    fn remove(&self, id: u64) {
        lock(&self.listeners).retain(|listener| listener.id != id);
        trace!(listener = id, "listener disposed");
    }
}

/// Handle to one registered receive callback.
///
/// Releasing the registration happens exactly once: on the first
/// [`Subscription::dispose`] call or when the handle is dropped.
pub struct Subscription {
    registry: Weak<Registry>,
    listener: Arc<Listener>,
}

impl Subscription {
    /// Deregister the callback. Safe to call any number of times.
    ///
    /// Once this returns the callback is not invoked again.
    pub fn dispose(&self) {
        if self.listener.active.swap(false, Ordering::AcqRel) {
            if let Some(registry) = self.registry.upgrade() {
                registry.remove(self.listener.id);
            }
        }
    }

    /// False once the subscription has been disposed.
    pub fn is_active(&self) -> bool {
        self.listener.active.load(Ordering::Acquire)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.listener.id)
            .field("active", &self.is_active())
            .finish()
    }
}
