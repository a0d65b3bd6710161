//! Payload-less "something changed" notifications between views.
//!
//! A mutation site publishes after the backend confirms; every mounted view
//! subscribed to the same bus refetches. Listeners run synchronously on the
//! publishing task, so they should only signal (e.g. a `Notify`) and return.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tracing::{error, trace};

type Listener = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct Registry {
    next_id: u64,
    listeners: Vec<(u64, Listener)>,
}

fn lock(registry: &Mutex<Registry>) -> MutexGuard<'_, Registry> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Cloning yields another handle to the same listener list.
#[derive(Clone, Default)]
pub struct UpdateBus {
    registry: Arc<Mutex<Registry>>,
}

impl UpdateBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `listener`. It stays registered until the returned
    /// [`Subscription`] is unsubscribed or dropped.
    #[must_use = "dropping the subscription unsubscribes the listener"]
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn() + Send + Sync + 'static,
    {
        let mut registry = lock(&self.registry);
        let id = registry.next_id;
        registry.next_id += 1;
        registry.listeners.push((id, Arc::new(listener)));
        trace!("bus: listener {} subscribed", id);
        Subscription {
            id,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Invoke every listener in subscription order. Returns how many ran.
    ///
    /// The list is snapshotted first, so listeners may subscribe or
    /// unsubscribe (themselves or others) while being called. A listener
    /// removed before its turn is skipped; one added during dispatch waits
    /// for the next publish. A panicking listener is logged and the rest
    /// still run.
    pub fn publish(&self) -> usize {
        let snapshot: Vec<(u64, Listener)> = lock(&self.registry).listeners.clone();
        let mut invoked = 0;
        for (id, listener) in snapshot {
            if !self.is_registered(id) {
                continue;
            }
            invoked += 1;
            if catch_unwind(AssertUnwindSafe(|| listener())).is_err() {
                error!("bus: listener {} panicked during publish", id);
            }
        }
        invoked
    }

    pub fn len(&self) -> usize {
        lock(&self.registry).listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn is_registered(&self, id: u64) -> bool {
        lock(&self.registry)
            .listeners
            .iter()
            .any(|(existing, _)| *existing == id)
    }
}

/// Handle to a registered listener.
pub struct Subscription {
    id: u64,
    registry: Weak<Mutex<Registry>>,
}

impl Subscription {
    /// Remove the listener. Safe to call more than once, and from inside the
    /// listener itself.
    pub fn unsubscribe(&self) {
        let Some(registry) = self.registry.upgrade() else {
            return;
        };
        let mut registry = lock(&registry);
        let before = registry.listeners.len();
        registry.listeners.retain(|(id, _)| *id != self.id);
        if registry.listeners.len() != before {
            trace!("bus: listener {} unsubscribed", self.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
