//! Event bus for viewer events.
//!
//! Push-based: subscribers register callbacks that the bridge invokes
//! synchronously, once per event, in the order events were received.
//! Each registration lives as long as its [`Subscription`] guard.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use kanko_shared::Event;

type Callback = Arc<Mutex<dyn FnMut(&Event) + Send + 'static>>;

#[derive(Default)]
struct Registry {
    next_id: u64,
    entries: Vec<(u64, Callback)>,
}

fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Clone, Default)]
pub struct EventBus {
    registry: Arc<Mutex<Registry>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback for every future event.
    ///
    /// Dropping the returned guard removes the callback.
    pub fn subscribe(&self, callback: impl FnMut(&Event) + Send + 'static) -> Subscription {
        let mut registry = lock(&self.registry);
        registry.next_id += 1;
        let id = registry.next_id;
        let callback: Callback = Arc::new(Mutex::new(callback));
        registry.entries.push((id, callback));
        Subscription {
            registry: Arc::downgrade(&self.registry),
            id,
        }
    }

    /// Invoke every current subscriber with `event`.
    ///
    /// The bus is not locked while callbacks run, so a callback may
    /// subscribe or drop subscriptions; changes apply from the next event.
    pub fn dispatch(&self, event: &Event) {
        let callbacks: Vec<Callback> = lock(&self.registry)
            .entries
            .iter()
            .map(|(_, callback)| callback.clone())
            .collect();
        for callback in callbacks {
            let mut callback = lock(&callback);
            (*callback)(event);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.registry).entries.len()
    }

    pub fn clear(&self) {
        lock(&self.registry).entries.clear();
    }
}

/// Keeps a callback registered on an [`EventBus`].
#[must_use = "dropping the subscription unregisters the callback"]
pub struct Subscription {
    registry: Weak<Mutex<Registry>>,
    id: u64,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            lock(&registry).entries.retain(|(id, _)| *id != self.id);
        }
    }
}
