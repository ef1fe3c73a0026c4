//! Live subscriber registry.
//!
//! Owns every push connection's registration. The connection layer registers
//! on connect and deregisters on disconnect (usually via [`RegistrationGuard`]);
//! the event bus iterates matching entries at publish time. All three happen
//! under one mutex, so an in-progress fan-out can never skip or double-visit
//! an entry because of a concurrent connect/disconnect.

use crate::models::notification::Notification;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::debug;

/// Opaque ticket returned by [`SubscriberRegistry::register`]; the only way
/// to address a registration afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberHandle(u64);

struct Subscriber {
    inbox_filter: String,
    sink: mpsc::Sender<Notification>,
}

#[derive(Default)]
struct Inner {
    next_id: u64,
    subscribers: HashMap<u64, Subscriber>,
}

#[derive(Clone, Default)]
pub struct SubscriberRegistry {
    inner: Arc<Mutex<Inner>>,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a live subscriber watching `inbox_filter`. Any number of
    /// subscribers may watch the same inbox.
    pub fn register(
        &self,
        inbox_filter: impl Into<String>,
        sink: mpsc::Sender<Notification>,
    ) -> SubscriberHandle {
        let mut inner = self.inner.lock().unwrap();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.subscribers.insert(
            id,
            Subscriber {
                inbox_filter: inbox_filter.into(),
                sink,
            },
        );
        SubscriberHandle(id)
    }

    /// Remove a subscriber. Removing an unknown or already-removed handle is
    /// a no-op, never an error, and never touches other subscribers.
    pub fn deregister(&self, handle: SubscriberHandle) {
        let mut inner = self.inner.lock().unwrap();
        if inner.subscribers.remove(&handle.0).is_some() {
            debug!(
                "subscriber {} deregistered ({} still active)",
                handle.0,
                inner.subscribers.len()
            );
        }
    }

    /// Call `f` once per subscriber whose filter equals `inbox_id`. Runs
    /// under the registry lock; `f` must not block (the bus only does a
    /// non-blocking `try_send` in here).
    pub fn for_each_matching<F>(&self, inbox_id: &str, mut f: F)
    where
        F: FnMut(SubscriberHandle, &mpsc::Sender<Notification>),
    {
        let inner = self.inner.lock().unwrap();
        for (id, sub) in &inner.subscribers {
            if sub.inbox_filter == inbox_id {
                f(SubscriberHandle(*id), &sub.sink);
            }
        }
    }

    /// Ties a registration to a scope: dropping the guard deregisters.
    /// The SSE layer parks one inside its stream so a client disconnect
    /// cleans up exactly once.
    pub fn guard(&self, handle: SubscriberHandle) -> RegistrationGuard {
        RegistrationGuard {
            registry: self.clone(),
            handle,
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub struct RegistrationGuard {
    registry: SubscriberRegistry,
    handle: SubscriberHandle,
}

impl Drop for RegistrationGuard {
    fn drop(&mut self) {
        self.registry.deregister(self.handle);
    }
}
