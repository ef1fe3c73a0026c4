//! In-process event bus bridging stored messages to live subscribers.
//!
//! Intake publishes one [`Notification`] per successful insert, after the
//! insert and never before. Delivery is best-effort fan-out to the subscribers
//! whose filter matches; there is no buffering or replay, so a subscriber
//! registered after a publish simply never sees it and catches up by
//! re-listing the inbox.

pub mod registry;

use crate::models::notification::Notification;
use registry::SubscriberRegistry;
use tracing::{debug, warn};

/// Per-subscriber sink capacity. A subscriber this far behind has already
/// missed a screenful of pushes; it gets dropped rather than awaited.
pub const SINK_BUFFER: usize = 32;

#[derive(Clone, Default)]
pub struct EventBus {
    registry: SubscriberRegistry,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn registry(&self) -> &SubscriberRegistry {
        &self.registry
    }

    /// Deliver `notification` to every subscriber watching its inbox.
    ///
    /// Fire-and-forget: each delivery is a non-blocking `try_send`, so no
    /// subscriber can stall the publisher or its peers. A full or closed
    /// sink marks that subscriber dead and it is deregistered after the
    /// pass; publishing itself never fails.
    pub fn publish(&self, notification: &Notification) {
        let mut dead = Vec::new();
        let mut delivered = 0usize;
        self.registry
            .for_each_matching(&notification.inbox_id, |handle, sink| {
                if sink.try_send(notification.clone()).is_ok() {
                    delivered += 1;
                } else {
                    dead.push(handle);
                }
            });
        for handle in dead {
            warn!(
                "dropping unresponsive subscriber for inbox {}",
                notification.inbox_id
            );
            self.registry.deregister(handle);
        }
        if delivered > 0 {
            debug!(
                "notified {} subscriber(s) for inbox {}",
                delivered, notification.inbox_id
            );
        }
    }
}
