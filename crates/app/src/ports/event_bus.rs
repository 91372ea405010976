//! Event bus port — publish connection lifecycle events.

use cardlink_domain::event::ConnectionEvent;

/// Publishes connection events to interested subscribers.
///
/// Publishing never blocks and never fails: events without subscribers
/// are dropped.
pub trait EventPublisher: Send + Sync {
    /// Publish an event to all current subscribers.
    fn publish(&self, event: ConnectionEvent);
}

impl<T: EventPublisher> EventPublisher for std::sync::Arc<T> {
    fn publish(&self, event: ConnectionEvent) {
        (**self).publish(event);
    }
}
