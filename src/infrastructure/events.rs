//! In-process event channel
//!
//! Fan-out of [`ExperimentEvent`]s to any number of subscribers. Publishing
//! never blocks the engine: each subscriber gets its own unbounded queue, and
//! a subscriber that was dropped is pruned on the next publish.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use tokio::sync::mpsc;
use tracing::debug;

use crate::domain::ExperimentEvent;

// ============================================================================
// EventSubscription
// ============================================================================

/// A live subscription to the engine's event stream
///
/// Events published after the subscription was taken are delivered in
/// publish order. Dropping the subscription detaches it from the channel.
#[derive(Debug)]
pub struct EventSubscription {
    id: u64,
    receiver: mpsc::UnboundedReceiver<ExperimentEvent>,
}

impl EventSubscription {
    /// Subscription identifier, unique within the channel
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Wait for the next event
    ///
    /// Returns `None` once the channel itself has been dropped and every
    /// buffered event was consumed.
    pub async fn recv(&mut self) -> Option<ExperimentEvent> {
        self.receiver.recv().await
    }

    /// Take the next event without waiting
    pub fn try_recv(&mut self) -> Option<ExperimentEvent> {
        self.receiver.try_recv().ok()
    }

    /// Drain every event currently buffered
    pub fn drain(&mut self) -> Vec<ExperimentEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.receiver.try_recv() {
            events.push(event);
        }
        events
    }
}

// ============================================================================
// EventChannel
// ============================================================================

/// Broadcast hub for [`ExperimentEvent`]s
#[derive(Debug, Default)]
pub struct EventChannel {
    subscribers: RwLock<HashMap<u64, mpsc::UnboundedSender<ExperimentEvent>>>,
    next_id: AtomicU64,
}

impl EventChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new subscriber
    pub fn subscribe(&self) -> EventSubscription {
        let (sender, receiver) = mpsc::unbounded_channel();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        if let Ok(mut subscribers) = self.subscribers.write() {
            subscribers.insert(id, sender);
        }

        debug!(subscription_id = id, "Event subscriber registered");

        EventSubscription { id, receiver }
    }

    /// Remove a subscriber by id
    ///
    /// Returns whether the subscription was still registered. Buffered
    /// events stay readable on the receiver until it is dropped.
    pub fn unsubscribe(&self, id: u64) -> bool {
        let Ok(mut subscribers) = self.subscribers.write() else {
            return false;
        };

        let removed = subscribers.remove(&id).is_some();
        if removed {
            debug!(subscription_id = id, "Event subscriber removed");
        }
        removed
    }

    /// Deliver an event to every live subscriber
    ///
    /// Subscribers whose receiving half was dropped are removed here.
    pub fn publish(&self, event: ExperimentEvent) {
        let Ok(mut subscribers) = self.subscribers.write() else {
            return;
        };

        subscribers.retain(|_, sender| sender.send(event.clone()).is_ok());

        debug!(
            kind = %event.kind(),
            experiment_id = %event.experiment_id(),
            subscribers = subscribers.len(),
            "Event published"
        );
    }

    /// Number of live subscribers
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().map(|s| s.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{EventKind, ExperimentId};

    fn created_event(name: &str) -> ExperimentEvent {
        ExperimentEvent::ExperimentCreated {
            experiment_id: ExperimentId::new("channel-test").unwrap(),
            name: name.to_string(),
        }
    }

    #[tokio::test]
    async fn test_subscriber_receives_published_events() {
        let channel = EventChannel::new();
        let mut subscription = channel.subscribe();

        channel.publish(created_event("First"));
        channel.publish(created_event("Second"));

        let first = subscription.recv().await.unwrap();
        assert_eq!(first.kind(), EventKind::ExperimentCreated);
        let second = subscription.recv().await.unwrap();
        match second {
            ExperimentEvent::ExperimentCreated { name, .. } => assert_eq!(name, "Second"),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_all_subscribers_see_every_event() {
        let channel = EventChannel::new();
        let mut first = channel.subscribe();
        let mut second = channel.subscribe();
        assert_eq!(channel.subscriber_count(), 2);

        channel.publish(created_event("Shared"));

        assert!(first.try_recv().is_some());
        assert!(second.try_recv().is_some());
    }

    #[tokio::test]
    async fn test_dropped_subscriber_is_pruned_on_publish() {
        let channel = EventChannel::new();
        let subscription = channel.subscribe();
        let mut kept = channel.subscribe();
        assert_eq!(channel.subscriber_count(), 2);

        drop(subscription);
        channel.publish(created_event("After drop"));

        assert_eq!(channel.subscriber_count(), 1);
        assert!(kept.try_recv().is_some());
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_a_no_op() {
        let channel = EventChannel::new();
        channel.publish(created_event("Nobody listening"));
        assert_eq!(channel.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_drain_returns_buffered_events_in_order() {
        let channel = EventChannel::new();
        let mut subscription = channel.subscribe();

        for i in 0..5 {
            channel.publish(created_event(&format!("Event {}", i)));
        }

        let events = subscription.drain();
        assert_eq!(events.len(), 5);
        match &events[0] {
            ExperimentEvent::ExperimentCreated { name, .. } => assert_eq!(name, "Event 0"),
            other => panic!("unexpected event: {:?}", other),
        }
        assert!(subscription.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_unsubscribe_stops_delivery() {
        let channel = EventChannel::new();
        let mut subscription = channel.subscribe();

        channel.publish(created_event("Before"));
        assert!(channel.unsubscribe(subscription.id()));
        channel.publish(created_event("After"));

        // The buffered event survives, nothing published later arrives
        let events = subscription.drain();
        assert_eq!(events.len(), 1);
        assert!(!channel.unsubscribe(subscription.id()));
        assert_eq!(channel.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_subscription_ids_are_unique() {
        let channel = EventChannel::new();
        let a = channel.subscribe();
        let b = channel.subscribe();
        assert_ne!(a.id(), b.id());
    }
}
