//! Broadcast channel for pipeline events.
//!
//! [`EventBus`] wraps a [`tokio::sync::broadcast`] channel. Services
//! publish a [`PipelineEvent`] after each acknowledged record write and
//! WebSocket connections subscribe to receive filtered events.

use tokio::sync::broadcast;

use super::PipelineEvent;

/// Broadcast bus for [`PipelineEvent`]s.
///
/// When the ring buffer is full the oldest events are dropped for lagging
/// receivers. Publishing never blocks a pipeline step.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<PipelineEvent>,
}

impl EventBus {
    /// Creates a new `EventBus` with the given channel capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of receivers that received the event. With no
    /// active receivers the event is dropped.
    pub fn publish(&self, event: PipelineEvent) -> usize {
        tracing::trace!(event_type = event.event_type_str(), "publishing pipeline event");
        self.sender.send(event).unwrap_or(0)
    }

    /// Creates a new receiver for all future events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.sender.subscribe()
    }

    /// Returns the current number of active receivers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn run_started() -> PipelineEvent {
        PipelineEvent::RunStarted {
            run_id: "run-1".to_string(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn publish_without_receivers_returns_zero() {
        let bus = EventBus::new(16);
        assert_eq!(bus.publish(run_started()), 0);
    }

    #[tokio::test]
    async fn subscribers_receive_same_event() {
        let bus = EventBus::new(16);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        assert_eq!(bus.publish(run_started()), 2);

        let Ok(e1) = rx1.recv().await else {
            panic!("rx1 failed");
        };
        let Ok(e2) = rx2.recv().await else {
            panic!("rx2 failed");
        };
        assert_eq!(e1.event_type_str(), "run_started");
        assert_eq!(e2.event_type_str(), "run_started");
    }

    #[test]
    fn receiver_count_tracks_subscribers() {
        let bus = EventBus::new(16);
        let rx = bus.subscribe();
        assert_eq!(bus.receiver_count(), 1);
        drop(rx);
        assert_eq!(bus.receiver_count(), 0);
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let bus = EventBus::new(0);
        let _rx = bus.subscribe();
        assert_eq!(bus.publish(run_started()), 1);
    }
}
