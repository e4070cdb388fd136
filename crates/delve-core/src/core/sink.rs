//! Ordered, non-blocking fan-out of reasoning events.
//!
//! Each subscriber owns a bounded channel. Publishing uses `try_send`, so a
//! slow subscriber loses events instead of stalling the session, and a
//! dropped subscriber is removed on the next publish.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::core::events::ReasoningEvent;

/// Sending half of a subscriber channel.
///
/// Events are wrapped in `Arc` so fan-out does not clone payloads.
pub type EventTx = mpsc::Sender<Arc<ReasoningEvent>>;

/// Receiving half of a subscriber channel.
pub type EventRx = mpsc::Receiver<Arc<ReasoningEvent>>;

/// Default per-subscriber channel capacity.
///
/// A session emits a handful of events per subtask, so this comfortably
/// holds a full run for a renderer that lags behind.
pub const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;

/// Creates a bounded event channel with the default capacity.
pub fn create_event_channel() -> (EventTx, EventRx) {
    mpsc::channel(DEFAULT_EVENT_CHANNEL_CAPACITY)
}

/// Write side of a session's event stream.
///
/// Cloning is cheap and all clones share the same subscriber list.
#[derive(Clone, Default)]
pub struct EventSink {
    subscribers: Arc<Mutex<Vec<EventTx>>>,
}

impl EventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new subscriber and returns its receiver.
    pub fn subscribe(&self) -> EventRx {
        let (tx, rx) = create_event_channel();
        self.attach(tx);
        rx
    }

    /// Registers an existing channel as a subscriber.
    pub fn attach(&self, tx: EventTx) {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
    }

    /// Delivers `event` to every live subscriber without awaiting.
    pub fn publish(&self, event: ReasoningEvent) {
        tracing::debug!(event = event.name(), "{}", event.message);
        let event = Arc::new(event);
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|tx| match tx.try_send(Arc::clone(&event)) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    tracing::warn!("event subscriber is full, dropping event");
                    true
                }
                Err(TrySendError::Closed(_)) => false,
            });
    }

    /// Number of subscribers still attached.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl std::fmt::Debug for EventSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSink")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::timeout;

    use super::*;

    #[tokio::test]
    async fn test_every_subscriber_receives_events_in_order() {
        let sink = EventSink::new();
        let mut first = sink.subscribe();
        let mut second = sink.subscribe();

        sink.publish(ReasoningEvent::subtask_start(0, 2, "a"));
        sink.publish(ReasoningEvent::subtask_validation_start(0));
        sink.publish(ReasoningEvent::subtask_complete(0, 1, "done"));

        for rx in [&mut first, &mut second] {
            let mut names = Vec::new();
            for _ in 0..3 {
                let event = timeout(Duration::from_secs(1), rx.recv())
                    .await
                    .unwrap()
                    .unwrap();
                names.push(event.name());
            }
            assert_eq!(
                names,
                [
                    "subtask_start",
                    "subtask_validation_start",
                    "subtask_complete"
                ]
            );
        }
    }

    #[tokio::test]
    async fn test_closed_subscriber_is_removed() {
        let sink = EventSink::new();
        let kept = sink.subscribe();
        let dropped = sink.subscribe();
        drop(dropped);

        sink.publish(ReasoningEvent::aggregation_complete("x"));

        assert_eq!(sink.subscriber_count(), 1);
        drop(kept);
    }

    #[tokio::test]
    async fn test_full_subscriber_does_not_block_publish() {
        let sink = EventSink::new();
        let (tx, mut rx) = mpsc::channel(1);
        sink.attach(tx);
        let mut roomy = sink.subscribe();

        sink.publish(ReasoningEvent::subtask_validation_start(0));
        sink.publish(ReasoningEvent::subtask_validation_start(1));

        // The bounded subscriber kept only the first event but stays attached.
        assert_eq!(sink.subscriber_count(), 2);
        assert!(rx.recv().await.is_some());
        assert!(rx.try_recv().is_err());

        assert!(roomy.recv().await.is_some());
        assert!(roomy.recv().await.is_some());
    }

    #[tokio::test]
    async fn test_receiver_closes_when_sink_dropped() {
        let sink = EventSink::new();
        let mut rx = sink.subscribe();
        drop(sink);
        assert!(rx.recv().await.is_none());
    }
}
