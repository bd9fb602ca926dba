use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::runtime::RedeliveryCause;
use crate::submit::JobRunId;

/// Metadata envelope attached to every dispatch event.
///
/// The correlation id is minted once per record dispatch and shared by all
/// events that dispatch emits, so a record's lifecycle can be stitched
/// together downstream.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EventMeta {
    pub correlation_id: Uuid,
    pub message_id: String,
    pub timestamp: DateTime<Utc>,
}

impl EventMeta {
    pub fn new(message_id: impl Into<String>, correlation_id: Uuid) -> Self {
        Self {
            correlation_id,
            message_id: message_id.into(),
            timestamp: Utc::now(),
        }
    }
}

/// One record-lifecycle event with its metadata envelope.
#[derive(Clone, Debug)]
pub struct DispatchEvent {
    pub meta: EventMeta,
    pub payload: DispatchEventPayload,
}

/// Payload emitted for record-lifecycle transitions.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub enum DispatchEventPayload {
    /// A record entered the dispatch loop.
    RecordReceived { receive_count: u32 },
    /// The record body could not be decoded; no candidates were extracted.
    RecordRejected { error: String },
    /// A candidate's job run was created.
    JobSubmitted { position: usize, run_id: JobRunId },
    /// A candidate failed validation or submission.
    CandidateFailed { position: usize, reason: String },
    /// Every candidate succeeded and the record was deleted.
    RecordAcked { submitted: usize },
    /// The record was left on the queue for redelivery.
    RecordLeftForRedelivery { cause: RedeliveryCause },
}

/// In-process event bus for dispatch lifecycle events.
///
/// A thin fan-out over a tokio broadcast channel: publishers never wait for
/// slow subscribers, every subscriber receives every event within capacity,
/// and a lagging subscriber gets `RecvError::Lagged` instead of blocking
/// the dispatch loop. Events do not leave the process.
pub struct DispatchEventBus {
    sender: broadcast::Sender<DispatchEvent>,
    capacity: usize,
}

impl std::fmt::Debug for DispatchEventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchEventBus")
            .field("capacity", &self.capacity)
            .field("subscribers", &self.sender.receiver_count())
            .finish()
    }
}

impl DispatchEventBus {
    /// Create a bus buffering up to `capacity` events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender, capacity }
    }

    /// Publish an event to all subscribers.
    ///
    /// Non-blocking; with no subscribers the event is silently dropped.
    pub fn publish(&self, event: DispatchEvent) {
        let _ = self.sender.send(event);
    }

    /// Subscribe to dispatch events published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<DispatchEvent> {
        self.sender.subscribe()
    }

    /// Number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Configured channel capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    fn event(message_id: &str) -> DispatchEvent {
        DispatchEvent {
            meta: EventMeta::new(message_id, Uuid::now_v7()),
            payload: DispatchEventPayload::RecordReceived { receive_count: 1 },
        }
    }

    #[tokio::test]
    async fn test_all_subscribers_receive_all_events() {
        let bus = DispatchEventBus::new(100);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        for i in 0..5 {
            bus.publish(event(&format!("msg-{}", i)));
        }

        for i in 0..5 {
            let expected = format!("msg-{}", i);
            let e1 = timeout(Duration::from_millis(100), rx1.recv())
                .await
                .unwrap()
                .unwrap();
            let e2 = timeout(Duration::from_millis(100), rx2.recv())
                .await
                .unwrap()
                .unwrap();
            assert_eq!(e1.meta.message_id, expected);
            assert_eq!(e2.meta.message_id, expected);
        }
    }

    #[tokio::test]
    async fn test_lagging_subscriber_does_not_block_publisher() {
        let bus = DispatchEventBus::new(2);
        let mut rx = bus.subscribe();

        for i in 0..5 {
            bus.publish(event(&format!("msg-{}", i)));
        }

        match timeout(Duration::from_millis(100), rx.recv())
            .await
            .expect("receiver should resolve")
        {
            Err(broadcast::error::RecvError::Lagged(_)) | Ok(_) => {}
            Err(broadcast::error::RecvError::Closed) => {
                panic!("channel should not be closed");
            }
        }
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_noop() {
        let bus = DispatchEventBus::new(4);
        bus.publish(event("msg-0"));
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_debug_format_reports_capacity_and_subscribers() {
        let bus = DispatchEventBus::new(8);
        let _rx = bus.subscribe();

        let debug = format!("{:?}", bus);
        assert!(debug.contains("capacity: 8"));
        assert!(debug.contains("subscribers: 1"));
    }
}
