use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// Opaque token acknowledging one delivery of a record back to the queue.
///
/// Tokens identify a delivery, not a message: a redelivered record carries
/// a fresh token.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct ReceiptToken(String);

impl ReceiptToken {
    /// Wrap a raw receipt token.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The raw token value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ReceiptToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One message delivery from the source queue.
///
/// The body is expected to be JSON but is carried opaquely; decoding is the
/// codec's concern. The receive count is approximate delivery metadata used
/// for logging only; the queue's own max-receive-count policy decides when
/// a record is quarantined to the dead-letter destination.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QueueRecord {
    /// Queue-assigned message identifier.
    pub message_id: String,
    /// Raw record body.
    pub body: String,
    /// Token for acknowledging this delivery.
    pub receipt: ReceiptToken,
    /// Approximate number of times this record has been delivered.
    pub receive_count: u32,
}

/// Trait for source-queue backends.
///
/// The queue is the sole piece of shared mutable state in the system and is
/// only ever mutated through [`delete_record`](QueueConsumer::delete_record)
/// on full per-record success. Records that are never deleted fall back to
/// the queue's visibility-timeout, redelivery, and dead-letter policy,
/// which lives in queue configuration external to this crate.
#[async_trait]
pub trait QueueConsumer: Send + Sync {
    /// Receive the next batch of records. An empty batch means the queue
    /// had nothing to deliver.
    async fn receive_batch(&self) -> anyhow::Result<Vec<QueueRecord>>;

    /// Delete one delivered record, acknowledging it permanently.
    async fn delete_record(&self, receipt: &ReceiptToken) -> anyhow::Result<()>;
}
