use async_trait::async_trait;
use parking_lot::Mutex;
use skua::{QueueConsumer, QueueRecord, ReceiptToken};
use std::collections::VecDeque;
use std::sync::Arc;

/// In-memory source queue for dispatcher tests.
///
/// Records are delivered in insertion order, up to `batch_size` per
/// receive. Deletions are tracked rather than destructive so tests can
/// assert exactly which records were acknowledged. There is no visibility
/// timeout: an undeleted record is not redelivered automatically, tests
/// drive redelivery explicitly with [`redeliver`](InMemoryQueue::redeliver).
#[derive(Clone)]
pub struct InMemoryQueue {
    pending: Arc<Mutex<VecDeque<QueueRecord>>>,
    deleted: Arc<Mutex<Vec<ReceiptToken>>>,
    failing_deletes: Arc<Mutex<u32>>,
    batch_size: usize,
    next_id: Arc<Mutex<u64>>,
}

impl InMemoryQueue {
    /// Create a queue delivering up to `batch_size` records per receive.
    pub fn new(batch_size: usize) -> Self {
        Self {
            pending: Arc::new(Mutex::new(VecDeque::new())),
            deleted: Arc::new(Mutex::new(Vec::new())),
            failing_deletes: Arc::new(Mutex::new(0)),
            batch_size,
            next_id: Arc::new(Mutex::new(1)),
        }
    }

    /// Enqueue a record with the given body, returning a copy of it.
    pub fn push_body(&self, body: impl Into<String>) -> QueueRecord {
        let id = {
            let mut next = self.next_id.lock();
            let id = *next;
            *next += 1;
            id
        };
        let record = QueueRecord {
            message_id: format!("msg-{}", id),
            body: body.into(),
            receipt: ReceiptToken::new(format!("rcpt-{}", id)),
            receive_count: 1,
        };
        self.pending.lock().push_back(record.clone());
        record
    }

    /// Redeliver a previously received record, as the queue would after its
    /// visibility timeout lapses. The redelivery carries a fresh receipt
    /// and an incremented receive count.
    pub fn redeliver(&self, record: &QueueRecord) -> QueueRecord {
        let id = {
            let mut next = self.next_id.lock();
            let id = *next;
            *next += 1;
            id
        };
        let redelivered = QueueRecord {
            message_id: record.message_id.clone(),
            body: record.body.clone(),
            receipt: ReceiptToken::new(format!("rcpt-{}", id)),
            receive_count: record.receive_count + 1,
        };
        self.pending.lock().push_back(redelivered.clone());
        redelivered
    }

    /// Make the next `count` delete calls fail.
    pub fn fail_next_deletes(&self, count: u32) {
        *self.failing_deletes.lock() = count;
    }

    /// Receipts of every deleted record, in deletion order.
    pub fn deleted(&self) -> Vec<ReceiptToken> {
        self.deleted.lock().clone()
    }

    /// Whether the given record's delivery was deleted.
    pub fn is_deleted(&self, record: &QueueRecord) -> bool {
        self.deleted.lock().contains(&record.receipt)
    }

    /// Number of records still waiting for delivery.
    pub fn pending_len(&self) -> usize {
        self.pending.lock().len()
    }

    /// Assert how many records were deleted.
    pub fn assert_deleted_count_eq(&self, expected: usize) {
        let actual = self.deleted.lock().len();
        assert_eq!(
            actual, expected,
            "Expected {} deleted records, got {}",
            expected, actual
        );
    }
}

impl Default for InMemoryQueue {
    fn default() -> Self {
        Self::new(10)
    }
}

#[async_trait]
impl QueueConsumer for InMemoryQueue {
    async fn receive_batch(&self) -> anyhow::Result<Vec<QueueRecord>> {
        let mut pending = self.pending.lock();
        let take = self.batch_size.min(pending.len());
        Ok(pending.drain(..take).collect())
    }

    async fn delete_record(&self, receipt: &ReceiptToken) -> anyhow::Result<()> {
        {
            let mut failing = self.failing_deletes.lock();
            if *failing > 0 {
                *failing -= 1;
                anyhow::bail!("scripted delete failure for {}", receipt);
            }
        }
        self.deleted.lock().push(receipt.clone());
        Ok(())
    }
}
