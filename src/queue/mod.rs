//! Delivery queue — bounded in-memory working set over batched reads.

pub mod dispatch;

pub use dispatch::{DispatchOutcome, Dispatcher};

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::model::{Channel, MessageStatus, QueueEntry};
use crate::store::Store;

/// Cumulative queue statistics, over the queue's lifetime.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueueStats {
    pub total_fetched: u64,
    pub total_sent: u64,
    pub total_failed: u64,
    pub batch_count: u64,
    pub current_size: usize,
    pub is_processing: bool,
}

/// FIFO working set of message entries pulled from the store in batches.
///
/// Explicitly constructed and passed to whatever loop needs it; there is
/// no shared global instance. A single logical worker drains one queue —
/// only the dispatch loop and explicit `fetch_batch`/`clear` calls mutate
/// it.
pub struct DeliveryQueue {
    store: Arc<dyn Store>,
    batch_size: usize,
    refill_status: MessageStatus,
    refill_channel: Option<Channel>,
    entries: VecDeque<QueueEntry>,
    /// Message ids currently in the working set. Guards the invariant that
    /// no entry is fetched twice into the same queue instance concurrently.
    in_queue: HashSet<Uuid>,
    total_fetched: u64,
    total_sent: u64,
    total_failed: u64,
    batch_count: u64,
    processing: bool,
}

impl DeliveryQueue {
    /// Create a queue. Auto-refill defaults to pulling Approved messages
    /// on any channel.
    pub fn new(store: Arc<dyn Store>, batch_size: usize) -> Self {
        info!(batch_size, "Delivery queue initialized");
        Self {
            store,
            batch_size,
            refill_status: MessageStatus::Approved,
            refill_channel: None,
            entries: VecDeque::new(),
            in_queue: HashSet::new(),
            total_fetched: 0,
            total_sent: 0,
            total_failed: 0,
            batch_count: 0,
            processing: false,
        }
    }

    /// Override the filters `auto_refill` fetches with.
    pub fn with_refill_filter(mut self, status: MessageStatus, channel: Option<Channel>) -> Self {
        self.refill_status = status;
        self.refill_channel = channel;
        self
    }

    /// Pull up to `batch_size` rows matching the filter into the tail of
    /// the queue, oldest first. Returns the number actually added; 0 means
    /// nothing eligible, which is a normal outcome.
    pub async fn fetch_batch(
        &mut self,
        status: MessageStatus,
        channel: Option<Channel>,
    ) -> Result<usize, DatabaseError> {
        let rows = self
            .store
            .fetch_eligible(status, channel, self.batch_size)
            .await?;

        let mut added = 0;
        for entry in rows {
            // A row can still carry the fetch status in the store while a
            // copy sits in the working set; never enqueue it twice.
            if !self.in_queue.insert(entry.message_id) {
                debug!(message_id = %entry.message_id, "Skipping row already in queue");
                continue;
            }
            self.entries.push_back(entry);
            added += 1;
        }

        self.total_fetched += added as u64;
        self.batch_count += 1;

        info!(
            batch = self.batch_count,
            fetched = added,
            queue_size = self.entries.len(),
            status = %status,
            "Fetched batch"
        );
        Ok(added)
    }

    /// Pop the head of the queue (FIFO). Non-blocking; the caller decides
    /// whether to wait or fetch more.
    pub fn get_next(&mut self) -> Option<QueueEntry> {
        let entry = self.entries.pop_front()?;
        self.in_queue.remove(&entry.message_id);
        Some(entry)
    }

    /// Refill once with the default filters when the working set is below
    /// `min_threshold`. Never fetches more than once per call.
    pub async fn auto_refill(&mut self, min_threshold: usize) -> Result<usize, DatabaseError> {
        if self.entries.len() >= min_threshold {
            return Ok(0);
        }
        debug!(
            size = self.entries.len(),
            min_threshold, "Queue below threshold, refilling"
        );
        self.fetch_batch(self.refill_status, self.refill_channel).await
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop the working set. Fetched-but-undelivered entries are lost.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.in_queue.clear();
        warn!("Queue cleared");
    }

    /// Snapshot of the queue's cumulative statistics.
    pub fn stats(&self) -> QueueStats {
        QueueStats {
            total_fetched: self.total_fetched,
            total_sent: self.total_sent,
            total_failed: self.total_failed,
            batch_count: self.batch_count,
            current_size: self.entries.len(),
            is_processing: self.processing,
        }
    }

    pub(crate) fn record_sent(&mut self) {
        self.total_sent += 1;
    }

    pub(crate) fn record_failed(&mut self) {
        self.total_failed += 1;
    }

    pub(crate) fn set_processing(&mut self, processing: bool) {
        self.processing = processing;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    use crate::model::{Lead, LeadStatus, Message};
    use crate::store::LibSqlBackend;

    async fn store_with_lead() -> (Arc<dyn Store>, Lead) {
        let store: Arc<dyn Store> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let lead = Lead::new("Ada Smith", "Initech", "CTO", "ada@initech.com", "li/ada")
            .with_status(LeadStatus::Messaged);
        store.insert_lead(&lead).await.unwrap();
        (store, lead)
    }

    async fn insert_approved(
        store: &Arc<dyn Store>,
        lead_id: Uuid,
        variant: &str,
        offset_secs: i64,
    ) -> Uuid {
        let msg = Message::new(lead_id, Channel::Email, variant, "hello")
            .with_status(MessageStatus::Approved)
            .with_created_at(Utc::now() + Duration::seconds(offset_secs));
        store.insert_message(&msg).await.unwrap();
        msg.id
    }

    #[tokio::test]
    async fn fifo_order_follows_creation_time() {
        let (store, lead) = store_with_lead().await;
        insert_approved(&store, lead.id, "t2", 1).await;
        insert_approved(&store, lead.id, "t1", 0).await;
        insert_approved(&store, lead.id, "t3", 2).await;

        let mut queue = DeliveryQueue::new(store, 50);
        let fetched = queue
            .fetch_batch(MessageStatus::Approved, None)
            .await
            .unwrap();
        assert_eq!(fetched, 3);

        let order: Vec<String> = std::iter::from_fn(|| queue.get_next())
            .map(|e| e.variant)
            .collect();
        assert_eq!(order, vec!["t1", "t2", "t3"]);
    }

    #[tokio::test]
    async fn empty_fetch_is_not_an_error() {
        let (store, _lead) = store_with_lead().await;
        let mut queue = DeliveryQueue::new(store, 50);
        let fetched = queue
            .fetch_batch(MessageStatus::Approved, None)
            .await
            .unwrap();
        assert_eq!(fetched, 0);
        assert!(queue.is_empty());
        assert!(queue.get_next().is_none());
    }

    #[tokio::test]
    async fn refetch_does_not_duplicate_queued_rows() {
        let (store, lead) = store_with_lead().await;
        insert_approved(&store, lead.id, "A", 0).await;

        let mut queue = DeliveryQueue::new(store, 50);
        assert_eq!(
            queue.fetch_batch(MessageStatus::Approved, None).await.unwrap(),
            1
        );
        // Status has not flipped yet; a second fetch must not re-enqueue.
        assert_eq!(
            queue.fetch_batch(MessageStatus::Approved, None).await.unwrap(),
            0
        );
        assert_eq!(queue.len(), 1);
    }

    #[tokio::test]
    async fn auto_refill_is_idempotent_on_empty_store() {
        let (store, _lead) = store_with_lead().await;
        let mut queue = DeliveryQueue::new(store, 50);

        assert_eq!(queue.auto_refill(10).await.unwrap(), 0);
        assert_eq!(queue.auto_refill(10).await.unwrap(), 0);
        assert_eq!(queue.len(), 0);
        // One fetch attempt per call, no more.
        assert_eq!(queue.stats().batch_count, 2);
    }

    #[tokio::test]
    async fn auto_refill_skips_when_above_threshold() {
        let (store, lead) = store_with_lead().await;
        for i in 0..3 {
            insert_approved(&store, lead.id, &format!("v{i}"), i).await;
        }

        let mut queue = DeliveryQueue::new(store, 50);
        queue.fetch_batch(MessageStatus::Approved, None).await.unwrap();
        let batches = queue.stats().batch_count;

        assert_eq!(queue.auto_refill(2).await.unwrap(), 0);
        assert_eq!(queue.stats().batch_count, batches);
    }

    #[tokio::test]
    async fn refill_filter_override_is_used_by_auto_refill() {
        let (store, lead) = store_with_lead().await;
        let failed = Message::new(lead.id, Channel::Email, "A", "hello")
            .with_status(MessageStatus::Failed);
        store.insert_message(&failed).await.unwrap();

        let mut queue =
            DeliveryQueue::new(store, 50).with_refill_filter(MessageStatus::Failed, None);
        assert_eq!(queue.auto_refill(10).await.unwrap(), 1);
        assert_eq!(queue.get_next().unwrap().message_id, failed.id);
    }

    #[tokio::test]
    async fn batch_size_bounds_fetch() {
        let (store, lead) = store_with_lead().await;
        for i in 0..5 {
            insert_approved(&store, lead.id, &format!("v{i}"), i).await;
        }

        let mut queue = DeliveryQueue::new(store, 2);
        assert_eq!(
            queue.fetch_batch(MessageStatus::Approved, None).await.unwrap(),
            2
        );
        assert_eq!(queue.len(), 2);
    }

    #[tokio::test]
    async fn clear_empties_working_set() {
        let (store, lead) = store_with_lead().await;
        insert_approved(&store, lead.id, "A", 0).await;

        let mut queue = DeliveryQueue::new(store, 50);
        queue.fetch_batch(MessageStatus::Approved, None).await.unwrap();
        queue.clear();
        assert!(queue.is_empty());
        // Cumulative stats survive a clear.
        assert_eq!(queue.stats().total_fetched, 1);
    }

    #[tokio::test]
    async fn stats_snapshot_reflects_state() {
        let (store, lead) = store_with_lead().await;
        insert_approved(&store, lead.id, "A", 0).await;

        let mut queue = DeliveryQueue::new(store, 50);
        queue.fetch_batch(MessageStatus::Approved, None).await.unwrap();

        let stats = queue.stats();
        assert_eq!(stats.total_fetched, 1);
        assert_eq!(stats.current_size, 1);
        assert_eq!(stats.batch_count, 1);
        assert!(!stats.is_processing);
    }
}
