//! `Store` trait — the persistence port consumed by the pipeline core.
//!
//! The core treats lead and message records as opaque rows it reads and
//! mutates through this interface; it holds no authority over durable
//! state beyond read-then-write on a per-item basis.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::model::{Channel, Lead, LeadStatus, Message, MessageStatus, QueueEntry};
use crate::pipeline::BatchItem;

/// Backend-agnostic persistence interface for leads and messages.
#[async_trait]
pub trait Store: Send + Sync {
    async fn insert_lead(&self, lead: &Lead) -> Result<(), DatabaseError>;

    async fn insert_message(&self, message: &Message) -> Result<(), DatabaseError>;

    async fn get_lead(&self, id: Uuid) -> Result<Option<Lead>, DatabaseError>;

    async fn get_message(&self, id: Uuid) -> Result<Option<Message>, DatabaseError>;

    /// Messages matching `status` (optionally narrowed by channel), joined
    /// with the lead fields needed for dispatch, ordered by creation time
    /// ascending — the earliest-created rows come first. At most `limit`
    /// rows. An empty result is a normal outcome, not an error.
    async fn fetch_eligible(
        &self,
        status: MessageStatus,
        channel: Option<Channel>,
        limit: usize,
    ) -> Result<Vec<QueueEntry>, DatabaseError>;

    /// All pending messages, oldest first. Input to review.
    async fn pending_messages(&self) -> Result<Vec<Message>, DatabaseError>;

    /// Update a message's status.
    ///
    /// With an error string: sets `error_message` and increments
    /// `retry_count`. Without one: sets `sent_at` when the new status is
    /// Sent. `retry_count` is never reset here.
    async fn update_message_status(
        &self,
        id: Uuid,
        status: MessageStatus,
        error: Option<&str>,
    ) -> Result<(), DatabaseError>;

    async fn update_lead_status(&self, id: Uuid, status: LeadStatus) -> Result<(), DatabaseError>;

    /// Lead counts grouped by status.
    async fn lead_status_counts(&self) -> Result<Vec<(LeadStatus, u64)>, DatabaseError>;

    /// Message counts grouped by status.
    async fn message_status_counts(&self) -> Result<Vec<(MessageStatus, u64)>, DatabaseError>;

    /// One `BatchItem` per lead (oldest leads first): the lead's status
    /// plus its most actionable non-rejected message status, if any —
    /// Pending before Approved before Failed before Sent, so a lead
    /// mid-messaging finishes that cycle before anything else runs.
    async fn decision_batch(&self, limit: usize) -> Result<Vec<BatchItem>, DatabaseError>;
}
