//! Message record and the queue's in-memory projection of it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::status::{Channel, MessageStatus};

/// One channel/variant instance of outreach content tied to a lead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique message ID.
    pub id: Uuid,
    /// Owning lead (many messages per lead).
    pub lead_id: Uuid,
    pub channel: Channel,
    /// A/B tag, free-form.
    pub variant: String,
    /// Opaque content produced upstream.
    pub content: String,
    pub status: MessageStatus,
    /// Incremented on every failed dispatch; never reset except by a full
    /// record reset.
    pub retry_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Create a new pending message for a lead.
    pub fn new(
        lead_id: Uuid,
        channel: Channel,
        variant: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            lead_id,
            channel,
            variant: variant.into(),
            content: content.into(),
            status: MessageStatus::Pending,
            retry_count: 0,
            error_message: None,
            sent_at: None,
            created_at: Utc::now(),
        }
    }

    /// Set the status (builder style, for seeding and tests).
    pub fn with_status(mut self, status: MessageStatus) -> Self {
        self.status = status;
        self
    }

    /// Set the creation time (fetch order is creation-time ascending).
    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }
}

/// A message pulled into the delivery queue, joined with the lead fields
/// needed for dispatch. Created on fetch, destroyed on dispatch or clear.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueEntry {
    pub message_id: Uuid,
    pub lead_id: Uuid,
    pub channel: Channel,
    pub variant: String,
    pub content: String,
    pub retry_count: u32,
    pub lead_name: String,
    pub lead_email: String,
    pub company: String,
    pub role: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_message_is_pending() {
        let msg = Message::new(Uuid::new_v4(), Channel::Email, "A", "hello");
        assert_eq!(msg.status, MessageStatus::Pending);
        assert_eq!(msg.retry_count, 0);
        assert!(msg.sent_at.is_none());
        assert!(msg.error_message.is_none());
    }
}
