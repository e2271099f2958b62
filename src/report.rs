//! Pipeline statistics — a point-in-time snapshot of lead and message
//! counts plus the delivery queue's cumulative stats.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::Result;
use crate::model::MessageStatus;
use crate::queue::{DeliveryQueue, QueueStats};
use crate::store::Store;

/// Snapshot of the whole pipeline.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub total_leads: u64,
    pub total_messages: u64,
    /// Lead counts keyed by status.
    pub leads: BTreeMap<String, u64>,
    /// Message counts keyed by status.
    pub messages: BTreeMap<String, u64>,
    pub queue: QueueStats,
}

impl PipelineReport {
    pub async fn collect(store: &dyn Store, queue: &DeliveryQueue) -> Result<Self> {
        let lead_counts = store.lead_status_counts().await?;
        let message_counts = store.message_status_counts().await?;

        let total_leads = lead_counts.iter().map(|(_, n)| n).sum();
        let total_messages = message_counts.iter().map(|(_, n)| n).sum();

        Ok(Self {
            total_leads,
            total_messages,
            leads: lead_counts
                .into_iter()
                .map(|(s, n)| (s.to_string(), n))
                .collect(),
            messages: message_counts
                .into_iter()
                .map(|(s, n)| (s.to_string(), n))
                .collect(),
            queue: queue.stats(),
        })
    }

    fn message_count(&self, status: MessageStatus) -> u64 {
        self.messages.get(&status.to_string()).copied().unwrap_or(0)
    }

    /// One-line summary for logs.
    pub fn summary(&self) -> String {
        format!(
            "{} leads, {} messages ({} pending, {} approved, {} sent, {} failed), queue size {}",
            self.total_leads,
            self.total_messages,
            self.message_count(MessageStatus::Pending),
            self.message_count(MessageStatus::Approved),
            self.message_count(MessageStatus::Sent),
            self.message_count(MessageStatus::Failed),
            self.queue.current_size,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::model::{Channel, Lead, LeadStatus, Message};
    use crate::store::LibSqlBackend;

    #[tokio::test]
    async fn report_counts_rows_by_status() {
        let store: Arc<dyn Store> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let lead = Lead::new("Ada Smith", "Initech", "CTO", "ada@initech.com", "li/ada")
            .with_status(LeadStatus::Messaged);
        store.insert_lead(&lead).await.unwrap();

        for (variant, status) in [
            ("A", MessageStatus::Pending),
            ("B", MessageStatus::Pending),
            ("C", MessageStatus::Sent),
        ] {
            let msg = Message::new(lead.id, Channel::Email, variant, "hi").with_status(status);
            store.insert_message(&msg).await.unwrap();
        }

        let queue = DeliveryQueue::new(Arc::clone(&store), 50);
        let report = PipelineReport::collect(store.as_ref(), &queue).await.unwrap();

        assert_eq!(report.total_leads, 1);
        assert_eq!(report.total_messages, 3);
        assert_eq!(report.messages.get("PENDING"), Some(&2));
        assert_eq!(report.messages.get("SENT"), Some(&1));
        assert_eq!(report.leads.get("MESSAGED"), Some(&1));

        let line = report.summary();
        assert!(line.contains("1 leads"));
        assert!(line.contains("2 pending"));
    }

    #[tokio::test]
    async fn empty_pipeline_reports_zeros() {
        let store: Arc<dyn Store> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let queue = DeliveryQueue::new(Arc::clone(&store), 50);
        let report = PipelineReport::collect(store.as_ref(), &queue).await.unwrap();
        assert_eq!(report.total_leads, 0);
        assert_eq!(report.total_messages, 0);
    }
}
