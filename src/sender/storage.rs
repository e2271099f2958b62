//! Storage sender — simulation transport writing messages to disk.
//!
//! Each dispatched entry becomes one JSON document under the storage
//! directory, named `{timestamp}_{channel}_{variant}_{lead}.json`.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use tracing::{error, info};

use crate::model::QueueEntry;
use crate::sender::Sender;

/// Storage-only sender for simulated delivery.
pub struct StorageSender {
    root: PathBuf,
}

impl StorageSender {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Write one entry as a JSON document, tagged with a status marker.
    /// Returns `false` (after logging) on any filesystem error.
    pub async fn save(&self, entry: &QueueEntry, status: &str) -> bool {
        match self.write_document(entry, status).await {
            Ok(path) => {
                info!(
                    message_id = %entry.message_id,
                    channel = %entry.channel,
                    file = %path.display(),
                    "Message saved to storage"
                );
                true
            }
            Err(e) => {
                error!(message_id = %entry.message_id, error = %e, "Failed to save message to storage");
                false
            }
        }
    }

    async fn write_document(
        &self,
        entry: &QueueEntry,
        status: &str,
    ) -> std::io::Result<PathBuf> {
        tokio::fs::create_dir_all(&self.root).await?;

        let timestamp = Utc::now().format("%Y%m%d_%H%M%S").to_string();
        let filename = format!(
            "{timestamp}_{}_{}_{}.json",
            entry.channel,
            entry.variant,
            sanitize(&entry.lead_name)
        );
        let path = self.root.join(filename);

        let document = serde_json::json!({
            "message_id": entry.message_id,
            "lead_id": entry.lead_id,
            "timestamp": timestamp,
            "channel": entry.channel,
            "variant": entry.variant,
            "lead": {
                "name": entry.lead_name,
                "email": entry.lead_email,
                "company": entry.company,
                "role": entry.role,
            },
            "content": entry.content,
            "status": status,
        });

        let body = serde_json::to_vec_pretty(&document)
            .map_err(|e| std::io::Error::other(e.to_string()))?;
        tokio::fs::write(&path, body).await?;
        Ok(path)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

fn sanitize(name: &str) -> String {
    name.replace([' ', '/'], "_")
}

#[async_trait]
impl Sender for StorageSender {
    async fn send(&self, entry: &QueueEntry) -> bool {
        self.save(entry, "DRY_RUN_SAVED").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    use crate::model::Channel;

    fn entry() -> QueueEntry {
        QueueEntry {
            message_id: Uuid::new_v4(),
            lead_id: Uuid::new_v4(),
            channel: Channel::Email,
            variant: "A".into(),
            content: "Subject: Hello\n\nHi Ada".into(),
            retry_count: 0,
            lead_name: "Ada Smith".into(),
            lead_email: "ada@initech.com".into(),
            company: "Initech".into(),
            role: "CTO".into(),
        }
    }

    #[tokio::test]
    async fn send_writes_one_json_document() {
        let dir = tempfile::tempdir().unwrap();
        let sender = StorageSender::new(dir.path());

        assert!(sender.send(&entry()).await);

        let files: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap())
            .collect();
        assert_eq!(files.len(), 1);

        let name = files[0].file_name().into_string().unwrap();
        assert!(name.contains("email_A_Ada_Smith"));
        assert!(name.ends_with(".json"));

        let body = std::fs::read_to_string(files[0].path()).unwrap();
        let doc: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(doc["channel"], "email");
        assert_eq!(doc["lead"]["company"], "Initech");
        assert_eq!(doc["status"], "DRY_RUN_SAVED");
    }

    #[tokio::test]
    async fn save_reports_false_on_unwritable_root() {
        // A file in place of the directory makes create_dir_all fail.
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocked");
        std::fs::write(&blocker, b"x").unwrap();

        let sender = StorageSender::new(&blocker);
        assert!(!sender.send(&entry()).await);
    }

    #[test]
    fn sanitize_strips_separators() {
        assert_eq!(sanitize("Ada Smith/CTO"), "Ada_Smith_CTO");
    }
}
