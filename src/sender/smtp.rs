//! SMTP sender — live email delivery via lettre.
//!
//! LinkedIn delivery is not automated: linkedin entries are written to
//! storage with a manual-action marker instead.

use std::path::PathBuf;

use async_trait::async_trait;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message as Email, SmtpTransport, Transport};
use tracing::{error, info, warn};

use crate::model::{Channel, QueueEntry};
use crate::sender::{Sender, StorageSender};

/// SMTP configuration, built from environment variables.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from_address: String,
}

impl SmtpConfig {
    /// Build config from environment variables.
    /// Returns `None` if `LEADFLOW_SMTP_HOST` is not set (live email disabled).
    pub fn from_env() -> Option<Self> {
        let host = std::env::var("LEADFLOW_SMTP_HOST").ok()?;

        let port: u16 = std::env::var("LEADFLOW_SMTP_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(587);

        let username = std::env::var("LEADFLOW_SMTP_USERNAME").unwrap_or_default();
        let password = std::env::var("LEADFLOW_SMTP_PASSWORD").unwrap_or_default();
        let from_address =
            std::env::var("LEADFLOW_SMTP_FROM").unwrap_or_else(|_| username.clone());

        Some(Self {
            host,
            port,
            username,
            password,
            from_address,
        })
    }
}

/// Live transport: SMTP for email, storage fallback for linkedin.
pub struct SmtpSender {
    config: SmtpConfig,
    storage: StorageSender,
}

impl SmtpSender {
    pub fn new(config: SmtpConfig, storage_dir: impl Into<PathBuf>) -> Self {
        Self {
            config,
            storage: StorageSender::new(storage_dir),
        }
    }

    fn send_email(&self, entry: &QueueEntry) -> Result<(), String> {
        let creds = Credentials::new(
            self.config.username.clone(),
            self.config.password.clone(),
        );

        let transport = SmtpTransport::relay(&self.config.host)
            .map_err(|e| format!("SMTP relay error: {e}"))?
            .port(self.config.port)
            .credentials(creds)
            .build();

        let email = Email::builder()
            .from(
                self.config
                    .from_address
                    .parse()
                    .map_err(|e| format!("Invalid from address: {e}"))?,
            )
            .to(entry
                .lead_email
                .parse()
                .map_err(|e| format!("Invalid recipient address: {e}"))?)
            .subject(extract_subject(&entry.content))
            .body(entry.content.clone())
            .map_err(|e| format!("Failed to build email: {e}"))?;

        transport
            .send(&email)
            .map_err(|e| format!("SMTP send failed: {e}"))?;

        Ok(())
    }
}

/// Pull a subject line out of the message content: the first non-empty
/// line, with any `Subject:` prefix stripped, capped at 100 characters.
fn extract_subject(content: &str) -> String {
    let first_line = content
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("");

    let mut subject = first_line;
    for prefix in ["Subject:", "subject:", "SUBJECT:"] {
        if let Some(rest) = subject.strip_prefix(prefix) {
            subject = rest.trim();
            break;
        }
    }

    if subject.is_empty() {
        return "Hello from our team".into();
    }
    subject.chars().take(100).collect()
}

#[async_trait]
impl Sender for SmtpSender {
    async fn send(&self, entry: &QueueEntry) -> bool {
        match entry.channel {
            Channel::Email => match self.send_email(entry) {
                Ok(()) => {
                    info!(
                        message_id = %entry.message_id,
                        to = %entry.lead_email,
                        lead = %entry.lead_name,
                        "Email sent"
                    );
                    true
                }
                Err(e) => {
                    error!(message_id = %entry.message_id, error = %e, "Email delivery failed");
                    false
                }
            },
            Channel::Linkedin => {
                warn!(
                    message_id = %entry.message_id,
                    lead = %entry.lead_name,
                    "LinkedIn delivery is manual, saving to storage"
                );
                self.storage.save(entry, "MANUAL_ACTION_REQUIRED").await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subject_is_first_line() {
        assert_eq!(extract_subject("Quick question\n\nHi Ada,"), "Quick question");
    }

    #[test]
    fn subject_prefix_is_stripped() {
        assert_eq!(extract_subject("Subject: Quick question\nHi"), "Quick question");
        assert_eq!(extract_subject("SUBJECT: Loud one\nHi"), "Loud one");
    }

    #[test]
    fn subject_is_capped_at_100_chars() {
        let long = "x".repeat(300);
        assert_eq!(extract_subject(&long).chars().count(), 100);
    }

    #[test]
    fn empty_content_falls_back() {
        assert_eq!(extract_subject(""), "Hello from our team");
        assert_eq!(extract_subject("Subject:\nbody"), "Hello from our team");
    }

    #[tokio::test]
    async fn linkedin_entries_go_to_storage() {
        let dir = tempfile::tempdir().unwrap();
        let config = SmtpConfig {
            host: "smtp.invalid".into(),
            port: 587,
            username: String::new(),
            password: String::new(),
            from_address: "out@leadflow.test".into(),
        };
        let sender = SmtpSender::new(config, dir.path());

        let entry = QueueEntry {
            message_id: uuid::Uuid::new_v4(),
            lead_id: uuid::Uuid::new_v4(),
            channel: Channel::Linkedin,
            variant: "B".into(),
            content: "Hi Ada, saw your talk".into(),
            retry_count: 0,
            lead_name: "Ada Smith".into(),
            lead_email: "ada@initech.com".into(),
            company: "Initech".into(),
            role: "CTO".into(),
        };

        assert!(sender.send(&entry).await);
        let files: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(files.len(), 1);
    }
}
