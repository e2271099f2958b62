//! libSQL backend — async `Store` implementation.
//!
//! Supports local file and in-memory databases. Timestamps are stored as
//! RFC 3339 text; status strings are validated here, at the boundary, so
//! invalid values never reach the core.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::debug;
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::model::{Channel, Lead, LeadStatus, Message, MessageStatus, QueueEntry};
use crate::pipeline::BatchItem;
use crate::store::migrations;
use crate::store::traits::Store;

/// libSQL store backend.
///
/// Holds a single connection reused for all operations;
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Connection(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Connection(format!("Failed to open database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Connection(format!("Failed to create connection: {e}")))?;

        migrations::run(&conn).await?;
        tracing::info!(path = %path.display(), "Database opened");

        Ok(Self {
            db: Arc::new(db),
            conn,
        })
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Connection(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Connection(format!("Failed to create connection: {e}")))?;

        migrations::run(&conn).await?;

        Ok(Self {
            db: Arc::new(db),
            conn,
        })
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, DatabaseError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DatabaseError::InvalidRow(format!("bad timestamp {s:?}: {e}")))
}

fn parse_uuid(s: &str) -> Result<Uuid, DatabaseError> {
    Uuid::parse_str(s).map_err(|e| DatabaseError::InvalidRow(format!("bad uuid {s:?}: {e}")))
}

fn parse_status<T: std::str::FromStr<Err = String>>(s: &str) -> Result<T, DatabaseError> {
    s.parse().map_err(DatabaseError::InvalidRow)
}

/// Convert `Option<String>` to a libsql value (Null when absent).
fn opt_text(s: Option<String>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s),
        None => libsql::Value::Null,
    }
}

fn opt_int(i: Option<i64>) -> libsql::Value {
    match i {
        Some(i) => libsql::Value::Integer(i),
        None => libsql::Value::Null,
    }
}

const LEAD_COLUMNS: &str = "id, full_name, company_name, role, email, linkedin_url, \
     status, confidence_score, created_at, updated_at";

fn row_to_lead(row: &libsql::Row) -> Result<Lead, DatabaseError> {
    let get_text = |i| -> Result<String, DatabaseError> {
        row.get::<String>(i)
            .map_err(|e| DatabaseError::InvalidRow(format!("lead column {i}: {e}")))
    };

    Ok(Lead {
        id: parse_uuid(&get_text(0)?)?,
        full_name: get_text(1)?,
        company_name: get_text(2)?,
        role: get_text(3)?,
        email: get_text(4)?,
        linkedin_url: get_text(5)?,
        status: parse_status::<LeadStatus>(&get_text(6)?)?,
        confidence_score: row.get::<i64>(7).ok(),
        created_at: parse_datetime(&get_text(8)?)?,
        updated_at: parse_datetime(&get_text(9)?)?,
    })
}

const MESSAGE_COLUMNS: &str =
    "id, lead_id, channel, variant, content, status, retry_count, error_message, sent_at, created_at";

fn row_to_message(row: &libsql::Row) -> Result<Message, DatabaseError> {
    let get_text = |i| -> Result<String, DatabaseError> {
        row.get::<String>(i)
            .map_err(|e| DatabaseError::InvalidRow(format!("message column {i}: {e}")))
    };

    let sent_at = match row.get::<String>(8).ok() {
        Some(s) => Some(parse_datetime(&s)?),
        None => None,
    };

    Ok(Message {
        id: parse_uuid(&get_text(0)?)?,
        lead_id: parse_uuid(&get_text(1)?)?,
        channel: parse_status::<Channel>(&get_text(2)?)?,
        variant: get_text(3)?,
        content: get_text(4)?,
        status: parse_status::<MessageStatus>(&get_text(5)?)?,
        retry_count: row.get::<i64>(6).unwrap_or(0) as u32,
        error_message: row.get::<String>(7).ok(),
        sent_at,
        created_at: parse_datetime(&get_text(9)?)?,
    })
}

fn row_to_entry(row: &libsql::Row) -> Result<QueueEntry, DatabaseError> {
    let get_text = |i| -> Result<String, DatabaseError> {
        row.get::<String>(i)
            .map_err(|e| DatabaseError::InvalidRow(format!("entry column {i}: {e}")))
    };

    Ok(QueueEntry {
        message_id: parse_uuid(&get_text(0)?)?,
        lead_id: parse_uuid(&get_text(1)?)?,
        channel: parse_status::<Channel>(&get_text(2)?)?,
        variant: get_text(3)?,
        content: get_text(4)?,
        retry_count: row.get::<i64>(5).unwrap_or(0) as u32,
        lead_name: get_text(6)?,
        lead_email: get_text(7)?,
        company: get_text(8)?,
        role: get_text(9)?,
    })
}

// ── Store impl ──────────────────────────────────────────────────────

#[async_trait]
impl Store for LibSqlBackend {
    async fn insert_lead(&self, lead: &Lead) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO leads (id, full_name, company_name, role, email, linkedin_url,
                    status, confidence_score, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    lead.id.to_string(),
                    lead.full_name.clone(),
                    lead.company_name.clone(),
                    lead.role.clone(),
                    lead.email.clone(),
                    lead.linkedin_url.clone(),
                    lead.status.to_string(),
                    opt_int(lead.confidence_score),
                    lead.created_at.to_rfc3339(),
                    lead.updated_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_lead: {e}")))?;

        debug!(id = %lead.id, "Lead inserted");
        Ok(())
    }

    async fn insert_message(&self, message: &Message) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO messages (id, lead_id, channel, variant, content, status,
                    retry_count, error_message, sent_at, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    message.id.to_string(),
                    message.lead_id.to_string(),
                    message.channel.to_string(),
                    message.variant.clone(),
                    message.content.clone(),
                    message.status.to_string(),
                    message.retry_count as i64,
                    opt_text(message.error_message.clone()),
                    opt_text(message.sent_at.map(|dt| dt.to_rfc3339())),
                    message.created_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_message: {e}")))?;

        debug!(id = %message.id, lead_id = %message.lead_id, "Message inserted");
        Ok(())
    }

    async fn get_lead(&self, id: Uuid) -> Result<Option<Lead>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {LEAD_COLUMNS} FROM leads WHERE id = ?1"),
                params![id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_lead: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_lead(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_lead: {e}"))),
        }
    }

    async fn get_message(&self, id: Uuid) -> Result<Option<Message>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1"),
                params![id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_message: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_message(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_message: {e}"))),
        }
    }

    async fn fetch_eligible(
        &self,
        status: MessageStatus,
        channel: Option<Channel>,
        limit: usize,
    ) -> Result<Vec<QueueEntry>, DatabaseError> {
        const ENTRY_SELECT: &str = "SELECT m.id, m.lead_id, m.channel, m.variant, m.content,
                m.retry_count, l.full_name, l.email, l.company_name, l.role
             FROM messages m
             JOIN leads l ON m.lead_id = l.id
             WHERE m.status = ?1";

        let mut rows = match channel {
            Some(channel) => self
                .conn()
                .query(
                    &format!("{ENTRY_SELECT} AND m.channel = ?2 ORDER BY m.created_at ASC LIMIT ?3"),
                    params![status.to_string(), channel.to_string(), limit as i64],
                )
                .await,
            None => self
                .conn()
                .query(
                    &format!("{ENTRY_SELECT} ORDER BY m.created_at ASC LIMIT ?2"),
                    params![status.to_string(), limit as i64],
                )
                .await,
        }
        .map_err(|e| DatabaseError::Query(format!("fetch_eligible: {e}")))?;

        let mut entries = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            entries.push(row_to_entry(&row)?);
        }
        Ok(entries)
    }

    async fn pending_messages(&self) -> Result<Vec<Message>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {MESSAGE_COLUMNS} FROM messages
                     WHERE status = 'PENDING' ORDER BY created_at ASC"
                ),
                (),
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("pending_messages: {e}")))?;

        let mut messages = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            messages.push(row_to_message(&row)?);
        }
        Ok(messages)
    }

    async fn update_message_status(
        &self,
        id: Uuid,
        status: MessageStatus,
        error: Option<&str>,
    ) -> Result<(), DatabaseError> {
        let affected = match error {
            Some(error) => self
                .conn()
                .execute(
                    "UPDATE messages
                     SET status = ?1, error_message = ?2, retry_count = retry_count + 1
                     WHERE id = ?3",
                    params![status.to_string(), error, id.to_string()],
                )
                .await,
            None if status == MessageStatus::Sent => self
                .conn()
                .execute(
                    "UPDATE messages SET status = ?1, sent_at = ?2 WHERE id = ?3",
                    params![status.to_string(), Utc::now().to_rfc3339(), id.to_string()],
                )
                .await,
            None => self
                .conn()
                .execute(
                    "UPDATE messages SET status = ?1 WHERE id = ?2",
                    params![status.to_string(), id.to_string()],
                )
                .await,
        }
        .map_err(|e| DatabaseError::Query(format!("update_message_status: {e}")))?;

        if affected == 0 {
            return Err(DatabaseError::NotFound {
                entity: "message".into(),
                id: id.to_string(),
            });
        }

        debug!(id = %id, status = %status, "Message status updated");
        Ok(())
    }

    async fn update_lead_status(&self, id: Uuid, status: LeadStatus) -> Result<(), DatabaseError> {
        let affected = self
            .conn()
            .execute(
                "UPDATE leads SET status = ?1, updated_at = ?2 WHERE id = ?3",
                params![status.to_string(), Utc::now().to_rfc3339(), id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("update_lead_status: {e}")))?;

        if affected == 0 {
            return Err(DatabaseError::NotFound {
                entity: "lead".into(),
                id: id.to_string(),
            });
        }

        debug!(id = %id, status = %status, "Lead status updated");
        Ok(())
    }

    async fn lead_status_counts(&self) -> Result<Vec<(LeadStatus, u64)>, DatabaseError> {
        let mut rows = self
            .conn()
            .query("SELECT status, COUNT(*) FROM leads GROUP BY status", ())
            .await
            .map_err(|e| DatabaseError::Query(format!("lead_status_counts: {e}")))?;

        let mut counts = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            let status: String = row
                .get(0)
                .map_err(|e| DatabaseError::InvalidRow(e.to_string()))?;
            let count: i64 = row.get(1).unwrap_or(0);
            counts.push((parse_status::<LeadStatus>(&status)?, count as u64));
        }
        Ok(counts)
    }

    async fn message_status_counts(&self) -> Result<Vec<(MessageStatus, u64)>, DatabaseError> {
        let mut rows = self
            .conn()
            .query("SELECT status, COUNT(*) FROM messages GROUP BY status", ())
            .await
            .map_err(|e| DatabaseError::Query(format!("message_status_counts: {e}")))?;

        let mut counts = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            let status: String = row
                .get(0)
                .map_err(|e| DatabaseError::InvalidRow(e.to_string()))?;
            let count: i64 = row.get(1).unwrap_or(0);
            counts.push((parse_status::<MessageStatus>(&status)?, count as u64));
        }
        Ok(counts)
    }

    async fn decision_batch(&self, limit: usize) -> Result<Vec<BatchItem>, DatabaseError> {
        // The subquery picks the most actionable non-rejected message per
        // lead: Pending before Approved before Failed before Sent.
        let mut rows = self
            .conn()
            .query(
                "SELECT l.id, l.status,
                    (SELECT m.status FROM messages m
                     WHERE m.lead_id = l.id AND m.status != 'REJECTED'
                     ORDER BY CASE m.status
                        WHEN 'PENDING' THEN 0
                        WHEN 'APPROVED' THEN 1
                        WHEN 'FAILED' THEN 2
                        ELSE 3 END,
                        m.created_at ASC
                     LIMIT 1)
                 FROM leads l
                 ORDER BY l.created_at ASC
                 LIMIT ?1",
                params![limit as i64],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("decision_batch: {e}")))?;

        let mut items = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            let id: String = row
                .get(0)
                .map_err(|e| DatabaseError::InvalidRow(e.to_string()))?;
            let lead_status: String = row
                .get(1)
                .map_err(|e| DatabaseError::InvalidRow(e.to_string()))?;
            let message_status = match row.get::<String>(2).ok() {
                Some(s) => Some(parse_status::<MessageStatus>(&s)?),
                None => None,
            };

            items.push(BatchItem {
                lead_id: parse_uuid(&id)?,
                lead_status: parse_status::<LeadStatus>(&lead_status)?,
                message_status,
            });
        }
        Ok(items)
    }
}
