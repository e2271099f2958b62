//! Lead record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::status::LeadStatus;

/// A prospective contact progressing through the pipeline.
///
/// Owned by the pipeline; mutated only through defined status transitions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lead {
    /// Unique lead ID.
    pub id: Uuid,
    pub full_name: String,
    pub company_name: String,
    pub role: String,
    /// Contact address for the email channel.
    pub email: String,
    /// Contact address for the linkedin channel.
    pub linkedin_url: String,
    /// Current pipeline stage.
    pub status: LeadStatus,
    /// Enrichment confidence (0–100). Absent until enrichment runs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence_score: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Lead {
    /// Create a new lead at the start of the pipeline.
    pub fn new(
        full_name: impl Into<String>,
        company_name: impl Into<String>,
        role: impl Into<String>,
        email: impl Into<String>,
        linkedin_url: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            full_name: full_name.into(),
            company_name: company_name.into(),
            role: role.into(),
            email: email.into(),
            linkedin_url: linkedin_url.into(),
            status: LeadStatus::New,
            confidence_score: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Set the status (builder style, for seeding and tests).
    pub fn with_status(mut self, status: LeadStatus) -> Self {
        self.status = status;
        self
    }

    /// Set the confidence score.
    pub fn with_confidence(mut self, score: i64) -> Self {
        self.confidence_score = Some(score);
        self
    }
}
