//! Closed status enumerations.
//!
//! These replace the reference's free-form status strings. External data is
//! validated once, where rows enter the core (`FromStr` in the store row
//! mapping); past that boundary an invalid status cannot exist.

use serde::{Deserialize, Serialize};

/// Pipeline stage of a lead.
///
/// Advances New → Enriched → Messaged → Sent, or sideways into Failed.
/// Invalid, Blocked, and Unsubscribed are hard stops: the lead must not be
/// contacted and the pipeline never schedules work for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LeadStatus {
    New,
    Enriched,
    Messaged,
    Sent,
    Failed,
    Invalid,
    Blocked,
    Unsubscribed,
}

impl LeadStatus {
    /// The do-not-contact set.
    pub fn is_hard_stop(self) -> bool {
        matches!(self, Self::Invalid | Self::Blocked | Self::Unsubscribed)
    }
}

impl std::fmt::Display for LeadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::New => "NEW",
            Self::Enriched => "ENRICHED",
            Self::Messaged => "MESSAGED",
            Self::Sent => "SENT",
            Self::Failed => "FAILED",
            Self::Invalid => "INVALID",
            Self::Blocked => "BLOCKED",
            Self::Unsubscribed => "UNSUBSCRIBED",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for LeadStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NEW" => Ok(Self::New),
            "ENRICHED" => Ok(Self::Enriched),
            "MESSAGED" => Ok(Self::Messaged),
            "SENT" => Ok(Self::Sent),
            "FAILED" => Ok(Self::Failed),
            "INVALID" => Ok(Self::Invalid),
            "BLOCKED" => Ok(Self::Blocked),
            "UNSUBSCRIBED" => Ok(Self::Unsubscribed),
            _ => Err(format!("Unknown lead status: {s}")),
        }
    }
}

/// Lifecycle of a single message variant.
///
/// Pending → {Approved | Rejected} via review, Approved → {Sent | Failed}
/// via dispatch. Sent and Rejected are terminal. Failed stays Failed on
/// retry; only `retry_count` moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageStatus {
    Pending,
    Approved,
    Rejected,
    Sent,
    Failed,
}

impl MessageStatus {
    /// Terminal statuses are never re-enqueued.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Sent | Self::Rejected)
    }
}

impl std::fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "PENDING",
            Self::Approved => "APPROVED",
            Self::Rejected => "REJECTED",
            Self::Sent => "SENT",
            Self::Failed => "FAILED",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for MessageStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "APPROVED" => Ok(Self::Approved),
            "REJECTED" => Ok(Self::Rejected),
            "SENT" => Ok(Self::Sent),
            "FAILED" => Ok(Self::Failed),
            _ => Err(format!("Unknown message status: {s}")),
        }
    }
}

/// Outreach channel a message variant targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Email,
    Linkedin,
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Email => write!(f, "email"),
            Self::Linkedin => write!(f, "linkedin"),
        }
    }
}

impl std::str::FromStr for Channel {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "email" => Ok(Self::Email),
            "linkedin" => Ok(Self::Linkedin),
            _ => Err(format!("Unknown channel: {s}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lead_status_display_and_fromstr() {
        assert_eq!(LeadStatus::Enriched.to_string(), "ENRICHED");
        assert_eq!("NEW".parse::<LeadStatus>().unwrap(), LeadStatus::New);
        assert!("new".parse::<LeadStatus>().is_err());
        assert!("GENERATED".parse::<LeadStatus>().is_err());
    }

    #[test]
    fn message_status_display_and_fromstr() {
        assert_eq!(MessageStatus::Approved.to_string(), "APPROVED");
        assert_eq!(
            "REJECTED".parse::<MessageStatus>().unwrap(),
            MessageStatus::Rejected
        );
        assert!("unknown".parse::<MessageStatus>().is_err());
    }

    #[test]
    fn channel_display_and_fromstr() {
        assert_eq!(Channel::Linkedin.to_string(), "linkedin");
        assert_eq!("email".parse::<Channel>().unwrap(), Channel::Email);
        assert!("sms".parse::<Channel>().is_err());
    }

    #[test]
    fn hard_stop_set() {
        assert!(LeadStatus::Blocked.is_hard_stop());
        assert!(LeadStatus::Invalid.is_hard_stop());
        assert!(LeadStatus::Unsubscribed.is_hard_stop());
        assert!(!LeadStatus::Failed.is_hard_stop());
    }

    #[test]
    fn terminal_message_statuses() {
        assert!(MessageStatus::Sent.is_terminal());
        assert!(MessageStatus::Rejected.is_terminal());
        assert!(!MessageStatus::Failed.is_terminal());
    }

    #[test]
    fn status_serde_uses_db_form() {
        let json = serde_json::to_string(&LeadStatus::Unsubscribed).unwrap();
        assert_eq!(json, "\"UNSUBSCRIBED\"");
        let json = serde_json::to_string(&MessageStatus::Pending).unwrap();
        assert_eq!(json, "\"PENDING\"");
        let json = serde_json::to_string(&Channel::Email).unwrap();
        assert_eq!(json, "\"email\"");
    }
}
