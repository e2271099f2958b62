//! Status state machine.
//!
//! Pure decision logic: maps a (lead status, message status) pair to the
//! next pipeline action and its parameters. Drives orchestration but never
//! performs I/O itself.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::{PipelineConfig, PipelineVariant};
use crate::model::{LeadStatus, MessageStatus};

/// Next pipeline action, with its parameters.
///
/// Message-level rules take priority over lead-level rules: a lead
/// mid-messaging must finish that message cycle before advancing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    /// Source new leads into the pipeline.
    GenerateLeads,
    /// Run another enrichment pass.
    Enrich,
    /// Produce message variants for enriched leads.
    GenerateMessages,
    /// Review pending variants for approval.
    Review { auto_approve: bool },
    /// Dispatch approved messages through the delivery queue.
    Send { use_queue: bool, batch_size: usize },
    /// Re-dispatch failed messages within the retry budget.
    Retry { max_retries: u32 },
    /// Terminal — nothing further for this entity.
    Complete,
    /// Watch for replies and engagement.
    TrackResponses,
    /// Failed lead: retry or hand off for escalation.
    RetryOrEscalate,
    /// Status outside the decision tables. Reportable, never fatal.
    Error { status: String },
}

impl Action {
    /// Short label for logging and grouping.
    pub fn label(&self) -> &'static str {
        match self {
            Self::GenerateLeads => "generate_leads",
            Self::Enrich => "enrich",
            Self::GenerateMessages => "generate_messages",
            Self::Review { .. } => "review",
            Self::Send { .. } => "send",
            Self::Retry { .. } => "retry",
            Self::Complete => "complete",
            Self::TrackResponses => "track_responses",
            Self::RetryOrEscalate => "retry_or_escalate",
            Self::Error { .. } => "error",
        }
    }
}

/// A decision: the action, the operation that performs it, and a
/// human-readable description.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Decision {
    #[serde(flatten)]
    pub action: Action,
    /// Name of the pipeline operation that carries the action out.
    /// `None` for terminal and error decisions.
    pub operation: Option<&'static str>,
    pub description: &'static str,
}

/// One entity's statuses, as input to `batch_decide`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchItem {
    pub lead_id: Uuid,
    pub lead_status: LeadStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_status: Option<MessageStatus>,
}

/// Items grouped under the decision they share.
#[derive(Debug, Clone)]
pub struct ActionGroup {
    pub decision: Decision,
    pub items: Vec<BatchItem>,
}

/// Decision engine. Holds the configured parameters the decision tables
/// embed (batch size, retry budget, stage routing); no other state.
#[derive(Debug, Clone)]
pub struct DecisionEngine {
    batch_size: usize,
    max_retries: u32,
    variant: PipelineVariant,
}

impl DecisionEngine {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            batch_size: config.batch_size,
            max_retries: config.max_retries,
            variant: config.variant,
        }
    }

    /// Determine the next action for one entity.
    ///
    /// Total over both status domains; statuses outside the tables come
    /// back as `Action::Error` carrying the offending status string.
    pub fn decide(&self, lead_status: LeadStatus, message_status: Option<MessageStatus>) -> Decision {
        // Message-level rules take priority when a message status is present.
        if let Some(status) = message_status {
            return match status {
                MessageStatus::Pending => Decision {
                    action: Action::Review {
                        auto_approve: false,
                    },
                    operation: Some("review_messages"),
                    description: "Review pending messages",
                },
                MessageStatus::Approved => Decision {
                    action: Action::Send {
                        use_queue: true,
                        batch_size: self.batch_size,
                    },
                    operation: Some("send_messages"),
                    description: "Send approved messages via queue",
                },
                MessageStatus::Failed => Decision {
                    action: Action::Retry {
                        max_retries: self.max_retries,
                    },
                    operation: Some("retry_failed"),
                    description: "Retry failed messages",
                },
                // Sent and Rejected are terminal variants of the message
                // lifecycle; neither schedules further work.
                MessageStatus::Sent | MessageStatus::Rejected => Decision {
                    action: Action::Complete,
                    operation: None,
                    description: "Message delivery complete",
                },
            };
        }

        // Lead-level rules.
        match lead_status {
            LeadStatus::New => Decision {
                action: Action::GenerateLeads,
                operation: Some("generate_leads"),
                description: "Generate new leads",
            },
            LeadStatus::Enriched => match self.variant {
                PipelineVariant::EnrichFirst => Decision {
                    action: Action::Enrich,
                    operation: Some("enrich_leads"),
                    description: "Enrich lead data",
                },
                PipelineVariant::MessageDirect => Decision {
                    action: Action::GenerateMessages,
                    operation: Some("generate_messages"),
                    description: "Generate message variants per lead",
                },
            },
            LeadStatus::Messaged => Decision {
                action: Action::Review {
                    auto_approve: false,
                },
                operation: Some("review_messages"),
                description: "Review messages for quality and compliance",
            },
            LeadStatus::Sent => Decision {
                action: Action::TrackResponses,
                operation: Some("track_responses"),
                description: "Monitor for replies and engagement",
            },
            LeadStatus::Failed => Decision {
                action: Action::RetryOrEscalate,
                operation: Some("retry_or_escalate"),
                description: "Retry failed messages or escalate",
            },
            // Hard-stop statuses have no row in the table.
            other => Decision {
                action: Action::Error {
                    status: other.to_string(),
                },
                operation: None,
                description: "Status outside decision tables",
            },
        }
    }

    /// Decide actions for a batch of entities, grouped by resulting action.
    ///
    /// Pure, no I/O. Group order is the insertion order of the first
    /// occurrence of each action.
    pub fn batch_decide(&self, items: &[BatchItem]) -> Vec<ActionGroup> {
        let mut groups: Vec<ActionGroup> = Vec::new();

        for item in items {
            let decision = self.decide(item.lead_status, item.message_status);
            match groups
                .iter_mut()
                .find(|g| g.decision.action.label() == decision.action.label())
            {
                Some(group) => group.items.push(item.clone()),
                None => groups.push(ActionGroup {
                    decision,
                    items: vec![item.clone()],
                }),
            }
        }

        groups
    }

    /// Whether processing should continue for an entity.
    ///
    /// Halts on success (lead and message both Sent), on retry-budget
    /// exhaustion, and on hard-stop lead statuses. The budget is the
    /// engine's configured `max_retries` — the same threshold the dispatch
    /// loop enforces.
    pub fn should_proceed(
        &self,
        lead_status: LeadStatus,
        message_status: Option<MessageStatus>,
        retry_count: u32,
    ) -> bool {
        if lead_status == LeadStatus::Sent && message_status == Some(MessageStatus::Sent) {
            return false;
        }
        if message_status == Some(MessageStatus::Failed) && retry_count >= self.max_retries {
            return false;
        }
        if lead_status.is_hard_stop() {
            return false;
        }
        true
    }

    /// Processing priority for a lead. Higher is more urgent.
    ///
    /// Per-stage base weight plus a confidence boost; used only for
    /// ordering batches, not for correctness.
    pub fn priority(lead_status: LeadStatus, confidence_score: i64) -> i64 {
        let stage_base = match lead_status {
            LeadStatus::New => 100,
            LeadStatus::Enriched => 80,
            LeadStatus::Messaged => 70,
            LeadStatus::Failed => 50,
            LeadStatus::Sent => 10,
            LeadStatus::Invalid | LeadStatus::Blocked | LeadStatus::Unsubscribed => 0,
        };
        stage_base + confidence_score / 10
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> DecisionEngine {
        DecisionEngine::new(&PipelineConfig::default())
    }

    const ALL_LEAD: [LeadStatus; 8] = [
        LeadStatus::New,
        LeadStatus::Enriched,
        LeadStatus::Messaged,
        LeadStatus::Sent,
        LeadStatus::Failed,
        LeadStatus::Invalid,
        LeadStatus::Blocked,
        LeadStatus::Unsubscribed,
    ];

    const ALL_MESSAGE: [MessageStatus; 5] = [
        MessageStatus::Pending,
        MessageStatus::Approved,
        MessageStatus::Rejected,
        MessageStatus::Sent,
        MessageStatus::Failed,
    ];

    #[test]
    fn decide_is_total() {
        let engine = engine();
        for lead in ALL_LEAD {
            engine.decide(lead, None);
            for message in ALL_MESSAGE {
                engine.decide(lead, Some(message));
            }
        }
    }

    #[test]
    fn message_rules_override_lead_rules() {
        let engine = engine();
        // Lead says "generate", message says "review" — message wins.
        let decision = engine.decide(LeadStatus::New, Some(MessageStatus::Pending));
        assert_eq!(
            decision.action,
            Action::Review {
                auto_approve: false
            }
        );
        // Even a hard-stop lead defers to a present message status.
        let decision = engine.decide(LeadStatus::Blocked, Some(MessageStatus::Sent));
        assert_eq!(decision.action, Action::Complete);
    }

    #[test]
    fn message_table_rows() {
        let engine = engine();

        let d = engine.decide(LeadStatus::Messaged, Some(MessageStatus::Pending));
        assert_eq!(
            d.action,
            Action::Review {
                auto_approve: false
            }
        );
        assert_eq!(d.operation, Some("review_messages"));

        let d = engine.decide(LeadStatus::Messaged, Some(MessageStatus::Approved));
        assert_eq!(
            d.action,
            Action::Send {
                use_queue: true,
                batch_size: 50
            }
        );

        let d = engine.decide(LeadStatus::Messaged, Some(MessageStatus::Failed));
        assert_eq!(d.action, Action::Retry { max_retries: 2 });

        let d = engine.decide(LeadStatus::Sent, Some(MessageStatus::Sent));
        assert_eq!(d.action, Action::Complete);
        assert_eq!(d.operation, None);
    }

    #[test]
    fn lead_table_rows() {
        let engine = engine();
        assert_eq!(
            engine.decide(LeadStatus::New, None).action,
            Action::GenerateLeads
        );
        assert_eq!(
            engine.decide(LeadStatus::Enriched, None).action,
            Action::GenerateMessages
        );
        assert_eq!(
            engine.decide(LeadStatus::Messaged, None).action,
            Action::Review {
                auto_approve: false
            }
        );
        assert_eq!(
            engine.decide(LeadStatus::Sent, None).action,
            Action::TrackResponses
        );
        assert_eq!(
            engine.decide(LeadStatus::Failed, None).action,
            Action::RetryOrEscalate
        );
    }

    #[test]
    fn enriched_routing_follows_variant() {
        let mut config = PipelineConfig::default();
        config.variant = PipelineVariant::EnrichFirst;
        let engine = DecisionEngine::new(&config);
        assert_eq!(engine.decide(LeadStatus::Enriched, None).action, Action::Enrich);
    }

    #[test]
    fn hard_stop_statuses_yield_error_action() {
        let engine = engine();
        for status in [
            LeadStatus::Invalid,
            LeadStatus::Blocked,
            LeadStatus::Unsubscribed,
        ] {
            let decision = engine.decide(status, None);
            match decision.action {
                Action::Error { status: s } => assert_eq!(s, status.to_string()),
                other => panic!("Expected Error for {status}, got {other:?}"),
            }
        }
    }

    #[test]
    fn should_proceed_literals() {
        let engine = engine();
        // Success terminal.
        assert!(!engine.should_proceed(LeadStatus::Sent, Some(MessageStatus::Sent), 0));
        // Fresh lead with default retry settings.
        assert!(engine.should_proceed(LeadStatus::New, None, 0));
    }

    #[test]
    fn should_proceed_retry_budget() {
        let engine = engine(); // max_retries = 2
        assert!(engine.should_proceed(LeadStatus::Messaged, Some(MessageStatus::Failed), 1));
        assert!(!engine.should_proceed(LeadStatus::Messaged, Some(MessageStatus::Failed), 2));
        assert!(!engine.should_proceed(LeadStatus::Messaged, Some(MessageStatus::Failed), 3));
    }

    #[test]
    fn should_proceed_hard_stops() {
        let engine = engine();
        assert!(!engine.should_proceed(LeadStatus::Invalid, None, 0));
        assert!(!engine.should_proceed(LeadStatus::Blocked, None, 0));
        assert!(!engine.should_proceed(LeadStatus::Unsubscribed, None, 0));
    }

    #[test]
    fn priority_is_stage_base_plus_confidence_tenth() {
        assert_eq!(DecisionEngine::priority(LeadStatus::Enriched, 80), 88);
        assert_eq!(DecisionEngine::priority(LeadStatus::New, 0), 100);
        assert_eq!(DecisionEngine::priority(LeadStatus::Sent, 99), 19);
        assert_eq!(DecisionEngine::priority(LeadStatus::Blocked, 100), 10);
    }

    #[test]
    fn batch_decide_groups_in_first_occurrence_order() {
        let engine = engine();
        let item = |lead, message| BatchItem {
            lead_id: Uuid::new_v4(),
            lead_status: lead,
            message_status: message,
        };

        let items = vec![
            item(LeadStatus::Messaged, Some(MessageStatus::Pending)),
            item(LeadStatus::Messaged, Some(MessageStatus::Approved)),
            item(LeadStatus::Enriched, None),
            item(LeadStatus::Messaged, Some(MessageStatus::Pending)),
        ];

        let groups = engine.batch_decide(&items);
        let labels: Vec<_> = groups.iter().map(|g| g.decision.action.label()).collect();
        assert_eq!(labels, vec!["review", "send", "generate_messages"]);
        assert_eq!(groups[0].items.len(), 2);
        assert_eq!(groups[1].items.len(), 1);
    }

    #[test]
    fn batch_decide_is_empty_for_empty_input() {
        assert!(engine().batch_decide(&[]).is_empty());
    }

    #[test]
    fn decision_serializes_with_action_tag() {
        let engine = engine();
        let decision = engine.decide(LeadStatus::Messaged, Some(MessageStatus::Approved));
        let json = serde_json::to_value(&decision).unwrap();
        assert_eq!(json["action"], "send");
        assert_eq!(json["use_queue"], true);
        assert_eq!(json["batch_size"], 50);
        assert_eq!(json["operation"], "send_messages");
    }
}
