//! Message review — variant selection.
//!
//! Every (lead, channel) group of pending variants gets exactly one
//! Approved message; the siblings become Rejected. Which variant wins is
//! random — A/B arms stay unbiased.

use std::collections::HashMap;
use std::sync::Arc;

use rand::Rng;
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::Result;
use crate::model::{Channel, MessageStatus};
use crate::store::Store;

/// Aggregate result of one review pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReviewOutcome {
    pub reviewed: usize,
    pub approved: usize,
    pub rejected: usize,
}

/// Reviews pending message variants.
pub struct Reviewer {
    store: Arc<dyn Store>,
}

impl Reviewer {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Review all pending messages.
    ///
    /// With `auto_approve` every pending message is approved without
    /// selection; otherwise one variant per (lead, channel) group wins.
    pub async fn review_pending(&self, auto_approve: bool) -> Result<ReviewOutcome> {
        let pending = self.store.pending_messages().await?;
        let reviewed = pending.len();

        // Decide all verdicts up front; the RNG does not live across awaits.
        let verdicts: Vec<(Uuid, MessageStatus)> = if auto_approve {
            pending
                .iter()
                .map(|m| (m.id, MessageStatus::Approved))
                .collect()
        } else {
            let mut groups: HashMap<(Uuid, Channel), Vec<Uuid>> = HashMap::new();
            for msg in &pending {
                groups
                    .entry((msg.lead_id, msg.channel))
                    .or_default()
                    .push(msg.id);
            }

            let mut rng = rand::thread_rng();
            let mut verdicts = Vec::with_capacity(reviewed);
            for ((lead_id, channel), variants) in groups {
                let winner = variants[rng.gen_range(0..variants.len())];
                debug!(lead_id = %lead_id, channel = %channel, winner = %winner, "Variant selected");
                for id in variants {
                    let status = if id == winner {
                        MessageStatus::Approved
                    } else {
                        MessageStatus::Rejected
                    };
                    verdicts.push((id, status));
                }
            }
            verdicts
        };

        let mut approved = 0;
        let mut rejected = 0;
        for (id, status) in verdicts {
            self.store.update_message_status(id, status, None).await?;
            match status {
                MessageStatus::Approved => approved += 1,
                _ => rejected += 1,
            }
        }

        info!(reviewed, approved, rejected, auto_approve, "Review complete");
        Ok(ReviewOutcome {
            reviewed,
            approved,
            rejected,
        })
    }
}
