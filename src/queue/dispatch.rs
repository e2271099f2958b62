//! Rate-limited dispatch loop.
//!
//! Drains a `DeliveryQueue` through the sender port at a fixed cadence:
//! the loop sleeps the full inter-item delay after every item regardless
//! of how long the send took, so true throughput never exceeds the
//! configured rate. Not a token bucket — there are no bursts.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::PipelineConfig;
use crate::model::{LeadStatus, MessageStatus};
use crate::queue::DeliveryQueue;
use crate::sender::Sender;
use crate::store::Store;

/// Aggregate result of one dispatch run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DispatchOutcome {
    pub sent: u64,
    pub failed: u64,
    /// Wall-clock duration of the run.
    #[serde(with = "duration_secs")]
    pub elapsed: Duration,
    /// Successful dispatches per minute actually achieved.
    pub achieved_rate: f64,
}

mod duration_secs {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }
}

/// Single logical worker draining one queue through one sender.
pub struct Dispatcher {
    store: Arc<dyn Store>,
    sender: Arc<dyn Sender>,
    max_per_minute: u32,
    max_retries: u32,
    refill_threshold: usize,
    shutdown: Arc<AtomicBool>,
}

impl Dispatcher {
    pub fn new(store: Arc<dyn Store>, sender: Arc<dyn Sender>, config: &PipelineConfig) -> Self {
        Self {
            store,
            sender,
            max_per_minute: config.max_per_minute.max(1),
            max_retries: config.max_retries,
            refill_threshold: config.refill_threshold,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Handle for requesting a stop. The loop checks it between items; a
    /// long-running dispatch stops at the next item boundary.
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Drain the queue at the configured cadence.
    ///
    /// In live mode a successful dispatch records Sent and the lead's
    /// first success this run advances the lead to Sent. In dry-run mode
    /// no status advances to Sent — the row stays Approved so nothing is
    /// lost — and auto-refill is disabled, since unflipped statuses would
    /// make the same rows eligible forever. Failures are recorded (and
    /// increment the retry count) in both modes. Persistence errors are
    /// isolated per item: logged, never propagated, the loop continues.
    pub async fn process(&self, queue: &mut DeliveryQueue, dry_run: bool) -> DispatchOutcome {
        let delay = Duration::from_secs_f64(60.0 / f64::from(self.max_per_minute));
        let start = tokio::time::Instant::now();

        let mut sent: u64 = 0;
        let mut failed: u64 = 0;
        // Leads already advanced this run; keeps the Sent transition
        // idempotent across multiple successes for one lead.
        let mut advanced: HashSet<Uuid> = HashSet::new();

        queue.set_processing(true);
        info!(
            rate = self.max_per_minute,
            delay_secs = delay.as_secs_f64(),
            dry_run,
            "Dispatch started"
        );

        loop {
            if self.shutdown.load(Ordering::Relaxed) {
                info!("Shutdown requested, stopping dispatch");
                break;
            }

            if !dry_run {
                if let Err(e) = queue.auto_refill(self.refill_threshold).await {
                    warn!(error = %e, "Auto-refill failed, continuing with current queue");
                }
            }

            let Some(entry) = queue.get_next() else {
                break;
            };

            if entry.retry_count >= self.max_retries {
                debug!(
                    message_id = %entry.message_id,
                    retry_count = entry.retry_count,
                    "Retry budget exhausted, leaving for manual intervention"
                );
                continue;
            }

            let success = self.sender.send(&entry).await;

            if success {
                sent += 1;
                queue.record_sent();
                if dry_run {
                    info!(
                        message_id = %entry.message_id,
                        channel = %entry.channel,
                        lead = %entry.lead_name,
                        "[dry run] delivery recorded, status left untouched"
                    );
                } else {
                    if let Err(e) = self
                        .store
                        .update_message_status(entry.message_id, MessageStatus::Sent, None)
                        .await
                    {
                        warn!(message_id = %entry.message_id, error = %e, "Failed to record sent status");
                    }
                    if advanced.insert(entry.lead_id) {
                        if let Err(e) = self
                            .store
                            .update_lead_status(entry.lead_id, LeadStatus::Sent)
                            .await
                        {
                            warn!(lead_id = %entry.lead_id, error = %e, "Failed to advance lead status");
                        }
                    }
                }
            } else {
                failed += 1;
                queue.record_failed();
                if let Err(e) = self
                    .store
                    .update_message_status(entry.message_id, MessageStatus::Failed, Some("delivery failed"))
                    .await
                {
                    warn!(message_id = %entry.message_id, error = %e, "Failed to record failure");
                }
            }

            tokio::time::sleep(delay).await;
        }

        queue.set_processing(false);

        let elapsed = start.elapsed();
        let secs = elapsed.as_secs_f64();
        let achieved_rate = if secs > 0.0 {
            sent as f64 / secs * 60.0
        } else {
            0.0
        };

        info!(sent, failed, elapsed_secs = secs, achieved_rate, "Dispatch complete");

        DispatchOutcome {
            sent,
            failed,
            elapsed,
            achieved_rate,
        }
    }
}
