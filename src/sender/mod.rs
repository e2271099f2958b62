//! Sender port — pluggable delivery transports.

pub mod smtp;
pub mod storage;

pub use smtp::{SmtpConfig, SmtpSender};
pub use storage::StorageSender;

use async_trait::async_trait;

use crate::model::QueueEntry;

/// Delivery capability consumed by the dispatch loop.
///
/// One method, deterministic contract: attempt delivery of one entry,
/// report the outcome as a boolean. Implementations log their own failure
/// detail and never panic across this boundary.
#[async_trait]
pub trait Sender: Send + Sync {
    async fn send(&self, entry: &QueueEntry) -> bool;
}
