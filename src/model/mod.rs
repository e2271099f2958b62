//! Data model — status domains and pipeline records.

mod lead;
mod message;
mod status;

pub use lead::Lead;
pub use message::{Message, QueueEntry};
pub use status::{Channel, LeadStatus, MessageStatus};
