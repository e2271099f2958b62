//! Pipeline logic — the status state machine and message review.

pub mod decision;
pub mod review;

pub use decision::{Action, ActionGroup, BatchItem, Decision, DecisionEngine};
pub use review::{ReviewOutcome, Reviewer};
