//! # Cadence State
//!
//! Per-run mutable state: the work-unit ledger and the conversation log.

pub mod conversation;
pub mod ledger;

pub use conversation::{ConversationState, Message, DEFAULT_MAX_MESSAGES};
pub use ledger::{Ledger, LogEntry, WorkUnit};
