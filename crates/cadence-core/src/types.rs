//! Common types used across the Cadence crates.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle state of a ledger work unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WorkStatus {
    /// Created but not started.
    #[default]
    Pending,
    /// Handler or planner call in flight.
    Running,
    /// Finished with a result.
    Succeeded,
    /// Finished with an error.
    Failed,
}

impl WorkStatus {
    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkStatus::Succeeded | WorkStatus::Failed)
    }

    /// Returns true if moving to `next` keeps the lifecycle monotonic.
    pub fn can_transition_to(&self, next: WorkStatus) -> bool {
        match self {
            WorkStatus::Pending => next != WorkStatus::Pending,
            WorkStatus::Running => next.is_terminal(),
            WorkStatus::Succeeded | WorkStatus::Failed => false,
        }
    }
}

impl fmt::Display for WorkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            WorkStatus::Pending => "pending",
            WorkStatus::Running => "running",
            WorkStatus::Succeeded => "succeeded",
            WorkStatus::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// Speaker role of a conversation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    System,
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
            Role::Tool => "tool",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_work_status_terminal() {
        assert!(WorkStatus::Succeeded.is_terminal());
        assert!(WorkStatus::Failed.is_terminal());
        assert!(!WorkStatus::Running.is_terminal());
        assert!(!WorkStatus::Pending.is_terminal());
    }

    #[test]
    fn test_work_status_transitions() {
        assert!(WorkStatus::Pending.can_transition_to(WorkStatus::Running));
        assert!(WorkStatus::Pending.can_transition_to(WorkStatus::Succeeded));
        assert!(WorkStatus::Running.can_transition_to(WorkStatus::Failed));
        assert!(!WorkStatus::Running.can_transition_to(WorkStatus::Pending));
        assert!(!WorkStatus::Succeeded.can_transition_to(WorkStatus::Failed));
        assert!(!WorkStatus::Failed.can_transition_to(WorkStatus::Running));
    }

    #[test]
    fn test_role_serialization() {
        assert_eq!(serde_json::to_string(&Role::Assistant).unwrap(), "\"assistant\"");
        assert_eq!(Role::Tool.as_str(), "tool");
    }
}
