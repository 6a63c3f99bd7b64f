//! Error types for the Cadence orchestrator.

use thiserror::Error;
use uuid::Uuid;

use crate::types::WorkStatus;

/// Main error type for Cadence operations.
#[derive(Error, Debug, Clone)]
pub enum CadenceError {
    /// Resource not found.
    #[error("Resource not found: {resource_type} with id {id}")]
    NotFound { resource_type: String, id: String },

    /// A ledger status change that would move a work unit backwards.
    #[error("Invalid transition for work unit {id}: {from} -> {to}")]
    InvalidTransition {
        id: Uuid,
        from: WorkStatus,
        to: WorkStatus,
    },

    /// The planning capability could not produce a plan.
    #[error("Planning failed: {message}")]
    PlanningFailed { message: String },

    /// A handler raised while running a step.
    #[error("Handler {handler} failed: {message}")]
    HandlerFailed { handler: String, message: String },

    /// Connection error.
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// An upstream service answered with an error.
    #[error("Service error ({status}): {message}")]
    ServiceError { status: u16, message: String },

    /// Configuration could not be loaded or is invalid.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Filesystem error.
    #[error("I/O error: {0}")]
    Io(String),
}

impl CadenceError {
    /// Create a handler failure.
    pub fn handler(handler: impl Into<String>, message: impl Into<String>) -> Self {
        CadenceError::HandlerFailed {
            handler: handler.into(),
            message: message.into(),
        }
    }

    /// Returns true if this error signals an engine bug rather than a runtime failure.
    ///
    /// These are the only errors allowed to escape an orchestration run.
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            CadenceError::NotFound { .. } | CadenceError::InvalidTransition { .. }
        )
    }
}

/// Convenience Result type for Cadence operations.
pub type Result<T> = std::result::Result<T, CadenceError>;

impl From<serde_json::Error> for CadenceError {
    fn from(err: serde_json::Error) -> Self {
        CadenceError::SerializationError(err.to_string())
    }
}

impl From<std::io::Error> for CadenceError {
    fn from(err: std::io::Error) -> Self {
        CadenceError::Io(err.to_string())
    }
}

impl From<toml::de::Error> for CadenceError {
    fn from(err: toml::de::Error) -> Self {
        CadenceError::ConfigError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contract_violations() {
        let missing = CadenceError::NotFound {
            resource_type: "work_unit".to_string(),
            id: "abc".to_string(),
        };
        assert!(missing.is_contract_violation());
        assert!(!CadenceError::handler("writer", "boom").is_contract_violation());
    }

    #[test]
    fn test_handler_error_message() {
        let err = CadenceError::handler("writer", "boom");
        assert_eq!(err.to_string(), "Handler writer failed: boom");
    }
}
