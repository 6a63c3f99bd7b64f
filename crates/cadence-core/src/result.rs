//! Handler output types.
//!
//! Every handler, planner and finisher answers with an [`AgentResult`]. A
//! result is either a completed output carrying content and artifacts, or a
//! failure carrying an error message; never both.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Error text used when a failure is raised with an empty message.
const UNKNOWN_ERROR: &str = "unknown error";

/// A tagged unit of structured data attached to a result.
///
/// The engine groups, filters and orders artifacts by `kind`; the payload is
/// opaque to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    /// Artifact kind (e.g. "documents", "midi", "plan").
    pub kind: String,

    /// Arbitrary payload owned by the producing handler.
    pub payload: Value,
}

impl Artifact {
    /// Create a new artifact.
    pub fn new(kind: impl Into<String>, payload: Value) -> Self {
        Self {
            kind: kind.into(),
            payload,
        }
    }
}

/// Successful handler output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct AgentOutput {
    /// User-facing text.
    pub content: String,

    /// Optional reasoning trace.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,

    /// Free-form citation records.
    #[serde(default)]
    pub citations: Vec<Value>,

    /// Attached artifacts, in attachment order.
    #[serde(default)]
    pub artifacts: Vec<Artifact>,
}

impl AgentOutput {
    /// Create an output with the given content.
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }

    /// Set the reasoning trace.
    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = Some(reasoning.into());
        self
    }

    /// Attach an artifact.
    pub fn with_artifact(mut self, kind: impl Into<String>, payload: Value) -> Self {
        self.artifacts.push(Artifact::new(kind, payload));
        self
    }
}

/// Failed handler output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentFailure {
    /// Non-empty description of what went wrong.
    pub error: String,
}

/// Normalized output returned by every handler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AgentResult {
    Completed(AgentOutput),
    Failed(AgentFailure),
}

impl AgentResult {
    /// Create a completed result with plain content.
    pub fn completed(content: impl Into<String>) -> Self {
        AgentResult::Completed(AgentOutput::new(content))
    }

    /// Create a failed result. An empty message becomes "unknown error".
    pub fn failed(error: impl Into<String>) -> Self {
        let error = error.into();
        let error = if error.trim().is_empty() {
            UNKNOWN_ERROR.to_string()
        } else {
            error
        };
        AgentResult::Failed(AgentFailure { error })
    }

    /// Check if the result is a success.
    pub fn is_ok(&self) -> bool {
        matches!(self, AgentResult::Completed(_))
    }

    /// Content text; empty for failures.
    pub fn content(&self) -> &str {
        match self {
            AgentResult::Completed(output) => &output.content,
            AgentResult::Failed(_) => "",
        }
    }

    /// Error text, if this is a failure.
    pub fn error(&self) -> Option<&str> {
        match self {
            AgentResult::Completed(_) => None,
            AgentResult::Failed(failure) => Some(&failure.error),
        }
    }

    /// Attached artifacts; empty for failures.
    pub fn artifacts(&self) -> &[Artifact] {
        match self {
            AgentResult::Completed(output) => &output.artifacts,
            AgentResult::Failed(_) => &[],
        }
    }

    /// Artifacts of one kind, in attachment order.
    pub fn artifacts_of_kind<'a>(&'a self, kind: &'a str) -> impl Iterator<Item = &'a Artifact> {
        self.artifacts().iter().filter(move |a| a.kind == kind)
    }

    /// Read a named field as JSON.
    ///
    /// Unknown names, and fields the variant does not carry, read as `null`.
    pub fn field(&self, name: &str) -> Value {
        match (self, name) {
            (AgentResult::Completed(output), "content") => Value::String(output.content.clone()),
            (AgentResult::Completed(output), "reasoning") => output
                .reasoning
                .clone()
                .map(Value::String)
                .unwrap_or(Value::Null),
            (AgentResult::Completed(output), "citations") => Value::Array(output.citations.clone()),
            (AgentResult::Completed(output), "artifacts") => {
                serde_json::to_value(&output.artifacts).unwrap_or(Value::Null)
            }
            (AgentResult::Failed(failure), "error") => Value::String(failure.error.clone()),
            _ => Value::Null,
        }
    }
}

impl From<AgentOutput> for AgentResult {
    fn from(output: AgentOutput) -> Self {
        AgentResult::Completed(output)
    }
}
