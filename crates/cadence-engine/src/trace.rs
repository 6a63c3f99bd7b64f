//! Replayable run traces.
//!
//! A [`Trace`] is the JSON record of one orchestration run: the request, the
//! planning attempt, every executed step, the finisher and the final outcome.

use std::fmt::Debug;
use std::path::Path;

use cadence_core::{AgentResult, CadenceError, Result, StepInputs};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Keys that differ between otherwise identical runs.
const VOLATILE_KEYS: [&str; 3] = ["run_id", "started_at", "finished_at"];

/// Reduce any value to plain JSON.
///
/// Values that cannot be serialized are recorded as their `Debug` text.
pub fn sanitize<T: Serialize + Debug + ?Sized>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or_else(|_| Value::String(format!("{value:?}")))
}

/// Status of a traced unit.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TraceStatus {
    /// No result was produced.
    Skipped,
    Succeeded,
    Failed,
}

impl TraceStatus {
    fn of(result: Option<&AgentResult>) -> Self {
        match result {
            None => TraceStatus::Skipped,
            Some(result) if result.is_ok() => TraceStatus::Succeeded,
            Some(_) => TraceStatus::Failed,
        }
    }
}

/// Kind of an artifact attached to a traced result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ArtifactKind {
    pub kind: String,
}

/// One traced handler or planner call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TraceEntry {
    /// Plan step id, or "plan" / "finisher".
    pub step_id: String,

    /// Handler that ran.
    pub handler: String,

    /// Goal handed to the handler.
    pub goal: String,

    /// Sanitized resolved inputs.
    pub inputs: Value,

    /// Outcome of the call.
    pub status: TraceStatus,

    /// Output text, if the call completed.
    pub output: Option<String>,

    /// Error text, if the call failed.
    pub error: Option<String>,

    /// Kinds of the attached artifacts, in attachment order.
    pub artifacts: Vec<ArtifactKind>,
}

impl TraceEntry {
    /// Build an entry from a call and its result.
    pub fn new(
        step_id: impl Into<String>,
        handler: impl Into<String>,
        goal: impl Into<String>,
        inputs: &StepInputs,
        result: Option<&AgentResult>,
    ) -> Self {
        Self {
            step_id: step_id.into(),
            handler: handler.into(),
            goal: goal.into(),
            inputs: sanitize(inputs),
            status: TraceStatus::of(result),
            output: result.filter(|r| r.is_ok()).map(|r| r.content().to_string()),
            error: result.and_then(AgentResult::error).map(str::to_string),
            artifacts: result
                .map(|r| {
                    r.artifacts()
                        .iter()
                        .map(|a| ArtifactKind {
                            kind: a.kind.clone(),
                        })
                        .collect()
                })
                .unwrap_or_default(),
        }
    }
}

/// Final outcome block.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FinalBlock {
    pub content: String,
    pub error: Option<String>,
    pub status: TraceStatus,
}

impl From<&AgentResult> for FinalBlock {
    fn from(result: &AgentResult) -> Self {
        Self {
            content: result.content().to_string(),
            error: result.error().map(str::to_string),
            status: TraceStatus::of(Some(result)),
        }
    }
}

/// Structured record of one orchestration run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trace {
    /// Unique identifier for this run.
    pub run_id: Uuid,

    /// When the run started.
    pub started_at: DateTime<Utc>,

    /// When the run finished.
    pub finished_at: Option<DateTime<Utc>>,

    /// The original request text.
    pub user_request: String,

    /// Sanitized attachments supplied with the request.
    pub attachments: Value,

    /// Planning attempt, if a planner was consulted.
    pub planner: Option<TraceEntry>,

    /// Executed steps, in execution order.
    pub steps: Vec<TraceEntry>,

    /// Finisher call, if one was made.
    pub finisher: Option<TraceEntry>,

    /// Final outcome.
    pub final_result: Option<FinalBlock>,

    /// Overall run status.
    pub status: Option<TraceStatus>,
}

impl Trace {
    /// Start a trace for a request.
    pub fn new(user_request: impl Into<String>, attachments: &Map<String, Value>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: None,
            user_request: user_request.into(),
            attachments: sanitize(attachments),
            planner: None,
            steps: Vec::new(),
            finisher: None,
            final_result: None,
            status: None,
        }
    }

    /// Record the final result and close the trace.
    pub fn finish(&mut self, result: &AgentResult) {
        let block = FinalBlock::from(result);
        self.status = Some(block.status);
        self.final_result = Some(block);
        self.finished_at = Some(Utc::now());
    }

    /// Pretty-printed JSON.
    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// SHA-256 (hex) of the trace with run identity and timestamps removed.
    ///
    /// Two runs with the same plan, inputs and handler outputs share a
    /// fingerprint.
    pub fn fingerprint(&self) -> String {
        let mut value = sanitize(self);
        if let Value::Object(map) = &mut value {
            for key in VOLATILE_KEYS {
                map.remove(key);
            }
        }
        let json = serde_json::to_string(&value).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(json.as_bytes());
        hasher
            .finalize()
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect()
    }

    /// Write the trace as pretty JSON, creating parent directories.
    pub async fn persist(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = self.to_json_pretty()?;
        tokio::fs::write(path, json).await?;
        Ok(())
    }

    /// Read a trace written by [`Trace::persist`].
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| CadenceError::Io(format!("cannot read {}: {e}", path.display())))?;
        Ok(serde_json::from_str(&raw)?)
    }
}
