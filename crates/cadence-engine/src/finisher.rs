//! Finisher selection and invocation.
//!
//! After the step loop, the engine either accepts the last step's result or
//! asks a finishing handler to synthesize the answer from a summary of every
//! executed step.

use cadence_core::{AgentResult, Result};
use cadence_state::{ConversationState, Ledger};
use serde_json::{json, Map, Value};
use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::executor::{invoke, ExecutedStep, Invocation, RunContext};
use crate::handler::HandlerRegistry;
use crate::resolver::collect_payloads;
use crate::trace::TraceEntry;

/// Step id recorded for finisher calls.
pub const FINISHER_STEP_ID: &str = "finisher";

/// Goal handed to finishers.
pub const FINISHER_GOAL: &str = "Finalize response";

/// Attachment naming a finisher to use regardless of the last step.
pub const PREFERRED_FINISHER: &str = "preferred_finisher";

const EXCERPT_LIMIT: usize = 200;
const EXCERPT_ELLIPSIS: &str = "...";

/// What a finisher works from.
#[derive(Debug, Clone)]
pub struct FinisherMaterial<'a> {
    summary: String,
    executed: &'a [ExecutedStep],
}

impl<'a> FinisherMaterial<'a> {
    pub fn new(user_request: &str, executed: &'a [ExecutedStep]) -> Self {
        Self {
            summary: summarize(user_request, executed),
            executed,
        }
    }

    /// Aggregated step summary.
    pub fn summary(&self) -> &str {
        &self.summary
    }

    /// Payloads of every artifact of `kind` across all executed steps, as one
    /// list. `null` when there are none.
    pub fn artifacts(&self, kind: &str) -> Value {
        collect_payloads(
            self.executed
                .iter()
                .flat_map(|e| e.result.artifacts_of_kind(kind))
                .map(|a| &a.payload),
        )
    }

    /// Payload of the most recent artifact of `kind`.
    pub fn latest(&self, kind: &str) -> Option<&'a Value> {
        self.executed
            .iter()
            .flat_map(|e| e.result.artifacts())
            .filter(|a| a.kind == kind)
            .map(|a| &a.payload)
            .last()
    }
}

/// Build the finisher brief: the request followed by one line per step.
pub fn summarize(user_request: &str, executed: &[ExecutedStep]) -> String {
    let lines: Vec<String> = executed
        .iter()
        .map(|e| {
            let status = if e.result.is_ok() { "OK" } else { "ERROR" };
            let excerpt = excerpt(e.result.content());
            let excerpt = if excerpt.is_empty() {
                "[no output]".to_string()
            } else {
                excerpt
            };
            format!("- {} [{}] {}: {}", e.step.id, status, e.handler, excerpt)
        })
        .collect();
    format!(
        "User request: {user_request}\n\nStep findings:\n{}",
        lines.join("\n")
    )
}

/// Single-line excerpt of at most [`EXCERPT_LIMIT`] characters.
fn excerpt(content: &str) -> String {
    let line = content.trim().replace('\n', " ");
    if line.chars().count() <= EXCERPT_LIMIT {
        return line;
    }
    let keep = EXCERPT_LIMIT - EXCERPT_ELLIPSIS.len();
    let mut cut: String = line.chars().take(keep).collect();
    cut.push_str(EXCERPT_ELLIPSIS);
    cut
}

/// Decide which handler, if any, finishes the run.
///
/// Returns `None` when the last step's result should stand as is.
pub fn select_finisher(
    config: &EngineConfig,
    registry: &HandlerRegistry,
    context: &ConversationState,
    last: &ExecutedStep,
) -> Option<String> {
    if let Some(preferred) = context.attachment_str(PREFERRED_FINISHER) {
        if config.is_finisher(preferred) && registry.contains(preferred) {
            return Some(preferred.to_string());
        }
        debug!(preferred, "preferred finisher not eligible");
    }
    if last.result.is_ok() && config.is_finisher(&last.handler) {
        return None;
    }
    let fallback = config.fallback_handler.as_str();
    if config.is_finisher(fallback) && registry.contains(fallback) {
        return Some(fallback.to_string());
    }
    None
}

/// Outcome of the finishing phase.
#[derive(Debug, Clone)]
pub struct Finalized {
    /// The run's final result.
    pub result: AgentResult,

    /// Finisher that ran, if any.
    pub finisher: Option<String>,

    /// Trace entry for the finisher call.
    pub entry: Option<TraceEntry>,
}

/// Select and run a finisher for a run with at least one executed step.
pub async fn finalize(
    config: &EngineConfig,
    registry: &HandlerRegistry,
    run: &RunContext,
    user_request: &str,
    ledger: &mut Ledger,
    context: &mut ConversationState,
) -> Result<Option<Finalized>> {
    let Some(last) = run.last() else {
        return Ok(None);
    };
    let chosen = select_finisher(config, registry, context, last)
        .and_then(|name| registry.get(&name));
    let Some(handler) = chosen else {
        return Ok(Some(Finalized {
            result: last.result.clone(),
            finisher: None,
            entry: None,
        }));
    };

    let material = FinisherMaterial::new(user_request, &run.executed);
    let inputs = handler.finisher_inputs(&material, context);
    info!(finisher = handler.name(), "invoking finisher");

    let mut role = Map::new();
    role.insert("role".into(), json!("finisher"));
    let invocation = Invocation {
        description: format!("Finalize response via {}", handler.name()),
        step_id: FINISHER_STEP_ID.to_string(),
        goal: FINISHER_GOAL.to_string(),
        inputs: inputs.clone(),
        metadata: role.clone(),
        message_metadata: role,
    };
    let (finished, _unit) = invoke(handler.as_ref(), invocation, run.root_id, ledger, context).await?;

    let entry = TraceEntry::new(
        FINISHER_STEP_ID,
        handler.name(),
        FINISHER_GOAL,
        &inputs,
        Some(&finished),
    );
    let result = if finished.is_ok() || !last.result.is_ok() {
        finished
    } else {
        debug!("finisher failed, keeping the last step's result");
        last.result.clone()
    };
    Ok(Some(Finalized {
        result,
        finisher: Some(handler.name().to_string()),
        entry: Some(entry),
    }))
}
