//! Chat-model backed planner.

use std::fmt::Write as _;
use std::sync::Arc;

use async_trait::async_trait;
use cadence_core::{AgentOutput, AgentResult, Result};
use cadence_engine::Handler;
use cadence_planner::{ParsedPlan, PlanParser, PlanRequest, Planner, PLAN_ARTIFACT_KIND};
use serde_json::Value;
use tracing::debug;

use crate::base::{or_na, strip_code_fence, transcript};
use crate::client::{ChatModel, ChatRequest};

const PLANNING_RULES: &str = "\
Break the user's request into one to four steps and answer with a JSON array \
only, without markdown or commentary. Each element looks like:
{\"id\": \"step-1\", \"handler\": \"<handler name>\", \"goal\": \"<what this step does>\", \"inputs\": {}}

Always include `inputs`, even when it is empty. Keep numbers and booleans as \
JSON primitives.

To feed an earlier step's output into a later step, add an input named \
`<input>_from` whose value is {\"step\": \"<earlier id>\"}. Optional keys:
- \"artifact\": take the payloads of artifacts of that kind instead of the response text
- \"field\": read a field such as \"content\" or \"error\"
- \"mode\": \"first\", \"last\" or \"list\"
`references` defaults to the `documents` artifacts, `midi_summary` to the \
latest `midi` artifact, and every other input to the response text. Only \
reference steps that appear before the current one.";

/// Sample reference shown to the model.
const REFERENCE_EXAMPLE: &str =
    r#""references_from": {"step": "step-1", "artifact": "documents", "mode": "list"}"#;

/// Planner that asks a chat model for a JSON step list.
pub struct LlmPlanner {
    model: Arc<dyn ChatModel>,
    catalog: Vec<(String, String)>,
    parser: PlanParser,
}

impl LlmPlanner {
    pub fn new(model: Arc<dyn ChatModel>, fallback_handler: impl Into<String>) -> Self {
        Self {
            model,
            catalog: Vec::new(),
            parser: PlanParser::new(fallback_handler),
        }
    }

    /// Advertise a handler by name and description.
    pub fn with_handler(mut self, name: impl Into<String>, description: impl Into<String>) -> Self {
        self.catalog.push((name.into(), description.into()));
        self
    }

    /// Advertise every handler in `handlers`.
    pub fn with_handlers<'h>(mut self, handlers: impl IntoIterator<Item = &'h Arc<dyn Handler>>) -> Self {
        for handler in handlers {
            self.catalog
                .push((handler.name().to_string(), handler.description().to_string()));
        }
        self
    }

    /// Default instructions: the handler catalog followed by the planning rules.
    pub fn default_prompt(&self) -> String {
        let mut prompt = String::from("You plan work for a music research and songwriting assistant.\n\n");
        if !self.catalog.is_empty() {
            prompt.push_str("Available handlers:\n");
            for (name, description) in &self.catalog {
                let _ = writeln!(prompt, "- {name}: {description}");
            }
            prompt.push('\n');
        }
        prompt.push_str(PLANNING_RULES);
        let _ = write!(prompt, "\n\nExample: {REFERENCE_EXAMPLE}");
        prompt
    }

    fn summarize(&self, steps: &Value, goal: &str) -> Option<String> {
        match self.parser.parse_value(steps, goal) {
            ParsedPlan::Steps(steps) => Some(
                steps
                    .iter()
                    .map(|s| format!("{}: ({}) {}", s.id, s.handler, s.goal))
                    .collect::<Vec<_>>()
                    .join("\n"),
            ),
            ParsedPlan::Empty | ParsedPlan::Unparsable => None,
        }
    }
}

#[async_trait]
impl Planner for LlmPlanner {
    fn name(&self) -> &str {
        "planner"
    }

    async fn plan(&self, request: &PlanRequest) -> Result<AgentResult> {
        let system = request
            .system_prompt
            .clone()
            .unwrap_or_else(|| self.default_prompt());
        let history = transcript(&request.history);
        let user = format!(
            "User goal:\n{}\n\nRecent context:\n{}",
            request.goal,
            or_na(&history)
        );

        let raw = self
            .model
            .complete(ChatRequest::new(system, user).temperature(0.2).max_tokens(500))
            .await?;

        let output = match serde_json::from_str::<Value>(strip_code_fence(&raw)) {
            Ok(steps @ Value::Array(_)) => {
                let summary = self.summarize(&steps, &request.goal).unwrap_or_else(|| raw.clone());
                AgentOutput::new(summary).with_artifact(PLAN_ARTIFACT_KIND, steps)
            }
            Ok(other) => {
                debug!("planner reply is JSON but not a step list");
                AgentOutput::new(raw.clone()).with_artifact(PLAN_ARTIFACT_KIND, other)
            }
            Err(_) => {
                debug!("planner reply is not JSON");
                AgentOutput::new(raw.clone()).with_artifact(PLAN_ARTIFACT_KIND, Value::String(raw))
            }
        };
        Ok(output.into())
    }
}
