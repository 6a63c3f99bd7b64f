//! Conversion of raw planner output into validated plan steps.

use cadence_core::{AgentResult, PlanStep, StepInputs};
use serde_json::{Map, Value};
use tracing::{debug, warn};

/// Artifact kind carrying a planner's raw step list.
pub const PLAN_ARTIFACT_KIND: &str = "plan";

/// Input key injected for the fallback handler.
pub const PROMPT_INPUT: &str = "prompt";

/// Outcome of parsing a planner response.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedPlan {
    /// At least one step was parsed.
    Steps(Vec<PlanStep>),
    /// The planner returned an empty list: there is nothing to do.
    Empty,
    /// No usable list was found.
    Unparsable,
}

/// Parses raw step descriptors, filling defaults.
#[derive(Debug, Clone)]
pub struct PlanParser {
    fallback_handler: String,
}

impl PlanParser {
    pub fn new(fallback_handler: impl Into<String>) -> Self {
        Self {
            fallback_handler: fallback_handler.into(),
        }
    }

    /// Single step routing the goal to the fallback handler.
    pub fn fallback_step(&self, id: &str, goal: &str) -> PlanStep {
        PlanStep::new(id, &self.fallback_handler, goal)
            .with_input(PROMPT_INPUT, Value::String(goal.to_string()))
    }

    /// Parse the first `plan` artifact of a planner result.
    pub fn parse_result(&self, result: &AgentResult, default_goal: &str) -> ParsedPlan {
        if !result.is_ok() {
            return ParsedPlan::Unparsable;
        }
        match result.artifacts_of_kind(PLAN_ARTIFACT_KIND).next() {
            Some(artifact) => self.parse_value(&artifact.payload, default_goal),
            None => {
                debug!("planner result carries no plan artifact");
                ParsedPlan::Unparsable
            }
        }
    }

    /// Parse a raw JSON step list.
    pub fn parse_value(&self, raw: &Value, default_goal: &str) -> ParsedPlan {
        let Some(entries) = raw.as_array() else {
            return ParsedPlan::Unparsable;
        };
        if entries.is_empty() {
            return ParsedPlan::Empty;
        }

        let steps: Vec<PlanStep> = entries
            .iter()
            .enumerate()
            .filter_map(|(idx, entry)| match entry.as_object() {
                Some(object) => Some(self.parse_step(idx + 1, object, default_goal)),
                None => {
                    warn!(position = idx + 1, "skipping malformed plan entry");
                    None
                }
            })
            .collect();

        if steps.is_empty() {
            ParsedPlan::Unparsable
        } else {
            ParsedPlan::Steps(steps)
        }
    }

    fn parse_step(&self, position: usize, raw: &Map<String, Value>, default_goal: &str) -> PlanStep {
        let text = |key: &str| {
            raw.get(key)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
        };

        let id = text("id")
            .map(str::to_string)
            .unwrap_or_else(|| format!("step-{position}"));
        let handler = text("handler")
            .or_else(|| text("agent"))
            .unwrap_or(self.fallback_handler.as_str())
            .to_string();
        let goal = text("goal")
            .or_else(|| text("description"))
            .unwrap_or(default_goal)
            .to_string();
        let mut inputs: StepInputs = raw
            .get("inputs")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();

        if handler == self.fallback_handler && !inputs.contains_key(PROMPT_INPUT) {
            inputs.insert(PROMPT_INPUT.to_string(), Value::String(goal.clone()));
        }

        PlanStep {
            id,
            handler,
            goal,
            inputs,
        }
    }
}
