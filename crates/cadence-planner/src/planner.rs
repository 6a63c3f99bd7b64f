//! Planner trait and the fixed-plan implementation.

use async_trait::async_trait;
use cadence_core::{AgentOutput, AgentResult, PlanStep, Result};
use cadence_state::Message;
use serde_json::Value;

use crate::parse::PLAN_ARTIFACT_KIND;

/// Input to a planning call.
#[derive(Debug, Clone)]
pub struct PlanRequest {
    /// The user-visible goal to decompose.
    pub goal: String,

    /// Capped window of recent conversation messages, oldest first.
    pub history: Vec<Message>,

    /// Optional instructions replacing the planner's default prompt.
    pub system_prompt: Option<String>,
}

impl PlanRequest {
    pub fn new(goal: impl Into<String>) -> Self {
        Self {
            goal: goal.into(),
            history: Vec::new(),
            system_prompt: None,
        }
    }

    pub fn with_history(mut self, history: Vec<Message>) -> Self {
        self.history = history;
        self
    }

    pub fn with_system_prompt(mut self, system_prompt: Option<String>) -> Self {
        self.system_prompt = system_prompt;
        self
    }
}

/// Trait for planning capabilities.
///
/// A planner answers with a result whose first `plan` artifact carries the
/// raw step list. Anything else is treated as "no plan" by the engine.
#[async_trait]
pub trait Planner: Send + Sync {
    /// Name recorded on the planning work unit and in traces.
    fn name(&self) -> &str;

    /// Produce a plan for the request.
    async fn plan(&self, request: &PlanRequest) -> Result<AgentResult>;
}

/// Planner that always serves the same raw step list.
#[derive(Debug, Clone)]
pub struct StaticPlanner {
    name: String,
    raw_steps: Value,
}

impl StaticPlanner {
    /// Serve a list of typed steps.
    pub fn new(steps: Vec<PlanStep>) -> Self {
        let raw_steps = serde_json::to_value(steps).unwrap_or(Value::Array(Vec::new()));
        Self::from_value(raw_steps)
    }

    /// Serve raw step JSON exactly as given, malformed or not.
    pub fn from_value(raw_steps: Value) -> Self {
        Self {
            name: "planner".to_string(),
            raw_steps,
        }
    }

    /// Parse raw step JSON from a string.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(Self::from_value(serde_json::from_str(json)?))
    }

    /// Override the planner name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

#[async_trait]
impl Planner for StaticPlanner {
    fn name(&self) -> &str {
        &self.name
    }

    async fn plan(&self, _request: &PlanRequest) -> Result<AgentResult> {
        let count = self.raw_steps.as_array().map_or(0, Vec::len);
        Ok(AgentOutput::new(format!("{count} predefined step(s)"))
            .with_artifact(PLAN_ARTIFACT_KIND, self.raw_steps.clone())
            .into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_static_planner_serves_plan_artifact() {
        let planner = StaticPlanner::new(vec![PlanStep::new("step-1", "writer", "Write")]);
        let result = planner.plan(&PlanRequest::new("goal")).await.unwrap();

        assert!(result.is_ok());
        let artifact = result.artifacts_of_kind(PLAN_ARTIFACT_KIND).next().unwrap();
        assert_eq!(artifact.payload[0]["handler"], "writer");
        assert_eq!(result.content(), "1 predefined step(s)");
    }

    #[tokio::test]
    async fn test_static_planner_from_json() {
        let planner = StaticPlanner::from_json_str(r#"[{"agent": "general"}]"#)
            .unwrap()
            .with_name("fixed");
        assert_eq!(planner.name(), "fixed");

        let result = planner.plan(&PlanRequest::new("goal")).await.unwrap();
        assert_eq!(result.artifacts()[0].payload, json!([{"agent": "general"}]));
    }

    #[test]
    fn test_invalid_json_is_serialization_error() {
        assert!(StaticPlanner::from_json_str("not json").is_err());
    }
}
