//! Style analyst.

use std::sync::Arc;

use async_trait::async_trait;
use cadence_core::{AgentOutput, AgentResult, Result};
use cadence_engine::{Handler, StepTask};
use cadence_state::ConversationState;

use crate::base::{format_references, or_na, primary_text};
use crate::client::{ChatModel, ChatRequest};

const FOCUS_INPUT: &str = "focus";
const REFERENCES_INPUT: &str = "references";

const SYSTEM_PROMPT: &str = "\
You analyze musical and lyrical style. Read the focus first, then ground \
your analysis in the listed references. When no references are given, work \
from the conversation and general knowledge.

Reply in plain text with three headed sections:
Summary: one or two sentences on the overall style.
Style Markers: bullets on imagery, vocals, instrumentation and tempo.
Actionable Ideas: bullets turning the analysis into guidance for writers.";

pub struct AnalystHandler {
    model: Arc<dyn ChatModel>,
}

impl AnalystHandler {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }
}

#[async_trait]
impl Handler for AnalystHandler {
    fn name(&self) -> &str {
        "analyst"
    }

    fn description(&self) -> &str {
        "Lyric and style analyst; inputs: focus, references (documents)"
    }

    async fn run(&self, task: &StepTask, context: &mut ConversationState) -> Result<AgentResult> {
        let focus = primary_text(task, context, FOCUS_INPUT);
        let references = task.input(REFERENCES_INPUT);
        let reference_text = format_references(references);

        let analysis = self
            .model
            .complete(
                ChatRequest::new(
                    SYSTEM_PROMPT,
                    format!("Focus: {focus}\n\nReferences:\n{}", or_na(&reference_text)),
                )
                .temperature(0.45),
            )
            .await?;

        let mut output = AgentOutput::new(analysis);
        if let Some(references) = references {
            output = output.with_artifact(REFERENCES_INPUT, references.clone());
        }
        Ok(output.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{task, FakeModel};
    use serde_json::json;

    #[tokio::test]
    async fn test_references_are_reattached() {
        let model = FakeModel::replying("Summary: moody");
        let handler = AnalystHandler::new(model.clone());
        let mut context = ConversationState::default();
        let refs = json!([{"title": "Rain Song", "tags": ["ballad"]}]);

        let result = handler
            .run(&task(json!({"focus": "mood", "references": refs.clone()})), &mut context)
            .await
            .unwrap();

        assert_eq!(result.artifacts()[0].kind, "references");
        assert_eq!(result.artifacts()[0].payload, refs);
        assert!(model.last_user_message().contains("- Rain Song | Tags: ballad"));
    }

    #[tokio::test]
    async fn test_without_references() {
        let model = FakeModel::replying("Summary: bright");
        let handler = AnalystHandler::new(model.clone());
        let mut context = ConversationState::default();

        let result = handler
            .run(&task(json!({"focus": "tempo", "references": null})), &mut context)
            .await
            .unwrap();
        assert!(result.artifacts().is_empty());
        assert!(model.last_user_message().ends_with("References:\nN/A"));
    }
}
