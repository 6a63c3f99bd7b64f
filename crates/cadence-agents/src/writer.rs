//! Prose writer.

use std::sync::Arc;

use async_trait::async_trait;
use cadence_core::{AgentResult, Result, StepInputs};
use cadence_engine::{FinisherMaterial, Handler, StepTask, BRIEF_INPUT};
use cadence_state::ConversationState;
use serde_json::Value;

use crate::base::primary_text;
use crate::client::{ChatModel, ChatRequest};

/// Attachment and input carrying the requested output format.
pub const FORMAT_HINT: &str = "format_hint";

const SYSTEM_PROMPT: &str = "\
You turn musical ideas into prose: story outlines, liner notes, summaries, \
scripts and character sketches.

Open with a single-sentence logline. Follow the requested format when one is \
given, otherwise write about two paragraphs of vivid prose. Finish with a \
short \"Next steps\" list of ways to develop the piece further.";

pub struct WriterHandler {
    model: Arc<dyn ChatModel>,
}

impl WriterHandler {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }
}

#[async_trait]
impl Handler for WriterHandler {
    fn name(&self) -> &str {
        "writer"
    }

    fn description(&self) -> &str {
        "Creative prose writer; inputs: brief, format_hint"
    }

    async fn run(&self, task: &StepTask, context: &mut ConversationState) -> Result<AgentResult> {
        let brief = primary_text(task, context, BRIEF_INPUT);
        let format = task.input_str(FORMAT_HINT).unwrap_or("freeform");

        let prose = self
            .model
            .complete(
                ChatRequest::new(SYSTEM_PROMPT, format!("Format: {format}\nBrief: {brief}"))
                    .temperature(0.55)
                    .max_tokens(700),
            )
            .await?;
        Ok(AgentResult::completed(prose))
    }

    fn finisher_inputs(
        &self,
        material: &FinisherMaterial<'_>,
        context: &ConversationState,
    ) -> StepInputs {
        let mut inputs = StepInputs::new();
        inputs.insert(
            BRIEF_INPUT.to_string(),
            Value::String(material.summary().to_string()),
        );
        if let Some(hint) = context.attachment_str(FORMAT_HINT) {
            inputs.insert(FORMAT_HINT.to_string(), Value::String(hint.to_string()));
        }
        inputs
    }
}
