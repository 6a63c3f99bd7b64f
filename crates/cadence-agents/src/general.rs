//! General-purpose fallback handler.

use std::sync::Arc;

use async_trait::async_trait;
use cadence_core::{AgentResult, Result};
use cadence_engine::{Handler, StepTask, BRIEF_INPUT};
use cadence_planner::PROMPT_INPUT;
use cadence_state::ConversationState;

use crate::client::{ChatModel, ChatRequest};

const SYSTEM_PROMPT: &str = "\
You help musicians and songwriters with questions about songs, producers, \
genres and the craft of writing music.

Answer in two to four short paragraphs. Use a compact bullet list when you \
recommend resources or techniques, and name concrete songs or artists when \
you know relevant ones. If the request is ambiguous, answer the most likely \
reading and say what you assumed.";

/// Answers free-form requests. Also the default finisher.
pub struct GeneralHandler {
    model: Arc<dyn ChatModel>,
}

impl GeneralHandler {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }
}

#[async_trait]
impl Handler for GeneralHandler {
    fn name(&self) -> &str {
        "general"
    }

    fn description(&self) -> &str {
        "General music assistant for open questions; inputs: brief, prompt"
    }

    async fn run(&self, task: &StepTask, context: &mut ConversationState) -> Result<AgentResult> {
        let question = task
            .input_str(BRIEF_INPUT)
            .or_else(|| task.input_str(PROMPT_INPUT))
            .or_else(|| context.recent_user_prompt())
            .unwrap_or(task.goal.as_str())
            .to_string();

        let reply = self
            .model
            .complete(
                ChatRequest::new(SYSTEM_PROMPT, question)
                    .temperature(0.4)
                    .max_tokens(600),
            )
            .await?;
        Ok(AgentResult::completed(reply))
    }
}
