//! Cadence Agents
//!
//! Default handlers, the LLM planner and the HTTP chat client they share.

pub mod analyst;
pub mod base;
pub mod client;
pub mod composer;
pub mod general;
pub mod midi;
pub mod parser;
pub mod planner;
pub mod writer;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;

use cadence_engine::Handler;

pub use analyst::AnalystHandler;
pub use client::{ChatClient, ChatConfig, ChatMessage, ChatModel, ChatRequest};
pub use composer::{ComposerHandler, STYLE_HINT};
pub use general::GeneralHandler;
pub use parser::{ParserHandler, MIDI_PATH};
pub use planner::LlmPlanner;
pub use writer::{WriterHandler, FORMAT_HINT};

/// The standard handler set, all sharing one chat model.
pub fn default_roster(model: Arc<dyn ChatModel>) -> Vec<Arc<dyn Handler>> {
    vec![
        Arc::new(GeneralHandler::new(model.clone())),
        Arc::new(WriterHandler::new(model.clone())),
        Arc::new(AnalystHandler::new(model.clone())),
        Arc::new(ComposerHandler::new(model)),
        Arc::new(ParserHandler::new()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeModel;

    #[test]
    fn test_default_roster_names() {
        let names: Vec<_> = default_roster(FakeModel::replying(""))
            .iter()
            .map(|h| h.name().to_string())
            .collect();
        assert_eq!(names, vec!["general", "writer", "analyst", "composer", "parser"]);
    }
}
