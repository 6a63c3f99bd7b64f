//! MIDI parser handler.

use std::io::ErrorKind;

use async_trait::async_trait;
use cadence_core::{AgentOutput, AgentResult, Result};
use cadence_engine::{Handler, StepTask};
use cadence_state::ConversationState;
use tracing::debug;

use crate::midi::summarize_midi;

/// Input and attachment naming the MIDI file to read.
pub const MIDI_PATH: &str = "midi_path";

/// Turns a MIDI file into a `midi` artifact.
///
/// Reads `midi_path` from the step inputs, else from the attachment of the
/// same name. Missing or unreadable files produce a failed result.
#[derive(Debug, Default)]
pub struct ParserHandler;

impl ParserHandler {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Handler for ParserHandler {
    fn name(&self) -> &str {
        "parser"
    }

    fn description(&self) -> &str {
        "MIDI parser producing a midi artifact (bpm, time signature, key, notes); inputs: midi_path"
    }

    async fn run(&self, task: &StepTask, context: &mut ConversationState) -> Result<AgentResult> {
        let Some(path) = task
            .input_str(MIDI_PATH)
            .or_else(|| context.attachment_str(MIDI_PATH))
            .map(str::to_string)
        else {
            return Ok(AgentResult::failed("Parser requires midi_path input"));
        };

        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Ok(AgentResult::failed(format!("MIDI file not found: {path}")));
            }
            Err(e) => return Ok(AgentResult::failed(format!("Failed to read MIDI: {e}"))),
        };
        let summary = match summarize_midi(&bytes) {
            Ok(summary) => summary,
            Err(e) => return Ok(AgentResult::failed(format!("Failed to parse MIDI: {e}"))),
        };

        let notes = summary["notes"].as_array().map_or(0, Vec::len);
        debug!(path = %path, notes, "parsed MIDI file");
        let content = format!(
            "Parsed MIDI '{path}' with {notes} notes. Time signature {} and BPM {}",
            summary["meta"]["time_signature"].as_str().unwrap_or("?"),
            summary["meta"]["bpm"]
                .as_f64()
                .map_or_else(|| "?".to_string(), |bpm| format!("{bpm:.0}")),
        );
        Ok(AgentOutput::new(content).with_artifact("midi", summary).into())
    }
}
