//! Lyric composer.

use std::sync::Arc;

use async_trait::async_trait;
use cadence_core::{AgentOutput, AgentResult, Result, StepInputs};
use cadence_engine::{FinisherMaterial, Handler, StepTask, BRIEF_INPUT};
use cadence_state::ConversationState;
use serde_json::Value;

use crate::base::{format_references, or_na, primary_text};
use crate::client::{ChatModel, ChatRequest};

const STYLE_INPUT: &str = "style";
const REFERENCES_INPUT: &str = "references";
const SEED_LYRICS_INPUT: &str = "seed_lyrics";
const MIDI_SUMMARY_INPUT: &str = "midi_summary";

/// Attachment holding the user's style cue.
pub const STYLE_HINT: &str = "style_hint";

const SYSTEM_PROMPT: &str = "\
You write lyrics for vocal synthesizer songs.

Each request lists a brief, optional style cues, reference songs, seed lyrics \
to rework and a MIDI summary. Mention any references or seed lyrics you used. \
When a MIDI summary is present, fit the syllable density to its tempo and \
meter.

Label sections such as Verse, Pre-Chorus, Chorus and Bridge. Keep lines \
between six and eleven syllables. End with a brief \"Notes:\" section on how \
the lyrics follow the brief and style.";

pub struct ComposerHandler {
    model: Arc<dyn ChatModel>,
}

impl ComposerHandler {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }
}

/// One-line description of a MIDI summary, empty when absent.
fn describe_midi(summary: Option<&Value>) -> String {
    let Some(summary) = summary.filter(|s| s.is_object()) else {
        return String::new();
    };
    let meta = &summary["meta"];
    let show = |v: &Value| match v {
        Value::Null => "?".to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    let notes = summary["notes"].as_array().map_or(0, Vec::len);
    format!(
        "BPM {}, Time Signature {}, {notes} notes",
        show(&meta["bpm"]),
        show(&meta["time_signature"])
    )
}

#[async_trait]
impl Handler for ComposerHandler {
    fn name(&self) -> &str {
        "composer"
    }

    fn description(&self) -> &str {
        "Lyric composer; inputs: brief, style, references (documents), seed_lyrics, midi_summary (midi)"
    }

    async fn run(&self, task: &StepTask, context: &mut ConversationState) -> Result<AgentResult> {
        let brief = primary_text(task, context, BRIEF_INPUT);
        let style = task.input_str(STYLE_INPUT).unwrap_or("inherit user tone");
        let seed = task.input_str(SEED_LYRICS_INPUT).unwrap_or("N/A");
        let references = task.input(REFERENCES_INPUT);
        let midi = task.input(MIDI_SUMMARY_INPUT);

        let user = format!(
            "Brief: {brief}\nStyle cues: {style}\nSeed lyrics:\n{seed}\n\n\
             References:\n{}\n\nMIDI summary:\n{}",
            or_na(&format_references(references)),
            or_na(&describe_midi(midi)),
        );
        let lyrics = self
            .model
            .complete(
                ChatRequest::new(SYSTEM_PROMPT, user)
                    .temperature(0.6)
                    .max_tokens(900),
            )
            .await?;

        let mut output = AgentOutput::new(lyrics);
        if let Some(references) = references {
            output = output.with_artifact(REFERENCES_INPUT, references.clone());
        }
        if let Some(midi) = midi {
            output = output.with_artifact("midi", midi.clone());
        }
        Ok(output.into())
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

        let references = material.artifacts("documents");
        if !references.is_null() {
            inputs.insert(REFERENCES_INPUT.to_string(), references);
        }
        if let Some(midi) = material.latest("midi") {
            inputs.insert(MIDI_SUMMARY_INPUT.to_string(), midi.clone());
        }
        if let Some(style) = context.attachment_str(STYLE_HINT) {
            inputs.insert(STYLE_INPUT.to_string(), Value::String(style.to_string()));
        }
        if let Some(seed) = context.attachment_str(SEED_LYRICS_INPUT) {
            inputs.insert(SEED_LYRICS_INPUT.to_string(), Value::String(seed.to_string()));
        }
        inputs
    }
}
