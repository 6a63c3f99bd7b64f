//! Helpers shared by the chat-backed handlers.

use cadence_engine::StepTask;
use cadence_state::{ConversationState, Message};
use serde_json::{Map, Value};

/// Reference entries rendered into a prompt.
const MAX_REFERENCES: usize = 5;

/// Primary text for a handler: the named input, else the latest user
/// message, else the task goal.
pub fn primary_text(task: &StepTask, context: &ConversationState, key: &str) -> String {
    task.input_str(key)
        .or_else(|| context.recent_user_prompt())
        .unwrap_or(task.goal.as_str())
        .to_string()
}

/// Render messages as `[speaker] content` lines.
pub fn transcript<'a>(messages: impl IntoIterator<Item = &'a Message>) -> String {
    messages
        .into_iter()
        .map(|m| format!("[{}] {}", m.speaker(), m.content))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Render reference documents as short bullet lines.
///
/// Accepts a list of documents, possibly nested one level or wrapped in
/// `{"payload": ...}` envelopes. Returns an empty string when nothing usable
/// is present.
pub fn format_references(references: Option<&Value>) -> String {
    let mut documents: Vec<&Map<String, Value>> = Vec::new();
    if let Some(value) = references {
        collect_documents(value, &mut documents, 0);
    }
    documents
        .into_iter()
        .take(MAX_REFERENCES)
        .map(|doc| {
            let title = text_field(doc, &["defaultName", "title", "name"]).unwrap_or("Unknown");
            let tags = doc
                .get("tagNames")
                .or_else(|| doc.get("tags"))
                .and_then(Value::as_array)
                .map(|tags| {
                    tags.iter()
                        .filter_map(Value::as_str)
                        .take(5)
                        .collect::<Vec<_>>()
                        .join(", ")
                })
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| "N/A".to_string());
            format!("- {title} | Tags: {tags}")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn collect_documents<'a>(value: &'a Value, out: &mut Vec<&'a Map<String, Value>>, depth: usize) {
    if depth > 2 {
        return;
    }
    match value {
        Value::Array(items) => {
            for item in items {
                collect_documents(item, out, depth + 1);
            }
        }
        Value::Object(map) => match map.get("payload") {
            Some(payload @ (Value::Object(_) | Value::Array(_))) => {
                collect_documents(payload, out, depth + 1)
            }
            _ => out.push(map),
        },
        _ => {}
    }
}

fn text_field<'a>(doc: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .find_map(|key| doc.get(*key).and_then(Value::as_str))
        .filter(|s| !s.is_empty())
}

/// Strip a surrounding markdown code fence, if any.
pub fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // drop the language tag line
    let body = rest.split_once('\n').map_or("", |(_, body)| body);
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

/// `value`, or "N/A" when blank.
pub fn or_na(value: &str) -> &str {
    if value.trim().is_empty() {
        "N/A"
    } else {
        value
    }
}
