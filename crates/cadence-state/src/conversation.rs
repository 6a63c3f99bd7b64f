//! Conversation state shared by every handler in a run.

use cadence_core::Role;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Default number of messages kept before the oldest are dropped.
pub const DEFAULT_MAX_MESSAGES: usize = 64;

/// Single entry in the conversation history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    /// Speaker name, e.g. the handler that produced the message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// Speaker label for transcripts: the name if present, else the role.
    pub fn speaker(&self) -> &str {
        self.name.as_deref().unwrap_or(self.role.as_str())
    }
}

/// Append-only message log plus a side-channel attachment store.
#[derive(Debug, Clone)]
pub struct ConversationState {
    max_messages: usize,
    messages: Vec<Message>,
    attachments: Map<String, Value>,
}

impl Default for ConversationState {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_MESSAGES)
    }
}

impl ConversationState {
    /// Create an empty state keeping at most `max_messages` messages.
    pub fn new(max_messages: usize) -> Self {
        Self {
            max_messages: max_messages.max(1),
            messages: Vec::new(),
            attachments: Map::new(),
        }
    }

    /// Append a message, dropping the oldest ones past the cap.
    pub fn add_message(
        &mut self,
        role: Role,
        content: impl Into<String>,
        name: Option<&str>,
        metadata: Map<String, Value>,
    ) {
        self.messages.push(Message {
            role,
            content: content.into(),
            name: name.map(str::to_string),
            metadata,
            timestamp: Utc::now(),
        });
        if self.messages.len() > self.max_messages {
            let overflow = self.messages.len() - self.max_messages;
            self.messages.drain(..overflow);
        }
    }

    pub fn add_user_message(&mut self, content: impl Into<String>, metadata: Map<String, Value>) {
        self.add_message(Role::User, content, None, metadata);
    }

    pub fn add_agent_message(
        &mut self,
        agent: &str,
        content: impl Into<String>,
        metadata: Map<String, Value>,
    ) {
        self.add_message(Role::Assistant, content, Some(agent), metadata);
    }

    /// The most recent `limit` messages (all of them when `None`), oldest first.
    pub fn iter_messages(&self, limit: Option<usize>) -> impl Iterator<Item = &Message> {
        let skip = match limit {
            Some(limit) if limit < self.messages.len() => self.messages.len() - limit,
            _ => 0,
        };
        self.messages.iter().skip(skip)
    }

    /// Content of the latest user message, if any.
    pub fn recent_user_prompt(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn set_attachment(&mut self, key: impl Into<String>, value: Value) {
        self.attachments.insert(key.into(), value);
    }

    pub fn get_attachment(&self, key: &str) -> Option<&Value> {
        self.attachments.get(key)
    }

    /// Attachment as a non-empty string.
    pub fn attachment_str(&self, key: &str) -> Option<&str> {
        self.get_attachment(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    pub fn attachments(&self) -> &Map<String, Value> {
        &self.attachments
    }
}
