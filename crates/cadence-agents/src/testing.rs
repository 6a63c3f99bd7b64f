//! Test doubles for the chat-backed handlers.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use cadence_core::{CadenceError, Result, StepInputs};
use cadence_engine::StepTask;
use serde_json::Value;

use crate::client::{ChatModel, ChatRequest};

/// Chat model that returns a canned reply and records every request.
pub(crate) struct FakeModel {
    reply: Option<String>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl FakeModel {
    pub(crate) fn replying(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Some(reply.to_string()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn failing() -> Arc<Self> {
        Arc::new(Self {
            reply: None,
            requests: Mutex::new(Vec::new()),
        })
    }

    fn last_message(&self, role: &str) -> String {
        let requests = self.requests.lock().unwrap();
        let request = requests.last().expect("no request recorded");
        request
            .messages
            .iter()
            .rev()
            .find(|m| m.role == role)
            .map(|m| m.content.clone())
            .expect("no message with that role")
    }

    pub(crate) fn last_user_message(&self) -> String {
        self.last_message("user")
    }

    pub(crate) fn last_system_message(&self) -> String {
        self.last_message("system")
    }
}

#[async_trait]
impl ChatModel for FakeModel {
    async fn complete(&self, request: ChatRequest) -> Result<String> {
        self.requests.lock().unwrap().push(request);
        self.reply
            .clone()
            .ok_or_else(|| CadenceError::ConnectionError("model offline".to_string()))
    }
}

pub(crate) fn task(inputs: Value) -> StepTask {
    StepTask {
        step_id: "step-1".into(),
        goal: "the goal".into(),
        inputs: inputs.as_object().cloned().unwrap_or_else(StepInputs::new),
        work_unit: Default::default(),
    }
}
