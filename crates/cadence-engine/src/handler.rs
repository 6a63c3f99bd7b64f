//! Handler contract and registry.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use cadence_core::{AgentResult, Result, StepInputs};
use cadence_state::ConversationState;
use serde_json::Value;
use uuid::Uuid;

use crate::finisher::FinisherMaterial;

/// Input key carrying the finisher's brief.
pub const BRIEF_INPUT: &str = "brief";

/// What a handler is asked to do.
#[derive(Debug, Clone)]
pub struct StepTask {
    /// Plan step identifier ("finisher" for a finishing pass).
    pub step_id: String,

    /// Human-readable objective.
    pub goal: String,

    /// Concrete inputs with every reference already resolved.
    pub inputs: StepInputs,

    /// Ledger unit tracking this call.
    pub work_unit: Uuid,
}

impl StepTask {
    /// Input value, treating `null` as absent.
    pub fn input(&self, key: &str) -> Option<&Value> {
        self.inputs.get(key).filter(|v| !v.is_null())
    }

    /// Input as a non-empty string.
    pub fn input_str(&self, key: &str) -> Option<&str> {
        self.input(key)
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
    }
}

/// A named capability the engine can dispatch steps to.
///
/// Handlers are opaque to the engine: one call in, one [`AgentResult`] out.
/// Returning `Err` is the handler "raising"; the engine records it as a failed
/// step rather than propagating it.
#[async_trait]
pub trait Handler: Send + Sync {
    /// Registry key (must be unique).
    fn name(&self) -> &str;

    /// Short description, used in planning prompts.
    fn description(&self) -> &str;

    /// Execute the task against the shared conversation.
    async fn run(&self, task: &StepTask, context: &mut ConversationState) -> Result<AgentResult>;

    /// Inputs for a finishing pass. Defaults to the aggregated summary as `brief`.
    fn finisher_inputs(
        &self,
        material: &FinisherMaterial<'_>,
        _context: &ConversationState,
    ) -> StepInputs {
        let mut inputs = StepInputs::new();
        inputs.insert(
            BRIEF_INPUT.to_string(),
            Value::String(material.summary().to_string()),
        );
        inputs
    }
}

/// Handler registry for looking up handlers by name.
#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn Handler>>,
}

impl HandlerRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler, replacing any previous one with the same name.
    pub fn register(&mut self, handler: Arc<dyn Handler>) {
        self.handlers.insert(handler.name().to_string(), handler);
    }

    /// Register several handlers.
    pub fn register_all(&mut self, handlers: impl IntoIterator<Item = Arc<dyn Handler>>) {
        for handler in handlers {
            self.register(handler);
        }
    }

    /// Get a handler by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Handler>> {
        self.handlers.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.keys().cloned().collect();
        names.sort();
        names
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("handlers", &self.names())
            .finish()
    }
}
