//! Step execution.

use std::sync::Arc;

use cadence_core::{AgentResult, PlanStep, Result, StepInputs};
use cadence_state::{ConversationState, Ledger};
use serde_json::{json, Map, Value};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::handler::{Handler, HandlerRegistry, StepTask};
use crate::resolver::{resolve_inputs, StepOutputs};

/// A step that went through the executor.
#[derive(Debug, Clone)]
pub struct ExecutedStep {
    /// The plan step as written.
    pub step: PlanStep,

    /// Handler that actually ran (after fallback substitution).
    pub handler: String,

    /// Resolved inputs handed to the handler.
    pub inputs: StepInputs,

    /// The step's result.
    pub result: AgentResult,

    /// Ledger unit, absent when no handler could be found.
    pub work_unit: Option<Uuid>,
}

/// Per-run execution state threaded through every step.
#[derive(Debug)]
pub struct RunContext {
    /// Root work unit of the run.
    pub root_id: Uuid,

    /// Results recorded so far, read by the resolver.
    pub outputs: StepOutputs,

    /// Executed steps, in order.
    pub executed: Vec<ExecutedStep>,
}

impl RunContext {
    pub fn new(root_id: Uuid) -> Self {
        Self {
            root_id,
            outputs: StepOutputs::new(),
            executed: Vec::new(),
        }
    }

    /// The most recently executed step.
    pub fn last(&self) -> Option<&ExecutedStep> {
        self.executed.last()
    }

    fn record(&mut self, executed: ExecutedStep) -> &ExecutedStep {
        self.outputs
            .insert(executed.step.id.clone(), executed.result.clone());
        self.executed.push(executed);
        &self.executed[self.executed.len() - 1]
    }
}

/// One tracked handler call.
pub(crate) struct Invocation {
    /// Work-unit description.
    pub description: String,
    pub step_id: String,
    pub goal: String,
    pub inputs: StepInputs,
    /// Work-unit metadata.
    pub metadata: Map<String, Value>,
    /// Metadata on the assistant message appended on success.
    pub message_metadata: Map<String, Value>,
}

/// Runs plan steps against the handler registry.
pub struct StepExecutor<'a> {
    registry: &'a HandlerRegistry,
    fallback_handler: &'a str,
}

impl<'a> StepExecutor<'a> {
    pub fn new(registry: &'a HandlerRegistry, fallback_handler: &'a str) -> Self {
        Self {
            registry,
            fallback_handler,
        }
    }

    /// Look up a handler, substituting the fallback when it is not registered.
    pub fn resolve_handler(&self, name: &str) -> Option<Arc<dyn Handler>> {
        if let Some(handler) = self.registry.get(name) {
            return Some(handler);
        }
        warn!(
            handler = name,
            fallback = self.fallback_handler,
            "handler not registered, falling back"
        );
        self.registry.get(self.fallback_handler)
    }

    /// Execute one step and record it in `run`.
    ///
    /// Handler failures are captured in the returned result. Only ledger
    /// contract violations are returned as errors.
    pub async fn execute<'r>(
        &self,
        step: &PlanStep,
        run: &'r mut RunContext,
        ledger: &mut Ledger,
        context: &mut ConversationState,
    ) -> Result<&'r ExecutedStep> {
        let inputs = resolve_inputs(&step.inputs, &run.outputs);

        let Some(handler) = self.resolve_handler(&step.handler) else {
            error!(step_id = %step.id, handler = %step.handler, "no handler available");
            return Ok(run.record(ExecutedStep {
                step: step.clone(),
                handler: step.handler.clone(),
                inputs,
                result: AgentResult::failed(format!("No handler available for step {}", step.id)),
                work_unit: None,
            }));
        };

        let mut metadata = Map::new();
        metadata.insert("step_id".into(), json!(step.id));
        metadata.insert("inputs".into(), Value::Object(inputs.clone()));
        let mut message_metadata = Map::new();
        message_metadata.insert("step_id".into(), json!(step.id));

        let invocation = Invocation {
            description: step.goal.clone(),
            step_id: step.id.clone(),
            goal: step.goal.clone(),
            inputs: inputs.clone(),
            metadata,
            message_metadata,
        };
        let (result, unit_id) = invoke(handler.as_ref(), invocation, run.root_id, ledger, context).await?;

        Ok(run.record(ExecutedStep {
            step: step.clone(),
            handler: handler.name().to_string(),
            inputs,
            result,
            work_unit: Some(unit_id),
        }))
    }
}

/// Run a handler under a fresh child work unit of `parent`.
pub(crate) async fn invoke(
    handler: &dyn Handler,
    invocation: Invocation,
    parent: Uuid,
    ledger: &mut Ledger,
    context: &mut ConversationState,
) -> Result<(AgentResult, Uuid)> {
    let name = handler.name().to_string();
    let unit_id = ledger
        .create(
            invocation.description,
            Some(name.as_str()),
            Some(parent),
            invocation.metadata,
        )
        .id;
    ledger.start(unit_id)?;

    let task = StepTask {
        step_id: invocation.step_id,
        goal: invocation.goal,
        inputs: invocation.inputs,
        work_unit: unit_id,
    };
    info!(step_id = %task.step_id, handler = %name, "running handler");

    let result = match handler.run(&task, context).await {
        Ok(result) if result.is_ok() => {
            ledger.succeed(unit_id, Some(result.clone()))?;
            context.add_agent_message(&name, result.content(), invocation.message_metadata);
            debug!(step_id = %task.step_id, handler = %name, "handler succeeded");
            result
        }
        Ok(result) => {
            let message = result.error().unwrap_or_default().to_string();
            warn!(step_id = %task.step_id, handler = %name, error = %message, "handler returned a failure");
            ledger.record_result(unit_id, result.clone())?;
            ledger.fail(unit_id, message)?;
            result
        }
        Err(e) => {
            error!(step_id = %task.step_id, handler = %name, error = %e, "handler raised");
            ledger.fail(unit_id, e.to_string())?;
            AgentResult::failed(e.to_string())
        }
    };
    Ok((result, unit_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use cadence_core::{AgentOutput, CadenceError, ReferenceSpec, Role, WorkStatus};

    /// Echoes its inputs back as a JSON artifact.
    struct Echo;

    #[async_trait]
    impl Handler for Echo {
        fn name(&self) -> &str {
            "general"
        }

        fn description(&self) -> &str {
            "echo"
        }

        async fn run(&self, task: &StepTask, _context: &mut ConversationState) -> Result<AgentResult> {
            Ok(AgentOutput::new(format!("echo: {}", task.goal))
                .with_artifact("inputs", Value::Object(task.inputs.clone()))
                .into())
        }
    }

    struct Broken;

    #[async_trait]
    impl Handler for Broken {
        fn name(&self) -> &str {
            "broken"
        }

        fn description(&self) -> &str {
            "always raises"
        }

        async fn run(&self, _task: &StepTask, _context: &mut ConversationState) -> Result<AgentResult> {
            Err(CadenceError::handler("broken", "socket closed"))
        }
    }

    struct Setup {
        registry: HandlerRegistry,
        ledger: Ledger,
        context: ConversationState,
        run: RunContext,
    }

    fn setup(handlers: Vec<Arc<dyn Handler>>) -> Setup {
        let mut registry = HandlerRegistry::new();
        registry.register_all(handlers);
        let mut ledger = Ledger::new();
        let root = ledger.create("root", None, None, Map::new()).id;
        Setup {
            registry,
            ledger,
            context: ConversationState::default(),
            run: RunContext::new(root),
        }
    }

    #[tokio::test]
    async fn test_success_is_recorded_everywhere() {
        let mut s = setup(vec![Arc::new(Echo)]);
        let executor = StepExecutor::new(&s.registry, "general");
        let step = PlanStep::new("step-1", "general", "say hi");

        let executed = executor
            .execute(&step, &mut s.run, &mut s.ledger, &mut s.context)
            .await
            .unwrap();
        let unit_id = executed.work_unit.unwrap();
        assert!(executed.result.is_ok());

        let unit = s.ledger.get(unit_id).unwrap();
        assert_eq!(unit.status, WorkStatus::Succeeded);
        assert_eq!(unit.metadata["step_id"], "step-1");
        assert_eq!(unit.parent_id, Some(s.run.root_id));

        let message = s.context.iter_messages(None).last().unwrap();
        assert_eq!(message.role, Role::Assistant);
        assert_eq!(message.speaker(), "general");
        assert_eq!(message.metadata["step_id"], "step-1");
        assert!(s.run.outputs.contains_key("step-1"));
    }

    #[tokio::test]
    async fn test_unknown_handler_falls_back() {
        let mut s = setup(vec![Arc::new(Echo)]);
        let executor = StepExecutor::new(&s.registry, "general");
        let step = PlanStep::new("step-1", "lyricist", "write");

        let executed = executor
            .execute(&step, &mut s.run, &mut s.ledger, &mut s.context)
            .await
            .unwrap();
        assert_eq!(executed.handler, "general");
        assert_eq!(executed.step.handler, "lyricist");
        assert!(executed.result.is_ok());
    }

    #[tokio::test]
    async fn test_no_handler_at_all() {
        let mut s = setup(vec![]);
        let executor = StepExecutor::new(&s.registry, "general");
        let step = PlanStep::new("step-7", "lyricist", "write");

        let executed = executor
            .execute(&step, &mut s.run, &mut s.ledger, &mut s.context)
            .await
            .unwrap();
        assert_eq!(executed.result.error(), Some("No handler available for step step-7"));
        assert!(executed.work_unit.is_none());
        assert_eq!(s.ledger.len(), 1);
        assert!(s.context.is_empty());
    }

    #[tokio::test]
    async fn test_raising_handler_fails_its_unit() {
        let mut s = setup(vec![Arc::new(Broken)]);
        let executor = StepExecutor::new(&s.registry, "general");
        let step = PlanStep::new("step-1", "broken", "try");

        let executed = executor
            .execute(&step, &mut s.run, &mut s.ledger, &mut s.context)
            .await
            .unwrap();
        let error = executed.result.error().unwrap().to_string();
        assert!(error.contains("socket closed"));

        let unit = s.ledger.get(executed.work_unit.unwrap()).unwrap();
        assert_eq!(unit.status, WorkStatus::Failed);
        assert_eq!(unit.logs[0].message, error);
        assert!(s.context.is_empty());
        assert_eq!(s.run.outputs["step-1"].error(), Some(error.as_str()));
    }

    #[tokio::test]
    async fn test_inputs_resolve_against_earlier_steps() {
        let mut s = setup(vec![Arc::new(Echo)]);
        let executor = StepExecutor::new(&s.registry, "general");
        let first = PlanStep::new("step-1", "general", "find");
        let second = PlanStep::new("step-2", "general", "use")
            .with_reference("brief", ReferenceSpec::step("step-1"))
            .with_reference("focus", ReferenceSpec::step("step-3"));

        executor
            .execute(&first, &mut s.run, &mut s.ledger, &mut s.context)
            .await
            .unwrap();
        let executed = executor
            .execute(&second, &mut s.run, &mut s.ledger, &mut s.context)
            .await
            .unwrap();

        assert_eq!(executed.inputs["brief"], "echo: find");
        assert_eq!(executed.inputs["focus"], Value::Null);
        assert_eq!(s.run.last().unwrap().step.id, "step-2");
    }
}
