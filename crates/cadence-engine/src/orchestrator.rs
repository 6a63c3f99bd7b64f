//! The orchestration loop.

use std::path::PathBuf;
use std::sync::Arc;

use cadence_core::{AgentResult, PlanStep, Result, StepInputs};
use cadence_planner::{ParsedPlan, PlanParser, PlanRequest, Planner};
use cadence_state::{ConversationState, Ledger, Message};
use serde_json::{json, Map, Value};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::executor::{RunContext, StepExecutor};
use crate::finisher::finalize;
use crate::handler::{Handler, HandlerRegistry};
use crate::trace::{Trace, TraceEntry};

/// Attachment naming a trace destination.
pub const TRACE_PATH_ATTACHMENT: &str = "trace_path";

const PLANNING_GOAL: &str = "Plan user request";
const PLANNING_STEP_ID: &str = "plan";
const NO_TASKS: &str = "No tasks generated";
const NO_RESULT: &str = "No handler produced a result";

/// One user request to run.
#[derive(Debug, Clone, Default)]
pub struct RunRequest {
    /// The user's goal.
    pub input: String,

    /// Attachments written into the conversation before the run.
    pub attachments: Map<String, Value>,

    /// Planner instructions for this run.
    pub system_prompt: Option<String>,

    /// Where to write the trace.
    pub trace_path: Option<PathBuf>,
}

impl RunRequest {
    pub fn new(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            ..Default::default()
        }
    }

    /// Add an attachment.
    pub fn attachment(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attachments.insert(key.into(), value.into());
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn trace_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.trace_path = Some(path.into());
        self
    }
}

/// What a run produced.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// Final result; content on success, a non-empty error on failure.
    pub result: AgentResult,

    /// Full trace of the run.
    pub trace: Trace,

    /// Root work unit in the ledger.
    pub root_id: Uuid,
}

/// Coordinates planning, step execution and finishing.
///
/// One run at a time: [`Orchestrator::handle_request`] takes `&mut self`.
/// Independent runs need independent orchestrators.
///
/// The ledger and the conversation live across runs. Each run adds a root
/// work unit plus its children, and nothing is pruned; long sessions call
/// [`Orchestrator::take_ledger`] to release finished units.
pub struct Orchestrator {
    config: EngineConfig,
    registry: HandlerRegistry,
    planner: Option<Arc<dyn Planner>>,
    ledger: Ledger,
    context: ConversationState,
}

impl Orchestrator {
    /// Create an orchestrator with no handlers and no planner.
    pub fn new(config: EngineConfig) -> Self {
        let context = ConversationState::new(config.max_messages);
        Self {
            config,
            registry: HandlerRegistry::new(),
            planner: None,
            ledger: Ledger::new(),
            context,
        }
    }

    /// Use a planner. Without one every request becomes a single fallback step.
    pub fn with_planner(mut self, planner: Arc<dyn Planner>) -> Self {
        self.planner = Some(planner);
        self
    }

    /// Register handlers.
    pub fn with_handlers(mut self, handlers: impl IntoIterator<Item = Arc<dyn Handler>>) -> Self {
        self.registry.register_all(handlers);
        self
    }

    pub fn register_handler(&mut self, handler: Arc<dyn Handler>) {
        self.registry.register(handler);
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Hand over the ledger and start an empty one.
    pub fn take_ledger(&mut self) -> Ledger {
        std::mem::take(&mut self.ledger)
    }

    pub fn context(&self) -> &ConversationState {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut ConversationState {
        &mut self.context
    }

    /// Run one request end to end.
    ///
    /// Planning, handler and finisher failures end up in the returned result.
    /// Only ledger contract violations are returned as errors.
    pub async fn handle_request(&mut self, request: RunRequest) -> Result<RunOutcome> {
        let RunRequest {
            input,
            attachments,
            system_prompt,
            trace_path,
        } = request;

        for (key, value) in &attachments {
            self.context.set_attachment(key.clone(), value.clone());
        }
        let keys: Vec<&String> = attachments.keys().collect();
        let mut metadata = Map::new();
        metadata.insert("attachments".into(), json!(keys));
        self.context.add_user_message(input.clone(), metadata);

        let trace_target = trace_path
            .or_else(|| {
                self.context
                    .attachment_str(TRACE_PATH_ATTACHMENT)
                    .map(PathBuf::from)
            })
            .or_else(|| self.config.trace_path.clone());

        let mut trace = Trace::new(input.clone(), &attachments);
        let root_id = self.ledger.create(input.clone(), None, None, Map::new()).id;
        info!(run_id = %trace.run_id, work_unit = %root_id, "handling request");

        let plan = self
            .acquire_plan(root_id, &input, system_prompt, &mut trace)
            .await?;
        if plan.len() > self.config.max_steps {
            debug!(
                planned = plan.len(),
                max_steps = self.config.max_steps,
                "plan exceeds step cap"
            );
        }

        let mut run = RunContext::new(root_id);
        let executor = StepExecutor::new(&self.registry, &self.config.fallback_handler);
        for step in plan.iter().take(self.config.max_steps) {
            let executed = executor
                .execute(step, &mut run, &mut self.ledger, &mut self.context)
                .await?;
            trace.steps.push(TraceEntry::new(
                executed.step.id.as_str(),
                executed.handler.as_str(),
                executed.step.goal.as_str(),
                &executed.inputs,
                Some(&executed.result),
            ));
            if !executed.result.is_ok() {
                info!(step_id = %executed.step.id, "step failed, stopping");
                break;
            }
        }

        let finalized = finalize(
            &self.config,
            &self.registry,
            &run,
            &input,
            &mut self.ledger,
            &mut self.context,
        )
        .await?;
        let (result, finisher) = match finalized {
            Some(finalized) => {
                trace.finisher = finalized.entry;
                (finalized.result, finalized.finisher)
            }
            None if plan.is_empty() => (AgentResult::failed(NO_TASKS), None),
            None => (AgentResult::failed(NO_RESULT), None),
        };

        if result.is_ok() {
            let answered_by = finisher
                .or_else(|| run.last().map(|e| e.handler.clone()))
                .unwrap_or_default();
            let mut metadata = Map::new();
            metadata.insert("work_unit".into(), json!(root_id.to_string()));
            metadata.insert("finisher".into(), json!(answered_by));
            self.context
                .add_agent_message("orchestrator", result.content(), metadata);
            self.ledger.succeed(root_id, Some(result.clone()))?;
        } else {
            self.ledger
                .fail(root_id, result.error().unwrap_or_default())?;
        }

        trace.finish(&result);
        if let Some(path) = trace_target {
            match trace.persist(&path).await {
                Ok(()) => debug!(path = %path.display(), "trace written"),
                Err(e) => warn!(path = %path.display(), error = %e, "failed to write trace"),
            }
        }
        info!(run_id = %trace.run_id, ok = result.is_ok(), "request finished");

        Ok(RunOutcome {
            result,
            trace,
            root_id,
        })
    }

    /// Obtain and store the plan for a run.
    async fn acquire_plan(
        &mut self,
        root_id: Uuid,
        goal: &str,
        system_prompt: Option<String>,
        trace: &mut Trace,
    ) -> Result<Vec<PlanStep>> {
        let parser = PlanParser::new(self.config.fallback_handler.as_str());
        let Some(planner) = self.planner.clone() else {
            debug!("no planner configured, using fallback step");
            let steps = vec![parser.fallback_step("step-1", goal)];
            self.ledger.set_steps(root_id, steps.clone())?;
            return Ok(steps);
        };

        let mut inputs = StepInputs::new();
        inputs.insert("system_prompt".into(), json!(system_prompt));
        let unit_id = self
            .ledger
            .create(PLANNING_GOAL, Some(planner.name()), Some(root_id), inputs.clone())
            .id;
        self.ledger.start(unit_id)?;

        let history: Vec<Message> = self
            .context
            .iter_messages(Some(self.config.history_window))
            .cloned()
            .collect();
        let request = PlanRequest::new(goal)
            .with_history(history)
            .with_system_prompt(system_prompt);

        let result = match planner.plan(&request).await {
            Ok(result) if result.is_ok() => {
                self.ledger.succeed(unit_id, Some(result.clone()))?;
                result
            }
            Ok(result) => {
                let message = result.error().unwrap_or_default().to_string();
                warn!(planner = planner.name(), error = %message, "planner returned a failure");
                self.ledger.record_result(unit_id, result.clone())?;
                self.ledger.fail(unit_id, message)?;
                result
            }
            Err(e) => {
                error!(planner = planner.name(), error = %e, "planner failed");
                self.ledger.fail(unit_id, e.to_string())?;
                AgentResult::failed(e.to_string())
            }
        };
        trace.planner = Some(TraceEntry::new(
            PLANNING_STEP_ID,
            planner.name(),
            PLANNING_GOAL,
            &inputs,
            Some(&result),
        ));

        let steps = if result.is_ok() {
            match parser.parse_result(&result, goal) {
                ParsedPlan::Steps(steps) => steps,
                ParsedPlan::Empty => {
                    info!("planner returned no tasks");
                    Vec::new()
                }
                ParsedPlan::Unparsable => {
                    warn!("planner output unusable, using fallback step");
                    vec![parser.fallback_step("step-1", goal)]
                }
            }
        } else {
            vec![parser.fallback_step("fallback-1", goal)]
        };
        info!(steps = steps.len(), "plan accepted");
        self.ledger.set_steps(root_id, steps.clone())?;
        Ok(steps)
    }
}
