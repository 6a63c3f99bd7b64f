//! # Cadence Engine
//!
//! Executes plans against a registry of handlers.
//!
//! A run flows through:
//! - plan acquisition ([`Orchestrator`] + a [`cadence_planner::Planner`])
//! - reference resolution ([`resolve_inputs`])
//! - sequential step execution ([`StepExecutor`])
//! - finisher selection ([`select_finisher`])
//! - tracing ([`Trace`])

pub mod config;
pub mod executor;
pub mod finisher;
pub mod handler;
pub mod orchestrator;
pub mod resolver;
pub mod trace;

pub use config::EngineConfig;
pub use executor::{ExecutedStep, RunContext, StepExecutor};
pub use finisher::{
    select_finisher, summarize, FinisherMaterial, FINISHER_GOAL, FINISHER_STEP_ID,
    PREFERRED_FINISHER,
};
pub use handler::{Handler, HandlerRegistry, StepTask, BRIEF_INPUT};
pub use orchestrator::{Orchestrator, RunOutcome, RunRequest, TRACE_PATH_ATTACHMENT};
pub use resolver::{merge_values, resolve_inputs, resolve_reference, StepOutputs};
pub use trace::{sanitize, Trace, TraceEntry, TraceStatus};
