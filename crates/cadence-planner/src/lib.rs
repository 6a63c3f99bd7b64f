//! # Cadence Planner
//!
//! Planning contract and plan parsing for the Cadence orchestrator.

pub mod parse;
pub mod planner;

pub use parse::{ParsedPlan, PlanParser, PLAN_ARTIFACT_KIND, PROMPT_INPUT};
pub use planner::{PlanRequest, Planner, StaticPlanner};
