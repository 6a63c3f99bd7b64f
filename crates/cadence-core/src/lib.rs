//! # Cadence Core
//!
//! Core primitives shared by every Cadence crate.
//!
//! This crate provides the fundamental building blocks:
//! - [`PlanStep`] - One unit of scheduling in a plan
//! - [`ReferenceSpec`] - Pointer from a step input to an earlier step's output
//! - [`AgentResult`] - Normalized handler output
//! - [`CadenceError`] - Error taxonomy

pub mod error;
pub mod plan;
pub mod result;
pub mod types;

// Re-exports for convenience
pub use error::{CadenceError, Result};
pub use plan::{reference_target, PlanStep, ReferenceMode, ReferenceSpec, StepInputs, REFERENCE_SUFFIX};
pub use result::{AgentFailure, AgentOutput, AgentResult, Artifact};
pub use types::*;
