//! Work-unit ledger.
//!
//! Tracks the lifecycle of every unit of work in an orchestration run: the
//! plan root, the planning call, each step and the finisher.

use std::collections::HashMap;

use cadence_core::{AgentResult, CadenceError, PlanStep, Result, WorkStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;
use uuid::Uuid;

/// A timestamped log line on a work unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    /// When the message was recorded.
    pub at: DateTime<Utc>,

    /// The message.
    pub message: String,
}

/// A tracked unit of work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkUnit {
    /// Unique identifier.
    pub id: Uuid,

    /// What this unit is doing.
    pub description: String,

    /// Handler (or planner) responsible for the work.
    pub handler: Option<String>,

    /// Enclosing unit, if any.
    pub parent_id: Option<Uuid>,

    /// Current lifecycle state.
    pub status: WorkStatus,

    /// Creation time.
    pub created_at: DateTime<Utc>,

    /// Time of the last mutation.
    pub updated_at: DateTime<Utc>,

    /// Free-form metadata.
    pub metadata: Map<String, Value>,

    /// Ordered log messages.
    pub logs: Vec<LogEntry>,

    /// Recorded result, if any.
    pub result: Option<AgentResult>,

    /// Plan accepted for this unit (plan roots only).
    pub steps: Vec<PlanStep>,
}

impl WorkUnit {
    fn new(
        description: String,
        handler: Option<String>,
        parent_id: Option<Uuid>,
        metadata: Map<String, Value>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            description,
            handler,
            parent_id,
            status: WorkStatus::Pending,
            created_at: now,
            updated_at: now,
            metadata,
            logs: Vec::new(),
            result: None,
            steps: Vec::new(),
        }
    }

    fn transition(&mut self, next: WorkStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(CadenceError::InvalidTransition {
                id: self.id,
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    fn append_log(&mut self, message: impl Into<String>) {
        let now = Utc::now();
        self.logs.push(LogEntry {
            at: now,
            message: message.into(),
        });
        self.updated_at = now;
    }
}

/// In-memory lifecycle tracker owned by a single orchestration run.
#[derive(Debug, Default)]
pub struct Ledger {
    units: HashMap<Uuid, WorkUnit>,
    /// Creation order, for stable child listings.
    order: Vec<Uuid>,
}

impl Ledger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a pending work unit.
    pub fn create(
        &mut self,
        description: impl Into<String>,
        handler: Option<&str>,
        parent_id: Option<Uuid>,
        metadata: Map<String, Value>,
    ) -> &WorkUnit {
        let unit = WorkUnit::new(
            description.into(),
            handler.map(str::to_string),
            parent_id,
            metadata,
        );
        let id = unit.id;
        debug!(work_unit = %id, handler = ?unit.handler, "work unit created");
        self.order.push(id);
        self.units.entry(id).or_insert(unit)
    }

    /// Mark a unit as running.
    pub fn start(&mut self, id: Uuid) -> Result<()> {
        self.require(id)?.transition(WorkStatus::Running)
    }

    /// Mark a unit as succeeded, recording its result.
    pub fn succeed(&mut self, id: Uuid, result: Option<AgentResult>) -> Result<()> {
        let unit = self.require(id)?;
        unit.transition(WorkStatus::Succeeded)?;
        unit.result = result;
        Ok(())
    }

    /// Mark a unit as failed.
    ///
    /// The error is logged first, and a failed result is recorded if the unit
    /// has none yet, so every failed unit explains itself.
    pub fn fail(&mut self, id: Uuid, error: impl Into<String>) -> Result<()> {
        let error = error.into();
        let unit = self.require(id)?;
        if !unit.status.can_transition_to(WorkStatus::Failed) {
            return Err(CadenceError::InvalidTransition {
                id,
                from: unit.status,
                to: WorkStatus::Failed,
            });
        }
        unit.append_log(error.clone());
        if unit.result.is_none() {
            unit.result = Some(AgentResult::failed(error));
        }
        unit.transition(WorkStatus::Failed)
    }

    /// Record a result without changing status.
    pub fn record_result(&mut self, id: Uuid, result: AgentResult) -> Result<()> {
        let unit = self.require(id)?;
        unit.result = Some(result);
        unit.updated_at = Utc::now();
        Ok(())
    }

    /// Append a log message.
    pub fn log(&mut self, id: Uuid, message: impl Into<String>) -> Result<()> {
        self.require(id)?.append_log(message);
        Ok(())
    }

    /// Record the plan accepted for a unit.
    pub fn set_steps(&mut self, id: Uuid, steps: Vec<PlanStep>) -> Result<()> {
        let unit = self.require(id)?;
        unit.steps = steps;
        unit.updated_at = Utc::now();
        Ok(())
    }

    /// Look up a unit.
    pub fn get(&self, id: Uuid) -> Option<&WorkUnit> {
        self.units.get(&id)
    }

    /// Direct children of a unit, in creation order.
    pub fn children_of(&self, parent_id: Uuid) -> Vec<&WorkUnit> {
        self.order
            .iter()
            .filter_map(|id| self.units.get(id))
            .filter(|unit| unit.parent_id == Some(parent_id))
            .collect()
    }

    /// Number of tracked units.
    pub fn len(&self) -> usize {
        self.units.len()
    }

    /// Returns true if no unit has been created.
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    fn require(&mut self, id: Uuid) -> Result<&mut WorkUnit> {
        self.units.get_mut(&id).ok_or_else(|| CadenceError::NotFound {
            resource_type: "work_unit".to_string(),
            id: id.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ledger_with_unit() -> (Ledger, Uuid) {
        let mut ledger = Ledger::new();
        let id = ledger.create("root", None, None, Map::new()).id;
        (ledger, id)
    }

    #[test]
    fn test_lifecycle() {
        let (mut ledger, id) = ledger_with_unit();
        assert_eq!(ledger.get(id).unwrap().status, WorkStatus::Pending);

        ledger.start(id).unwrap();
        assert_eq!(ledger.get(id).unwrap().status, WorkStatus::Running);

        ledger.succeed(id, Some(AgentResult::completed("done"))).unwrap();
        let unit = ledger.get(id).unwrap();
        assert_eq!(unit.status, WorkStatus::Succeeded);
        assert_eq!(unit.result.as_ref().unwrap().content(), "done");
    }

    #[test]
    fn test_fail_logs_and_records_result() {
        let (mut ledger, id) = ledger_with_unit();
        ledger.start(id).unwrap();
        ledger.fail(id, "handler exploded").unwrap();

        let unit = ledger.get(id).unwrap();
        assert_eq!(unit.status, WorkStatus::Failed);
        assert_eq!(unit.logs.len(), 1);
        assert_eq!(unit.logs[0].message, "handler exploded");
        assert_eq!(unit.result.as_ref().unwrap().error(), Some("handler exploded"));
    }

    #[test]
    fn test_fail_keeps_recorded_result() {
        let (mut ledger, id) = ledger_with_unit();
        ledger.start(id).unwrap();
        ledger
            .record_result(id, AgentResult::failed("rate limited"))
            .unwrap();
        ledger.fail(id, "rate limited").unwrap();

        let unit = ledger.get(id).unwrap();
        assert_eq!(unit.result.as_ref().unwrap().error(), Some("rate limited"));
        assert_eq!(unit.logs.len(), 1);
    }

    #[test]
    fn test_unknown_id_is_not_found() {
        let mut ledger = Ledger::new();
        let missing = Uuid::new_v4();

        assert!(matches!(ledger.start(missing), Err(CadenceError::NotFound { .. })));
        assert!(matches!(ledger.succeed(missing, None), Err(CadenceError::NotFound { .. })));
        assert!(matches!(ledger.fail(missing, "x"), Err(CadenceError::NotFound { .. })));
    }

    #[test]
    fn test_transitions_are_monotonic() {
        let (mut ledger, id) = ledger_with_unit();
        ledger.start(id).unwrap();
        ledger.succeed(id, None).unwrap();

        let err = ledger.start(id).unwrap_err();
        assert!(err.is_contract_violation());
        assert!(ledger.fail(id, "late").is_err());
        // a rejected fail leaves no trace
        assert!(ledger.get(id).unwrap().logs.is_empty());
    }

    #[test]
    fn test_pending_can_finish_directly() {
        let (mut ledger, id) = ledger_with_unit();
        ledger.succeed(id, None).unwrap();
        assert_eq!(ledger.get(id).unwrap().status, WorkStatus::Succeeded);
    }

    #[test]
    fn test_children_in_creation_order() {
        let (mut ledger, root) = ledger_with_unit();
        let a = ledger.create("a", Some("planner"), Some(root), Map::new()).id;
        let _other = ledger.create("other", None, None, Map::new()).id;
        let b = ledger.create("b", Some("writer"), Some(root), Map::new()).id;

        let children: Vec<Uuid> = ledger.children_of(root).iter().map(|u| u.id).collect();
        assert_eq!(children, vec![a, b]);
        assert_eq!(ledger.len(), 4);
    }

    #[test]
    fn test_set_steps_and_log() {
        let (mut ledger, id) = ledger_with_unit();
        ledger
            .set_steps(id, vec![PlanStep::new("step-1", "general", "answer")])
            .unwrap();
        ledger.log(id, "planned").unwrap();

        let unit = ledger.get(id).unwrap();
        assert_eq!(unit.steps.len(), 1);
        assert_eq!(unit.logs[0].message, "planned");
    }
}
