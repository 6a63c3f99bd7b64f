//! Plan and step types.
//!
//! A plan is an ordered list of [`PlanStep`]s. Step inputs are a JSON object;
//! keys ending in [`REFERENCE_SUFFIX`] hold a [`ReferenceSpec`] pointing at an
//! earlier step's output instead of a literal value.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Input mapping handed to a handler. Keeps insertion order.
pub type StepInputs = serde_json::Map<String, Value>;

/// Reserved suffix marking an input key as a reference.
pub const REFERENCE_SUFFIX: &str = "_from";

/// A single step inside an execution plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    /// Step identifier, unique within a plan.
    pub id: String,

    /// Name of the handler that runs this step.
    pub handler: String,

    /// Human-readable objective.
    pub goal: String,

    /// Raw inputs, possibly containing reference keys.
    #[serde(default)]
    pub inputs: StepInputs,
}

impl PlanStep {
    /// Create a step with no inputs.
    pub fn new(id: impl Into<String>, handler: impl Into<String>, goal: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            handler: handler.into(),
            goal: goal.into(),
            inputs: StepInputs::new(),
        }
    }

    /// Add an input value.
    pub fn with_input(mut self, key: impl Into<String>, value: Value) -> Self {
        self.inputs.insert(key.into(), value);
        self
    }

    /// Add a reference input: `<target>_from = spec`.
    pub fn with_reference(mut self, target: &str, spec: ReferenceSpec) -> Self {
        let value = serde_json::to_value(&spec).unwrap_or(Value::Null);
        self.inputs.insert(format!("{target}{REFERENCE_SUFFIX}"), value);
        self
    }
}

/// Returns the target field of a reference key, or `None` for literal keys.
pub fn reference_target(key: &str) -> Option<&str> {
    key.strip_suffix(REFERENCE_SUFFIX).filter(|target| !target.is_empty())
}

/// How multiple matching artifacts collapse into one value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceMode {
    /// The earliest attached match.
    First,
    /// The most recently attached match.
    Last,
    /// Every match, in attachment order.
    List,
}

impl ReferenceMode {
    /// Parse a mode name; unknown names yield `None`.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "first" => Some(ReferenceMode::First),
            "last" => Some(ReferenceMode::Last),
            "list" => Some(ReferenceMode::List),
            _ => None,
        }
    }
}

/// Declarative pointer from one step's input to a prior step's output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceSpec {
    /// Identifier of the step to read from.
    pub step: String,

    /// Restrict to artifacts of this kind.
    #[serde(default, alias = "artifact", skip_serializing_if = "Option::is_none")]
    pub capability_kind: Option<String>,

    /// Result field to read when no artifact kind applies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,

    /// How to collapse multiple artifact matches.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<ReferenceMode>,
}

impl ReferenceSpec {
    /// Reference a step with no overrides.
    pub fn step(step: impl Into<String>) -> Self {
        Self {
            step: step.into(),
            capability_kind: None,
            field: None,
            mode: None,
        }
    }

    /// Restrict to an artifact kind.
    pub fn kind(mut self, kind: impl Into<String>) -> Self {
        self.capability_kind = Some(kind.into());
        self
    }

    /// Read a named result field.
    pub fn field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    /// Set the collapse mode.
    pub fn mode(mut self, mode: ReferenceMode) -> Self {
        self.mode = Some(mode);
        self
    }

    /// Leniently read a spec from raw plan JSON.
    ///
    /// Accepts a bare step id string or an object with a non-empty `step`.
    /// Unknown modes and non-string overrides are ignored. Anything else
    /// yields `None`.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(step) if !step.is_empty() => Some(Self::step(step.clone())),
            Value::Object(map) => {
                let step = map.get("step")?.as_str().filter(|s| !s.is_empty())?;
                let text = |key: &str| {
                    map.get(key)
                        .and_then(Value::as_str)
                        .filter(|s| !s.is_empty())
                        .map(str::to_string)
                };
                Some(Self {
                    step: step.to_string(),
                    capability_kind: text("capability_kind").or_else(|| text("artifact")),
                    field: text("field"),
                    mode: map
                        .get("mode")
                        .and_then(Value::as_str)
                        .and_then(ReferenceMode::parse),
                })
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_reference_target() {
        assert_eq!(reference_target("references_from"), Some("references"));
        assert_eq!(reference_target("references"), None);
        assert_eq!(reference_target("_from"), None);
    }

    #[test]
    fn test_spec_from_string() {
        let spec = ReferenceSpec::from_value(&json!("step-1")).unwrap();
        assert_eq!(spec, ReferenceSpec::step("step-1"));
    }

    #[test]
    fn test_spec_from_object_with_alias() {
        let spec = ReferenceSpec::from_value(&json!({
            "step": "step-2",
            "artifact": "midi",
            "mode": "last"
        }))
        .unwrap();
        assert_eq!(spec.capability_kind.as_deref(), Some("midi"));
        assert_eq!(spec.mode, Some(ReferenceMode::Last));
        assert_eq!(spec.field, None);
    }

    #[test]
    fn test_spec_rejects_garbage() {
        assert!(ReferenceSpec::from_value(&json!(42)).is_none());
        assert!(ReferenceSpec::from_value(&json!({"field": "content"})).is_none());
        assert!(ReferenceSpec::from_value(&json!({"step": ""})).is_none());
        assert!(ReferenceSpec::from_value(&Value::Null).is_none());
    }

    #[test]
    fn test_unknown_mode_is_ignored() {
        let spec = ReferenceSpec::from_value(&json!({"step": "s", "mode": "median"})).unwrap();
        assert_eq!(spec.mode, None);
    }

    #[test]
    fn test_with_reference_round_trips() {
        let step = PlanStep::new("step-2", "analyst", "Analyze")
            .with_reference("references", ReferenceSpec::step("step-1").kind("documents"));
        let raw = step.inputs.get("references_from").unwrap();
        assert_eq!(raw, &json!({"step": "step-1", "capability_kind": "documents"}));
        assert_eq!(
            ReferenceSpec::from_value(raw),
            Some(ReferenceSpec::step("step-1").kind("documents"))
        );
    }
}
