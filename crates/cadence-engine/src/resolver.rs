//! Reference resolution.
//!
//! Plan steps pass data forward by naming an earlier step in an input key that
//! ends in `_from`. The resolver turns those keys into concrete values read
//! from the run's recorded step outputs. Misses resolve to `null`.

use std::collections::HashMap;

use cadence_core::{reference_target, AgentResult, ReferenceMode, ReferenceSpec, StepInputs};
use serde_json::Value;
use tracing::trace;

/// Results recorded so far in a run, keyed by step id.
pub type StepOutputs = HashMap<String, AgentResult>;

/// Where a reference reads its value from.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Source<'a> {
    /// Payloads of artifacts with this kind.
    Artifacts(&'a str),
    /// A named field of the result.
    Field(&'a str),
}

/// Effective configuration of a single reference.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Effective<'a> {
    source: Source<'a>,
    mode: ReferenceMode,
}

/// Per-target default table.
fn default_source(target: &str) -> (Source<'static>, ReferenceMode) {
    match target {
        "references" => (Source::Artifacts("documents"), ReferenceMode::List),
        "midi_summary" => (Source::Artifacts("midi"), ReferenceMode::Last),
        _ => (Source::Field("content"), ReferenceMode::Last),
    }
}

/// Merge the default table with the explicit overrides of `spec`.
fn effective<'a>(target: &str, spec: &'a ReferenceSpec) -> Effective<'a> {
    let (default, default_mode) = default_source(target);
    let source = match (spec.capability_kind.as_deref(), spec.field.as_deref()) {
        (Some(kind), _) => Source::Artifacts(kind),
        (None, Some(field)) => Source::Field(field),
        (None, None) => default,
    };
    Effective {
        source,
        mode: spec.mode.unwrap_or(default_mode),
    }
}

/// Resolve one reference for `target`.
pub fn resolve_reference(target: &str, raw: &Value, outputs: &StepOutputs) -> Value {
    let Some(spec) = ReferenceSpec::from_value(raw) else {
        trace!(target, "unusable reference");
        return Value::Null;
    };
    let Some(result) = outputs.get(&spec.step) else {
        trace!(target, step = %spec.step, "reference to a step without output");
        return Value::Null;
    };

    let config = effective(target, &spec);
    match config.source {
        Source::Field(field) => result.field(field),
        Source::Artifacts(kind) => {
            let mut payloads = result.artifacts_of_kind(kind).map(|a| &a.payload);
            match config.mode {
                ReferenceMode::First => payloads.next().cloned().unwrap_or(Value::Null),
                ReferenceMode::Last => payloads.last().cloned().unwrap_or(Value::Null),
                ReferenceMode::List => collect_payloads(payloads),
            }
        }
    }
}

/// Gather payloads into one list, in encounter order.
///
/// A lone array payload is returned as is rather than wrapped. No payloads
/// yields `null`.
pub(crate) fn collect_payloads<'v>(payloads: impl Iterator<Item = &'v Value>) -> Value {
    let mut payloads: Vec<Value> = payloads.cloned().collect();
    match payloads.len() {
        0 => Value::Null,
        1 if payloads[0].is_array() => payloads.swap_remove(0),
        _ => Value::Array(payloads),
    }
}

/// Combine a value already bound to a target with a newly resolved one.
///
/// Lists concatenate in encounter order, a scalar is appended to or
/// prepended onto a list, and between two scalars the newer wins. `null`
/// on either side yields the other side.
pub fn merge_values(existing: Value, incoming: Value) -> Value {
    match (existing, incoming) {
        (Value::Null, incoming) => incoming,
        (existing, Value::Null) => existing,
        (Value::Array(mut head), Value::Array(tail)) => {
            head.extend(tail);
            Value::Array(head)
        }
        (Value::Array(mut head), scalar) => {
            head.push(scalar);
            Value::Array(head)
        }
        (scalar, Value::Array(tail)) => {
            let mut list = Vec::with_capacity(tail.len() + 1);
            list.push(scalar);
            list.extend(tail);
            Value::Array(list)
        }
        (_, newer) => newer,
    }
}

/// Produce the concrete inputs for a step.
///
/// Reference keys are resolved and merged into their target field in input
/// order. Literal keys are copied as-is and overwrite whatever the target held.
pub fn resolve_inputs(raw: &StepInputs, outputs: &StepOutputs) -> StepInputs {
    let mut prepared = StepInputs::new();
    for (key, value) in raw {
        match reference_target(key) {
            Some(target) => {
                let resolved = resolve_reference(target, value, outputs);
                match prepared.get_mut(target) {
                    Some(slot) => {
                        let existing = slot.take();
                        *slot = merge_values(existing, resolved);
                    }
                    None => {
                        prepared.insert(target.to_string(), resolved);
                    }
                }
            }
            None => {
                prepared.insert(key.clone(), value.clone());
            }
        }
    }
    prepared
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_core::AgentOutput;
    use serde_json::json;

    fn outputs(entries: Vec<(&str, AgentResult)>) -> StepOutputs {
        entries
            .into_iter()
            .map(|(id, result)| (id.to_string(), result))
            .collect()
    }

    fn inputs(value: Value) -> StepInputs {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_unknown_and_forward_references_are_null() {
        let outputs = outputs(vec![("step-1", AgentResult::completed("done"))]);
        let resolved = resolve_inputs(
            &inputs(json!({
                "brief_from": "step-3",
                "focus_from": {"step": "step-2"},
                "prompt_from": 17,
            })),
            &outputs,
        );
        assert_eq!(resolved["brief"], Value::Null);
        assert_eq!(resolved["focus"], Value::Null);
        assert_eq!(resolved["prompt"], Value::Null);
    }

    #[test]
    fn test_default_field_is_content() {
        let outputs = outputs(vec![("step-1", AgentResult::completed("city pop notes"))]);
        let resolved = resolve_inputs(&inputs(json!({"brief_from": "step-1"})), &outputs);
        assert_eq!(resolved["brief"], "city pop notes");
    }

    #[test]
    fn test_list_mode_returns_payloads_in_order() {
        let result: AgentResult = AgentOutput::new("found")
            .with_artifact("documents", json!({"id": 1}))
            .with_artifact("midi", json!({"bpm": 90}))
            .with_artifact("documents", json!({"id": 2}))
            .with_artifact("documents", json!({"id": 3}))
            .into();
        let outputs = outputs(vec![("search", result)]);

        let resolved = resolve_reference("references", &json!({"step": "search"}), &outputs);
        assert_eq!(resolved, json!([{"id": 1}, {"id": 2}, {"id": 3}]));
    }

    #[test]
    fn test_single_list_payload_is_not_nested() {
        let result: AgentResult = AgentOutput::new("3 hits")
            .with_artifact("documents", json!(["a", "b", "c"]))
            .into();
        let outputs = outputs(vec![("step-1", result)]);

        let resolved = resolve_inputs(
            &inputs(json!({"references_from": {"step": "step-1"}})),
            &outputs,
        );
        assert_eq!(resolved["references"], json!(["a", "b", "c"]));
    }

    #[test]
    fn test_list_mode_keeps_each_array_payload() {
        let result: AgentResult = AgentOutput::new("two batches")
            .with_artifact("documents", json!(["a", "b"]))
            .with_artifact("documents", json!(["c"]))
            .into();
        let outputs = outputs(vec![("step-1", result)]);

        let resolved = resolve_reference("references", &json!({"step": "step-1"}), &outputs);
        assert_eq!(resolved, json!([["a", "b"], ["c"]]));
    }

    #[test]
    fn test_first_and_last_modes() {
        let result: AgentResult = AgentOutput::new("parsed")
            .with_artifact("midi", json!("early"))
            .with_artifact("midi", json!("late"))
            .into();
        let outputs = outputs(vec![("parse", result)]);

        assert_eq!(
            resolve_reference("midi_summary", &json!("parse"), &outputs),
            json!("late")
        );
        assert_eq!(
            resolve_reference("midi_summary", &json!({"step": "parse", "mode": "first"}), &outputs),
            json!("early")
        );
        assert_eq!(
            resolve_reference("midi_summary", &json!({"step": "parse", "mode": "list"}), &outputs),
            json!(["early", "late"])
        );
    }

    #[test]
    fn test_missing_artifact_is_null() {
        let outputs = outputs(vec![("step-1", AgentResult::completed("no docs"))]);
        assert_eq!(resolve_reference("references", &json!("step-1"), &outputs), Value::Null);
    }

    #[test]
    fn test_explicit_field_overrides_default_kind() {
        let result: AgentResult = AgentOutput::new("summary text")
            .with_artifact("documents", json!({"id": 1}))
            .into();
        let outputs = outputs(vec![("step-1", result)]);

        let resolved =
            resolve_reference("references", &json!({"step": "step-1", "field": "content"}), &outputs);
        assert_eq!(resolved, json!("summary text"));
    }

    #[test]
    fn test_explicit_kind_on_scalar_target_keeps_default_mode() {
        let result: AgentResult = AgentOutput::new("x")
            .with_artifact("documents", json!({"id": 1}))
            .with_artifact("documents", json!({"id": 2}))
            .into();
        let outputs = outputs(vec![("step-1", result)]);

        let spec = json!({"step": "step-1", "artifact": "documents"});
        assert_eq!(resolve_reference("brief", &spec, &outputs), json!({"id": 2}));

        let spec = json!({"step": "step-1", "artifact": "documents", "mode": "list"});
        assert_eq!(resolve_reference("brief", &spec, &outputs), json!([{"id": 1}, {"id": 2}]));
    }

    #[test]
    fn test_field_reads_error_and_unknown_fields() {
        let outputs = outputs(vec![("step-1", AgentResult::failed("timeout"))]);
        assert_eq!(
            resolve_reference("why", &json!({"step": "step-1", "field": "error"}), &outputs),
            json!("timeout")
        );
        assert_eq!(
            resolve_reference("why", &json!({"step": "step-1", "field": "mood"}), &outputs),
            Value::Null
        );
    }

    #[test]
    fn test_merge_order_follows_input_order() {
        let list_step: AgentResult = AgentOutput::new("")
            .with_artifact("documents", json!("a"))
            .with_artifact("documents", json!("b"))
            .into();
        let outputs = outputs(vec![("s1", list_step), ("s2", AgentResult::completed("c"))]);

        let mut list_first = StepInputs::new();
        list_first.insert("notes".into(), json!(["a", "b"]));
        list_first.insert("notes_from".into(), json!({"step": "s2"}));
        assert_eq!(resolve_inputs(&list_first, &outputs)["notes"], json!(["a", "b", "c"]));

        let mut scalar_first = StepInputs::new();
        scalar_first.insert("notes".into(), json!("c"));
        scalar_first.insert("notes_from".into(), json!({"step": "s1", "artifact": "documents"}));
        assert_eq!(resolve_inputs(&scalar_first, &outputs)["notes"], json!(["c", "a", "b"]));
    }

    #[test]
    fn test_merge_law() {
        assert_eq!(merge_values(json!([1]), json!([2, 3])), json!([1, 2, 3]));
        assert_eq!(merge_values(json!("old"), json!("new")), json!("new"));
        assert_eq!(merge_values(Value::Null, json!("x")), json!("x"));
        assert_eq!(merge_values(json!(["x"]), Value::Null), json!(["x"]));
    }

    #[test]
    fn test_literal_keys_pass_through_and_overwrite() {
        let outputs = outputs(vec![("step-1", AgentResult::completed("resolved"))]);
        let mut raw = StepInputs::new();
        raw.insert("brief_from".into(), json!("step-1"));
        raw.insert("brief".into(), json!("literal"));
        raw.insert("style".into(), json!({"tempo": "slow"}));

        let resolved = resolve_inputs(&raw, &outputs);
        assert_eq!(resolved["brief"], "literal");
        assert_eq!(resolved["style"], json!({"tempo": "slow"}));
    }
}
