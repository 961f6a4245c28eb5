//! Two-phase payload validation for workflow steps
//!
//! A step payload passes through two distinct phases:
//!
//! 1. **Structural validation** against an explicit [`Schema`] — types,
//!    ranges, enumerated values, nested shapes. Schema defaults fill
//!    into the validated output.
//! 2. **Completeness validation** — each workflow-required field name
//!    must be present in the *raw* input. A field can be schema-optional
//!    (it has a default) yet still required for a specific step to count
//!    as complete; the two phases deliberately read different sources.
//!
//! The result is always a [`CheckReport`] value. Validation failures are
//! data handed back to the caller, never errors propagated through
//! generic error handling — workflow-specific code decides whether to
//! re-prompt or mark the step failed.

#![deny(unsafe_code)]

pub mod schema;

pub use schema::{FieldKind, FieldSpec, Schema};

use serde::Serialize;
use serde_json::Value;

// ── Report ───────────────────────────────────────────────────────────

/// A single structural violation, with a JSON-path-style location
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Violation {
    /// Where in the payload the violation occurred (e.g. `$.items[2].qty`)
    pub path: String,
    /// What went wrong
    pub message: String,
}

impl Violation {
    fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Outcome of a validation run
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "error", rename_all = "snake_case")]
pub enum CheckReport {
    /// Both phases passed; `result` is the validated payload with
    /// schema defaults filled in
    #[serde(rename = "none")]
    Valid { result: Value },
    /// Structural validation failed
    #[serde(rename = "error")]
    Invalid { trace: Vec<Violation> },
    /// The shape was fine but workflow-required fields are missing
    /// from the raw input
    Incomplete { missing: Vec<String> },
}

impl CheckReport {
    /// Check whether the payload passed both phases
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid { .. })
    }

    /// The validated payload, if both phases passed
    pub fn result(&self) -> Option<&Value> {
        match self {
            Self::Valid { result } => Some(result),
            _ => None,
        }
    }

    /// Consume the report, yielding the validated payload
    pub fn into_result(self) -> Option<Value> {
        match self {
            Self::Valid { result } => Some(result),
            _ => None,
        }
    }
}

// ── Runner ───────────────────────────────────────────────────────────

/// Stateless two-phase validator
pub struct ChecksRunner;

impl ChecksRunner {
    /// Validate `data` against `schema`, then check that every name in
    /// `required` is present on the raw input.
    pub fn run(data: &Value, schema: &Schema, required: &[String]) -> CheckReport {
        let mut trace = Vec::new();
        let result = validate_object(data, schema, "$", &mut trace);
        if !trace.is_empty() {
            return CheckReport::Invalid { trace };
        }

        // Completeness reads the raw input, not the validated output:
        // a schema default must not satisfy a workflow requirement.
        let raw = data.as_object();
        let missing: Vec<String> = required
            .iter()
            .filter(|name| raw.map(|o| !o.contains_key(*name)).unwrap_or(true))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return CheckReport::Incomplete { missing };
        }

        CheckReport::Valid {
            result: result.unwrap_or(Value::Null),
        }
    }
}

fn validate_object(
    data: &Value,
    schema: &Schema,
    path: &str,
    trace: &mut Vec<Violation>,
) -> Option<Value> {
    let obj = match data.as_object() {
        Some(obj) => obj,
        None => {
            trace.push(Violation::new(path, "expected an object"));
            return None;
        }
    };

    // Undeclared keys are violations: the validated output becomes the
    // step's stored data, so nothing may pass through unvalidated.
    for key in obj.keys() {
        if !schema.fields.contains_key(key) {
            trace.push(Violation::new(
                format!("{}.{}", path, key),
                "unknown field",
            ));
        }
    }

    let mut out = serde_json::Map::new();
    for (name, spec) in &schema.fields {
        let field_path = format!("{}.{}", path, name);
        match obj.get(name) {
            Some(value) => {
                if let Some(valid) = validate_value(value, spec, &field_path, trace) {
                    out.insert(name.clone(), valid);
                }
            }
            None => {
                if let Some(default) = &spec.default {
                    out.insert(name.clone(), default.clone());
                } else if !spec.optional {
                    trace.push(Violation::new(field_path, "missing required field"));
                }
            }
        }
    }

    Some(Value::Object(out))
}

fn validate_value(
    value: &Value,
    spec: &FieldSpec,
    path: &str,
    trace: &mut Vec<Violation>,
) -> Option<Value> {
    if let Some(allowed) = &spec.one_of {
        if !allowed.contains(value) {
            trace.push(Violation::new(path, "value not in allowed set"));
            return None;
        }
    }

    match &spec.kind {
        FieldKind::String => {
            let s = match value.as_str() {
                Some(s) => s,
                None => {
                    trace.push(Violation::new(path, "expected a string"));
                    return None;
                }
            };
            check_len(s.chars().count(), spec, path, trace);
            Some(value.clone())
        }
        FieldKind::Integer => {
            let n = match value.as_i64() {
                Some(n) => n,
                None => {
                    trace.push(Violation::new(path, "expected an integer"));
                    return None;
                }
            };
            check_range(n as f64, spec, path, trace);
            Some(value.clone())
        }
        FieldKind::Number => {
            let n = match value.as_f64() {
                Some(n) => n,
                None => {
                    trace.push(Violation::new(path, "expected a number"));
                    return None;
                }
            };
            check_range(n, spec, path, trace);
            Some(value.clone())
        }
        FieldKind::Boolean => {
            if value.as_bool().is_none() {
                trace.push(Violation::new(path, "expected a boolean"));
                return None;
            }
            Some(value.clone())
        }
        FieldKind::Array(items) => {
            let arr = match value.as_array() {
                Some(arr) => arr,
                None => {
                    trace.push(Violation::new(path, "expected an array"));
                    return None;
                }
            };
            check_len(arr.len(), spec, path, trace);
            let mut out = Vec::with_capacity(arr.len());
            for (i, item) in arr.iter().enumerate() {
                let item_path = format!("{}[{}]", path, i);
                if let Some(valid) = validate_value(item, items, &item_path, trace) {
                    out.push(valid);
                }
            }
            Some(Value::Array(out))
        }
        FieldKind::Object(schema) => validate_object(value, schema, path, trace),
    }
}

fn check_range(n: f64, spec: &FieldSpec, path: &str, trace: &mut Vec<Violation>) {
    if let Some(min) = spec.min {
        if n < min {
            trace.push(Violation::new(path, format!("value below minimum {}", min)));
        }
    }
    if let Some(max) = spec.max {
        if n > max {
            trace.push(Violation::new(path, format!("value above maximum {}", max)));
        }
    }
}

fn check_len(len: usize, spec: &FieldSpec, path: &str, trace: &mut Vec<Violation>) {
    if let Some(min_len) = spec.min_len {
        if len < min_len {
            trace.push(Violation::new(
                path,
                format!("length below minimum {}", min_len),
            ));
        }
    }
    if let Some(max_len) = spec.max_len {
        if len > max_len {
            trace.push(Violation::new(
                path,
                format!("length above maximum {}", max_len),
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn person_schema() -> Schema {
        Schema::new()
            .field("name", FieldSpec::string().min_len(1))
            .field("age", FieldSpec::integer().with_default(18).min(0.0))
    }

    #[test]
    fn test_valid_payload() {
        let report = ChecksRunner::run(
            &json!({"name": "ada", "age": 37}),
            &person_schema(),
            &[],
        );
        assert!(report.is_valid());
        assert_eq!(report.result().unwrap(), &json!({"name": "ada", "age": 37}));
    }

    #[test]
    fn test_default_fills_validated_output() {
        let report = ChecksRunner::run(&json!({"name": "ada"}), &person_schema(), &[]);
        assert_eq!(report.result().unwrap(), &json!({"name": "ada", "age": 18}));
    }

    #[test]
    fn test_schema_optional_but_workflow_required() {
        // `age` has a default, so the schema accepts its absence. The
        // step declares it required, and completeness reads the raw
        // input where it is missing.
        let report = ChecksRunner::run(
            &json!({"name": "ada"}),
            &person_schema(),
            &["age".to_string()],
        );
        assert_eq!(
            report,
            CheckReport::Incomplete {
                missing: vec!["age".to_string()]
            }
        );
    }

    #[test]
    fn test_structural_failure_wins_over_completeness() {
        let report = ChecksRunner::run(
            &json!({"name": 42}),
            &person_schema(),
            &["age".to_string()],
        );
        assert!(matches!(report, CheckReport::Invalid { .. }));
    }

    #[test]
    fn test_type_violation_carries_path() {
        let report = ChecksRunner::run(&json!({"name": "ada", "age": "old"}), &person_schema(), &[]);
        match report {
            CheckReport::Invalid { trace } => {
                assert_eq!(trace.len(), 1);
                assert_eq!(trace[0].path, "$.age");
            }
            other => panic!("expected Invalid, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_field_rejected() {
        let report = ChecksRunner::run(
            &json!({"name": "ada", "nickname": "a"}),
            &person_schema(),
            &[],
        );
        match report {
            CheckReport::Invalid { trace } => {
                assert_eq!(trace[0].path, "$.nickname");
                assert_eq!(trace[0].message, "unknown field");
            }
            other => panic!("expected Invalid, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_required_field() {
        let report = ChecksRunner::run(&json!({"age": 4}), &person_schema(), &[]);
        match report {
            CheckReport::Invalid { trace } => {
                assert_eq!(trace[0].path, "$.name");
            }
            other => panic!("expected Invalid, got {:?}", other),
        }
    }

    #[test]
    fn test_non_object_payload() {
        let report = ChecksRunner::run(&json!([1, 2, 3]), &person_schema(), &[]);
        assert!(matches!(report, CheckReport::Invalid { .. }));

        // Structural failure is reported even against an empty schema.
        let report = ChecksRunner::run(&json!(null), &Schema::new(), &["x".to_string()]);
        assert!(matches!(report, CheckReport::Invalid { .. }));
    }

    #[test]
    fn test_nested_object_and_array() {
        let schema = Schema::new().field(
            "items",
            FieldSpec::array(FieldSpec::object(
                Schema::new()
                    .field("sku", FieldSpec::string())
                    .field("qty", FieldSpec::integer().min(1.0)),
            ))
            .min_len(1),
        );

        let report = ChecksRunner::run(
            &json!({"items": [{"sku": "tix-ga", "qty": 2}]}),
            &schema,
            &[],
        );
        assert!(report.is_valid());

        let report = ChecksRunner::run(&json!({"items": [{"sku": "tix-ga", "qty": 0}]}), &schema, &[]);
        match report {
            CheckReport::Invalid { trace } => {
                assert_eq!(trace[0].path, "$.items[0].qty");
            }
            other => panic!("expected Invalid, got {:?}", other),
        }
    }

    #[test]
    fn test_enumerated_values() {
        let schema = Schema::new().field(
            "tier",
            FieldSpec::string().one_of(vec![json!("standard"), json!("vip")]),
        );

        assert!(ChecksRunner::run(&json!({"tier": "vip"}), &schema, &[]).is_valid());
        assert!(matches!(
            ChecksRunner::run(&json!({"tier": "backstage"}), &schema, &[]),
            CheckReport::Invalid { .. }
        ));
    }

    #[test]
    fn test_report_serializes_with_error_tag() {
        let report = ChecksRunner::run(&json!({}), &Schema::new(), &["age".to_string()]);
        let encoded = serde_json::to_value(&report).unwrap();
        assert_eq!(encoded["error"], json!("incomplete"));
        assert_eq!(encoded["missing"], json!(["age"]));
    }

    #[test]
    fn test_multiple_violations_collected() {
        let report = ChecksRunner::run(&json!({"name": 1, "age": "x"}), &person_schema(), &[]);
        match report {
            CheckReport::Invalid { trace } => assert_eq!(trace.len(), 2),
            other => panic!("expected Invalid, got {:?}", other),
        }
    }
}
