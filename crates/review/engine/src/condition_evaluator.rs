//! Condition evaluator: pure boolean evaluation over JSON data
//!
//! Missing fields make comparisons false rather than failing. A value of
//! the wrong type (an object compared with a number, say) is an error so
//! the rule can be reported instead of silently skipped.

use review_types::Condition;
use serde_json::Value;
use std::collections::BTreeMap;

/// Key under which stage context is exposed to conditions
pub const CONTEXT_KEY: &str = "_context";

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConditionError {
    #[error("Field '{field}' expected {expected}, found {found}")]
    TypeMismatch {
        field: String,
        expected: &'static str,
        found: &'static str,
    },
}

pub struct ConditionEvaluator;

impl ConditionEvaluator {
    pub fn evaluate(condition: &Condition, data: &Value) -> Result<bool, ConditionError> {
        match condition {
            Condition::Always => Ok(true),
            Condition::Eq { field, value } => {
                Ok(lookup(data, field).map(|v| values_equal(v, value)).unwrap_or(false))
            }
            Condition::Ne { field, value } => {
                Ok(!lookup(data, field).map(|v| values_equal(v, value)).unwrap_or(false))
            }
            Condition::Gt { field, value } => compare(data, field, |x| x > *value),
            Condition::Gte { field, value } => compare(data, field, |x| x >= *value),
            Condition::Lt { field, value } => compare(data, field, |x| x < *value),
            Condition::Lte { field, value } => compare(data, field, |x| x <= *value),
            Condition::In { field, values } => Ok(lookup(data, field)
                .map(|v| values.iter().any(|candidate| values_equal(v, candidate)))
                .unwrap_or(false)),
            Condition::Contains { field, value } => match lookup(data, field) {
                None | Some(Value::Null) => Ok(false),
                Some(Value::String(s)) => match value {
                    Value::String(needle) => Ok(s.contains(needle.as_str())),
                    other => Err(ConditionError::TypeMismatch {
                        field: field.clone(),
                        expected: "string needle",
                        found: type_name(other),
                    }),
                },
                Some(Value::Array(items)) => Ok(items.iter().any(|item| values_equal(item, value))),
                Some(other) => Err(ConditionError::TypeMismatch {
                    field: field.clone(),
                    expected: "string or array",
                    found: type_name(other),
                }),
            },
            Condition::Exists { field } => {
                Ok(matches!(lookup(data, field), Some(v) if !v.is_null()))
            }
            Condition::All { conditions } => {
                for c in conditions {
                    if !Self::evaluate(c, data)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Condition::Any { conditions } => {
                for c in conditions {
                    if Self::evaluate(c, data)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Condition::Not { condition } => Ok(!Self::evaluate(condition, data)?),
        }
    }

    /// Values of every field the condition reads; missing fields are null
    pub fn inputs(condition: &Condition, data: &Value) -> BTreeMap<String, Value> {
        condition
            .referenced_fields()
            .into_iter()
            .map(|f| (f.to_string(), lookup(data, f).cloned().unwrap_or(Value::Null)))
            .collect()
    }
}

/// Resolve a dotted path; numeric segments index into arrays
pub fn lookup<'a>(data: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = data;
    for segment in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

fn compare(data: &Value, field: &str, op: impl Fn(f64) -> bool) -> Result<bool, ConditionError> {
    match lookup(data, field) {
        None | Some(Value::Null) => Ok(false),
        Some(v) => as_number(v)
            .map(op)
            .ok_or_else(|| ConditionError::TypeMismatch {
                field: field.to_string(),
                expected: "number",
                found: type_name(v),
            }),
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn values_equal(actual: &Value, expected: &Value) -> bool {
    match (actual, expected) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        _ => actual == expected,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn eval(condition: Condition, data: Value) -> Result<bool, ConditionError> {
        ConditionEvaluator::evaluate(&condition, &data)
    }

    #[test]
    fn test_numeric_comparisons() {
        let data = json!({"risk_score": 9, "limit": "12.5"});
        assert!(eval(Condition::gt("risk_score", 7.0), data.clone()).unwrap());
        assert!(!eval(Condition::gt("risk_score", 9.0), data.clone()).unwrap());
        assert!(eval(Condition::gte("risk_score", 9.0), data.clone()).unwrap());
        assert!(eval(Condition::lt("limit", 13.0), data.clone()).unwrap());
        assert!(!eval(Condition::gt("missing", 1.0), data).unwrap());
    }

    #[test]
    fn test_type_mismatch_is_error() {
        let err = eval(Condition::gt("address", 1.0), json!({"address": {"city": "Oslo"}}))
            .unwrap_err();
        assert!(matches!(err, ConditionError::TypeMismatch { expected: "number", .. }));
    }

    #[test]
    fn test_equality_and_membership() {
        let data = json!({"country": "NO", "tier": 2, "tags": ["pep", "fast"]});
        assert!(eval(Condition::eq("tier", 2.0), data.clone()).unwrap());
        assert!(eval(
            Condition::In {
                field: "country".into(),
                values: vec![json!("SE"), json!("NO")]
            },
            data.clone()
        )
        .unwrap());
        assert!(eval(
            Condition::Contains {
                field: "tags".into(),
                value: json!("pep")
            },
            data.clone()
        )
        .unwrap());
        assert!(eval(
            Condition::Ne {
                field: "missing".into(),
                value: json!(1)
            },
            data
        )
        .unwrap());
    }

    #[test]
    fn test_nested_paths_and_combinators() {
        let data = json!({"vendor": {"contacts": [{"email": "a@x.io"}]}, "_context": {"stage": "review"}});
        assert_eq!(
            lookup(&data, "vendor.contacts.0.email"),
            Some(&json!("a@x.io"))
        );
        let cond = Condition::all(vec![
            Condition::exists("vendor.contacts.0.email"),
            Condition::eq("_context.stage", "review"),
            Condition::negate(Condition::exists("vendor.phone")),
        ]);
        assert!(eval(cond, data.clone()).unwrap());
        assert!(!eval(Condition::any(vec![]), data.clone()).unwrap());
        assert!(eval(Condition::all(vec![]), data).unwrap());
    }

    #[test]
    fn test_inputs_capture_missing_as_null() {
        let cond = Condition::all(vec![Condition::gt("risk_score", 7.0), Condition::exists("x")]);
        let inputs = ConditionEvaluator::inputs(&cond, &json!({"risk_score": 9}));
        assert_eq!(inputs.get("risk_score"), Some(&json!(9)));
        assert_eq!(inputs.get("x"), Some(&Value::Null));
    }
}
