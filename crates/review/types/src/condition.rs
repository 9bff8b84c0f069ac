//! Rule and guard conditions
//!
//! Conditions are predicates over an entity's data document. Fields are
//! addressed with dotted paths (`address.country`). The set of operators
//! is closed; evaluation lives in the engine's condition evaluator.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A declarative predicate over entity data and stage context
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Condition {
    /// Always satisfied
    Always,

    /// Field equals a value
    Eq { field: String, value: Value },

    /// Field differs from a value (a missing field counts as different)
    Ne { field: String, value: Value },

    /// Numeric field is greater than a threshold
    Gt { field: String, value: f64 },

    /// Numeric field is greater than or equal to a threshold
    Gte { field: String, value: f64 },

    /// Numeric field is less than a threshold
    Lt { field: String, value: f64 },

    /// Numeric field is less than or equal to a threshold
    Lte { field: String, value: f64 },

    /// Field equals one of the listed values
    In { field: String, values: Vec<Value> },

    /// String field contains a substring, or array field contains an element
    Contains { field: String, value: Value },

    /// Field is present and not null
    Exists { field: String },

    /// Every sub-condition holds
    All { conditions: Vec<Condition> },

    /// At least one sub-condition holds
    Any { conditions: Vec<Condition> },

    /// The sub-condition does not hold
    Not { condition: Box<Condition> },
}

impl Default for Condition {
    fn default() -> Self {
        Self::Always
    }
}

impl Condition {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Eq {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn gt(field: impl Into<String>, value: f64) -> Self {
        Self::Gt {
            field: field.into(),
            value,
        }
    }

    pub fn gte(field: impl Into<String>, value: f64) -> Self {
        Self::Gte {
            field: field.into(),
            value,
        }
    }

    pub fn lt(field: impl Into<String>, value: f64) -> Self {
        Self::Lt {
            field: field.into(),
            value,
        }
    }

    pub fn exists(field: impl Into<String>) -> Self {
        Self::Exists {
            field: field.into(),
        }
    }

    pub fn all(conditions: Vec<Condition>) -> Self {
        Self::All { conditions }
    }

    pub fn any(conditions: Vec<Condition>) -> Self {
        Self::Any { conditions }
    }

    pub fn negate(condition: Condition) -> Self {
        Self::Not {
            condition: Box::new(condition),
        }
    }

    /// Field paths this condition reads, in first-seen order without repeats
    pub fn referenced_fields(&self) -> Vec<&str> {
        let mut fields = Vec::new();
        self.collect_fields(&mut fields);
        fields
    }

    fn collect_fields<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Self::Always => {}
            Self::Eq { field, .. }
            | Self::Ne { field, .. }
            | Self::Gt { field, .. }
            | Self::Gte { field, .. }
            | Self::Lt { field, .. }
            | Self::Lte { field, .. }
            | Self::In { field, .. }
            | Self::Contains { field, .. }
            | Self::Exists { field } => {
                if !out.contains(&field.as_str()) {
                    out.push(field.as_str());
                }
            }
            Self::All { conditions } | Self::Any { conditions } => {
                for c in conditions {
                    c.collect_fields(out);
                }
            }
            Self::Not { condition } => condition.collect_fields(out),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_condition_json_shape() {
        let cond: Condition =
            serde_json::from_value(json!({"op": "gt", "field": "risk_score", "value": 7}))
                .unwrap();
        assert_eq!(cond, Condition::gt("risk_score", 7.0));

        let nested: Condition = serde_json::from_value(json!({
            "op": "all",
            "conditions": [
                {"op": "exists", "field": "vendor.email"},
                {"op": "not", "condition": {"op": "eq", "field": "country", "value": "US"}}
            ]
        }))
        .unwrap();
        assert!(matches!(nested, Condition::All { ref conditions } if conditions.len() == 2));
    }

    #[test]
    fn test_referenced_fields_deduplicated() {
        let cond = Condition::any(vec![
            Condition::gt("risk_score", 7.0),
            Condition::all(vec![
                Condition::exists("country"),
                Condition::lt("risk_score", 2.0),
            ]),
        ]);
        assert_eq!(cond.referenced_fields(), vec!["risk_score", "country"]);
    }

    #[test]
    fn test_default_is_always() {
        assert_eq!(Condition::default(), Condition::Always);
        assert!(Condition::Always.referenced_fields().is_empty());
    }
}
