//! Payload filtering for search post-processing.
//!
//! Filters are evaluated by the query engine against each candidate's JSON
//! payload after index retrieval. The wire format is the same JSON shape the
//! REST API accepts:
//!
//! ```json
//! { "field": "lang", "op": "eq", "value": "rust" }
//! { "op": "and", "conditions": [
//!     { "field": "stars", "op": "gte", "value": 100 },
//!     { "field": "archived", "op": "neq", "value": true }
//! ]}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single filter condition over a payload field.
///
/// Comparison variants (`Gt`/`Gte`/`Lt`/`Lte`) compare numbers numerically
/// and strings lexicographically; mixed types never match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Condition {
    /// Field equals value.
    Eq {
        /// Payload field name.
        field: String,
        /// Value to compare against.
        value: Value,
    },
    /// Field does not equal value (missing fields match).
    Neq {
        /// Payload field name.
        field: String,
        /// Value to compare against.
        value: Value,
    },
    /// Field is strictly greater than value.
    Gt {
        /// Payload field name.
        field: String,
        /// Value to compare against.
        value: Value,
    },
    /// Field is greater than or equal to value.
    Gte {
        /// Payload field name.
        field: String,
        /// Value to compare against.
        value: Value,
    },
    /// Field is strictly less than value.
    Lt {
        /// Payload field name.
        field: String,
        /// Value to compare against.
        value: Value,
    },
    /// Field is less than or equal to value.
    Lte {
        /// Payload field name.
        field: String,
        /// Value to compare against.
        value: Value,
    },
    /// Field equals one of the listed values.
    In {
        /// Payload field name.
        field: String,
        /// Accepted values.
        values: Vec<Value>,
    },
    /// String field contains the given substring.
    Contains {
        /// Payload field name.
        field: String,
        /// Substring to look for.
        value: String,
    },
    /// Field is absent or JSON null.
    IsNull {
        /// Payload field name.
        field: String,
    },
    /// Field is present and not JSON null.
    IsNotNull {
        /// Payload field name.
        field: String,
    },
    /// All nested conditions match.
    And {
        /// Nested conditions.
        conditions: Vec<Condition>,
    },
    /// At least one nested condition matches.
    Or {
        /// Nested conditions.
        conditions: Vec<Condition>,
    },
    /// The nested condition does not match.
    Not {
        /// Nested condition.
        condition: Box<Condition>,
    },
}

impl Condition {
    /// Shorthand for an equality condition.
    #[must_use]
    pub fn eq(field: impl Into<String>, value: Value) -> Self {
        Self::Eq {
            field: field.into(),
            value,
        }
    }

    /// Shorthand for an AND of conditions.
    #[must_use]
    pub fn and(conditions: Vec<Condition>) -> Self {
        Self::And { conditions }
    }

    /// Evaluates this condition against a payload.
    ///
    /// A missing payload behaves like an empty object: only `Neq`, `IsNull`
    /// and negations can match.
    #[must_use]
    pub fn matches(&self, payload: Option<&Value>) -> bool {
        let field_value = |field: &str| payload.and_then(|p| p.get(field));

        match self {
            Self::Eq { field, value } => field_value(field) == Some(value),
            Self::Neq { field, value } => field_value(field) != Some(value),
            Self::Gt { field, value } => {
                compare(field_value(field), value).is_some_and(std::cmp::Ordering::is_gt)
            }
            Self::Gte { field, value } => {
                compare(field_value(field), value).is_some_and(std::cmp::Ordering::is_ge)
            }
            Self::Lt { field, value } => {
                compare(field_value(field), value).is_some_and(std::cmp::Ordering::is_lt)
            }
            Self::Lte { field, value } => {
                compare(field_value(field), value).is_some_and(std::cmp::Ordering::is_le)
            }
            Self::In { field, values } => {
                field_value(field).is_some_and(|v| values.contains(v))
            }
            Self::Contains { field, value } => field_value(field)
                .and_then(Value::as_str)
                .is_some_and(|s| s.contains(value.as_str())),
            Self::IsNull { field } => field_value(field).is_none_or(Value::is_null),
            Self::IsNotNull { field } => field_value(field).is_some_and(|v| !v.is_null()),
            Self::And { conditions } => conditions.iter().all(|c| c.matches(payload)),
            Self::Or { conditions } => conditions.iter().any(|c| c.matches(payload)),
            Self::Not { condition } => !condition.matches(payload),
        }
    }
}

/// Orders a payload field against a filter value, if the types are comparable.
fn compare(field: Option<&Value>, value: &Value) -> Option<std::cmp::Ordering> {
    match (field?, value) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.as_str().cmp(b.as_str())),
        _ => None,
    }
}

/// A conjunction of conditions applied to search candidates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Filter {
    /// Conditions that must all match.
    pub conditions: Vec<Condition>,
}

impl Filter {
    /// Creates a filter from a list of conditions (AND semantics).
    #[must_use]
    pub fn new(conditions: Vec<Condition>) -> Self {
        Self { conditions }
    }

    /// True when every condition matches the payload.
    #[must_use]
    pub fn matches(&self, payload: Option<&Value>) -> bool {
        self.conditions.iter().all(|c| c.matches(payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_eq_matches() {
        let cond = Condition::eq("lang", json!("rust"));
        assert!(cond.matches(Some(&json!({"lang": "rust"}))));
        assert!(!cond.matches(Some(&json!({"lang": "go"}))));
        assert!(!cond.matches(None));
    }

    #[test]
    fn test_numeric_range() {
        let cond = Condition::Gte {
            field: "stars".into(),
            value: json!(100),
        };
        assert!(cond.matches(Some(&json!({"stars": 250}))));
        assert!(cond.matches(Some(&json!({"stars": 100}))));
        assert!(!cond.matches(Some(&json!({"stars": 10}))));
        // Mixed types never match.
        assert!(!cond.matches(Some(&json!({"stars": "many"}))));
    }

    #[test]
    fn test_in_and_contains() {
        let cond = Condition::In {
            field: "kind".into(),
            values: vec![json!("doc"), json!("code")],
        };
        assert!(cond.matches(Some(&json!({"kind": "code"}))));
        assert!(!cond.matches(Some(&json!({"kind": "image"}))));

        let cond = Condition::Contains {
            field: "title".into(),
            value: "search".into(),
        };
        assert!(cond.matches(Some(&json!({"title": "similarity search"}))));
    }

    #[test]
    fn test_logical_nesting() {
        let cond = Condition::and(vec![
            Condition::eq("lang", json!("rust")),
            Condition::Not {
                condition: Box::new(Condition::eq("archived", json!(true))),
            },
        ]);
        assert!(cond.matches(Some(&json!({"lang": "rust", "archived": false}))));
        assert!(!cond.matches(Some(&json!({"lang": "rust", "archived": true}))));
    }

    #[test]
    fn test_null_checks_on_missing_payload() {
        let is_null = Condition::IsNull {
            field: "owner".into(),
        };
        let is_not_null = Condition::IsNotNull {
            field: "owner".into(),
        };
        assert!(is_null.matches(None));
        assert!(!is_not_null.matches(None));
        assert!(is_not_null.matches(Some(&json!({"owner": "a"}))));
    }

    #[test]
    fn test_json_wire_format() {
        let filter: Filter = serde_json::from_value(json!([
            {"field": "lang", "op": "eq", "value": "rust"},
            {"op": "or", "conditions": [
                {"field": "stars", "op": "gt", "value": 50},
                {"field": "pinned", "op": "eq", "value": true}
            ]}
        ]))
        .unwrap();
        assert_eq!(filter.conditions.len(), 2);
        assert!(filter.matches(Some(&json!({"lang": "rust", "stars": 80}))));
        assert!(!filter.matches(Some(&json!({"lang": "rust", "stars": 1, "pinned": false}))));
    }
}
