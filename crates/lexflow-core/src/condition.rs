//! Boolean predicate grammar shared by Decision/Condition nodes, connection
//! guards, and trigger gating. Implemented once; the engine injects it
//! everywhere a branch is taken.

use crate::DataMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single predicate: `field operator value`.
///
/// `field` resolves against one of two namespaces: `context.<key>` (persistent
/// execution state, the default for unqualified fields) or `result.<key>` (the
/// most recent node's output).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Condition {
    pub field: String,
    pub operator: ConditionOperator,
    #[serde(default)]
    pub value: Value,
}

impl Condition {
    pub fn new(field: impl Into<String>, operator: ConditionOperator, value: Value) -> Self {
        Self {
            field: field.into(),
            operator,
            value,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOperator {
    Equals,
    NotEquals,
    Contains,
    NotContains,
    GreaterThan,
    LessThan,
    IsEmpty,
    IsNotEmpty,
    MatchesRegex,
}

/// Evaluate a condition against the execution context and the most recent
/// node result.
pub fn evaluate(condition: &Condition, context: &DataMap, result: Option<&DataMap>) -> bool {
    let field = resolve(&condition.field, context, result);

    match condition.operator {
        ConditionOperator::Equals => match field {
            Some(actual) => values_equal(actual, &condition.value),
            None => condition.value.is_null(),
        },
        ConditionOperator::NotEquals => match field {
            Some(actual) => !values_equal(actual, &condition.value),
            None => !condition.value.is_null(),
        },
        ConditionOperator::Contains => match field {
            Some(actual) if truthy(actual) => {
                stringify(actual).contains(&stringify(&condition.value))
            }
            _ => false,
        },
        ConditionOperator::NotContains => match field {
            Some(actual) if truthy(actual) => {
                !stringify(actual).contains(&stringify(&condition.value))
            }
            _ => true,
        },
        ConditionOperator::GreaterThan => match (field.and_then(numeric), numeric(&condition.value))
        {
            (Some(a), Some(b)) => a > b,
            _ => false,
        },
        ConditionOperator::LessThan => match (field.and_then(numeric), numeric(&condition.value)) {
            (Some(a), Some(b)) => a < b,
            _ => false,
        },
        ConditionOperator::IsEmpty => !field.map(truthy).unwrap_or(false),
        ConditionOperator::IsNotEmpty => field.map(truthy).unwrap_or(false),
        ConditionOperator::MatchesRegex => {
            let Some(actual) = field else { return false };
            match regex::Regex::new(&stringify(&condition.value)) {
                Ok(re) => re.is_match(&stringify(actual)),
                Err(_) => false,
            }
        }
    }
}

/// Resolve a possibly namespace-qualified field name.
fn resolve<'a>(field: &str, context: &'a DataMap, result: Option<&'a DataMap>) -> Option<&'a Value> {
    if let Some(key) = field.strip_prefix("result.") {
        return result.and_then(|r| r.get(key));
    }
    let key = field.strip_prefix("context.").unwrap_or(field);
    context.get(key)
}

fn values_equal(actual: &Value, expected: &Value) -> bool {
    actual == expected || stringify(actual) == stringify(expected)
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn context(entries: &[(&str, Value)]) -> DataMap {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn check(field: &str, op: ConditionOperator, value: Value, ctx: &DataMap) -> bool {
        evaluate(&Condition::new(field, op, value), ctx, None)
    }

    #[test]
    fn equals_compares_across_representations() {
        let ctx = context(&[("status", json!("open")), ("count", json!(3))]);
        assert!(check("status", ConditionOperator::Equals, json!("open"), &ctx));
        assert!(check("count", ConditionOperator::Equals, json!("3"), &ctx));
        assert!(!check("status", ConditionOperator::Equals, json!("closed"), &ctx));
        assert!(check("status", ConditionOperator::NotEquals, json!("closed"), &ctx));
    }

    #[test]
    fn contains_on_missing_field_is_false() {
        let ctx = context(&[("title", json!("engagement letter"))]);
        assert!(check("title", ConditionOperator::Contains, json!("letter"), &ctx));
        assert!(!check("missing", ConditionOperator::Contains, json!("x"), &ctx));
        assert!(check("missing", ConditionOperator::NotContains, json!("x"), &ctx));
    }

    #[test]
    fn numeric_comparison_coerces_strings() {
        let ctx = context(&[("amount", json!("5"))]);
        assert!(check("amount", ConditionOperator::GreaterThan, json!("3"), &ctx));
        assert!(!check("amount", ConditionOperator::LessThan, json!(3), &ctx));
        assert!(!check("missing", ConditionOperator::GreaterThan, json!(1), &ctx));
        assert!(!check("amount", ConditionOperator::GreaterThan, json!("abc"), &ctx));
    }

    #[test]
    fn is_empty_on_missing_field_is_true() {
        let ctx = context(&[("notes", json!("")), ("tags", json!(["vip"]))]);
        assert!(check("missing", ConditionOperator::IsEmpty, Value::Null, &ctx));
        assert!(check("notes", ConditionOperator::IsEmpty, Value::Null, &ctx));
        assert!(check("tags", ConditionOperator::IsNotEmpty, Value::Null, &ctx));
    }

    #[test]
    fn regex_matching() {
        let ctx = context(&[("case_number", json!("CV-2024-0042"))]);
        assert!(check(
            "case_number",
            ConditionOperator::MatchesRegex,
            json!(r"^CV-\d{4}-\d+$"),
            &ctx
        ));
        assert!(!check(
            "case_number",
            ConditionOperator::MatchesRegex,
            json!(r"^PR-"),
            &ctx
        ));
        assert!(!check("missing", ConditionOperator::MatchesRegex, json!(".*"), &ctx));
        // Invalid patterns never match.
        assert!(!check("case_number", ConditionOperator::MatchesRegex, json!("["), &ctx));
    }

    #[test]
    fn result_namespace_reads_node_output() {
        let ctx = DataMap::new();
        let result = context(&[("approved", json!(true))]);
        let cond = Condition::new("result.approved", ConditionOperator::Equals, json!(true));
        assert!(evaluate(&cond, &ctx, Some(&result)));
        assert!(!evaluate(&cond, &ctx, None));
    }

    #[test]
    fn unqualified_field_defaults_to_context() {
        let ctx = context(&[("amount", json!(500))]);
        let result = context(&[("amount", json!(9000))]);
        let cond = Condition::new("amount", ConditionOperator::GreaterThan, json!(1000));
        assert!(!evaluate(&cond, &ctx, Some(&result)));
    }
}
