use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::{ExecutionOutcome, NodeExecutor, NodeInvocation, NodeType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
enum Operator {
    Equals,
    NotEquals,
    GreaterThan,
    LessThan,
    Contains,
    NotContains,
}

fn default_operator() -> Operator {
    Operator::Equals
}

fn default_output_key() -> String {
    "condition_result".to_string()
}

#[derive(Debug, Deserialize)]
struct ConditionConfig {
    /// Context path to compare. A missing value compares as `null`.
    field: String,
    #[serde(default = "default_operator")]
    operator: Operator,
    #[serde(default)]
    value: Value,
    #[serde(default = "default_output_key")]
    output_key: String,
    /// Report `Skip` instead of writing `false`.
    #[serde(default)]
    skip_when_false: bool,
}

/// Evaluates one comparison against the context and records the result.
pub struct ConditionNode;

#[async_trait]
impl NodeExecutor for ConditionNode {
    fn node_types(&self) -> Vec<NodeType> {
        vec![NodeType::Condition]
    }

    async fn execute(&self, invocation: &NodeInvocation) -> ExecutionOutcome {
        let config: ConditionConfig = match invocation.parse_config() {
            Ok(c) => c,
            Err(e) => return e.into(),
        };

        let actual = invocation.context.lookup(&config.field).unwrap_or(&Value::Null);
        let result = compare(actual, config.operator, &config.value);

        if !result && config.skip_when_false {
            return ExecutionOutcome::Skip(format!("condition on '{}' is false", config.field));
        }
        ExecutionOutcome::write(config.output_key, Value::Bool(result))
    }
}

fn compare(actual: &Value, operator: Operator, expected: &Value) -> bool {
    match operator {
        Operator::Equals => loosely_equal(actual, expected),
        Operator::NotEquals => !loosely_equal(actual, expected),
        Operator::GreaterThan => ordering(actual, expected).is_some_and(|o| o.is_gt()),
        Operator::LessThan => ordering(actual, expected).is_some_and(|o| o.is_lt()),
        Operator::Contains => contains(actual, expected),
        Operator::NotContains => !contains(actual, expected),
    }
}

/// Numbers compare by value, numeric strings compare against numbers.
fn loosely_equal(a: &Value, b: &Value) -> bool {
    match (as_number(a), as_number(b)) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

fn ordering(a: &Value, b: &Value) -> Option<std::cmp::Ordering> {
    match (as_number(a), as_number(b)) {
        (Some(x), Some(y)) => x.partial_cmp(&y),
        _ => match (a, b) {
            (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
            _ => None,
        },
    }
}

fn contains(haystack: &Value, needle: &Value) -> bool {
    match haystack {
        Value::String(s) => match needle {
            Value::String(n) => s.contains(n.as_str()),
            other => s.contains(&other.to_string()),
        },
        Value::Array(items) => items.iter().any(|item| loosely_equal(item, needle)),
        Value::Object(map) => needle.as_str().is_some_and(|k| map.contains_key(k)),
        _ => false,
    }
}

fn as_number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
