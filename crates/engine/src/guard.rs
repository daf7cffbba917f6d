//! Edge guard evaluation.
//!
//! A guard is a small JSON expression over dotted context paths:
//!
//! ```json
//! { "op": "and", "args": [
//!     { "op": "gt",     "path": "lead.score", "value": 50 },
//!     { "op": "in",     "path": "lead.stage", "value": ["mql", "sql"] },
//!     { "op": "not",    "arg": { "op": "exists", "path": "lead.unsubscribed_at" } }
//! ] }
//! ```
//!
//! Operators: `eq`, `neq`, `gt`, `lt`, `in`, `exists`, `and`, `or`, `not`.
//! `exists` is the only operator that tolerates a missing key.

use serde_json::Value;
use thiserror::Error;

use nodes::ContextSnapshot;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum GuardError {
    #[error("unknown guard operator '{0}'")]
    UnknownOperator(String),

    #[error("guard references missing context key '{0}'")]
    MissingKey(String),

    #[error("operator '{op}' cannot compare the value at '{path}'")]
    TypeMismatch { op: &'static str, path: String },

    #[error("malformed guard: {0}")]
    Malformed(String),
}

/// Evaluate `guard` against `context`.
pub fn evaluate_guard(guard: &Value, context: &ContextSnapshot) -> Result<bool, GuardError> {
    let obj = guard
        .as_object()
        .ok_or_else(|| GuardError::Malformed(format!("expected an object, got {guard}")))?;
    let op = obj
        .get("op")
        .and_then(Value::as_str)
        .ok_or_else(|| GuardError::Malformed("missing string field 'op'".into()))?;

    match op {
        "and" => {
            for arg in args(guard)? {
                if !evaluate_guard(arg, context)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        "or" => {
            for arg in args(guard)? {
                if evaluate_guard(arg, context)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        "not" => {
            let arg = obj
                .get("arg")
                .ok_or_else(|| GuardError::Malformed("'not' needs an 'arg'".into()))?;
            Ok(!evaluate_guard(arg, context)?)
        }
        "exists" => Ok(context.lookup(path(guard)?).is_some()),
        "eq" => Ok(loosely_equal(resolve(guard, context)?, operand(guard)?)),
        "neq" => Ok(!loosely_equal(resolve(guard, context)?, operand(guard)?)),
        "gt" => compare(guard, context, "gt").map(|o| o.is_gt()),
        "lt" => compare(guard, context, "lt").map(|o| o.is_lt()),
        "in" => {
            let actual = resolve(guard, context)?;
            let candidates = operand(guard)?
                .as_array()
                .ok_or_else(|| GuardError::Malformed("'in' needs an array 'value'".into()))?;
            Ok(candidates.iter().any(|c| loosely_equal(actual, c)))
        }
        other => Err(GuardError::UnknownOperator(other.to_string())),
    }
}

fn args(guard: &Value) -> Result<&Vec<Value>, GuardError> {
    guard
        .get("args")
        .and_then(Value::as_array)
        .ok_or_else(|| GuardError::Malformed("boolean operator needs an 'args' array".into()))
}

fn path(guard: &Value) -> Result<&str, GuardError> {
    guard
        .get("path")
        .and_then(Value::as_str)
        .ok_or_else(|| GuardError::Malformed("missing string field 'path'".into()))
}

fn operand(guard: &Value) -> Result<&Value, GuardError> {
    guard
        .get("value")
        .ok_or_else(|| GuardError::Malformed("missing field 'value'".into()))
}

fn resolve<'a>(guard: &Value, context: &'a ContextSnapshot) -> Result<&'a Value, GuardError> {
    let path = path(guard)?;
    context
        .lookup(path)
        .ok_or_else(|| GuardError::MissingKey(path.to_string()))
}

fn compare(
    guard: &Value,
    context: &ContextSnapshot,
    op: &'static str,
) -> Result<std::cmp::Ordering, GuardError> {
    let actual = resolve(guard, context)?;
    let expected = operand(guard)?;
    let mismatch = || GuardError::TypeMismatch {
        op,
        path: path(guard).unwrap_or_default().to_string(),
    };

    match (actual, expected) {
        (Value::Number(a), Value::Number(b)) => {
            let (a, b) = (a.as_f64().ok_or_else(mismatch)?, b.as_f64().ok_or_else(mismatch)?);
            a.partial_cmp(&b).ok_or_else(mismatch)
        }
        (Value::String(a), Value::String(b)) => Ok(a.cmp(b)),
        _ => Err(mismatch()),
    }
}

/// JSON equality, except that numbers compare by value (`1 == 1.0`).
fn loosely_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}
