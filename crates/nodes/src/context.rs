//! The run's working memory.
//!
//! [`ExecutionContext`] is owned by exactly one run and mutated only by the
//! engine when it applies a node's output writes. Executors never see it
//! directly: they receive a [`ContextSnapshot`] taken when their node was
//! claimed, so a node cannot observe a sibling's half-applied writes.

use std::ops::Deref;
use std::sync::Arc;

use serde_json::{Map, Value};

/// Prefix that routes a path lookup into the trigger payload.
pub const TRIGGER_PREFIX: &str = "trigger.";

/// Mutable key/value bag threaded through a run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionContext {
    values: Map<String, Value>,
    trigger_payload: Arc<Map<String, Value>>,
}

impl ExecutionContext {
    /// Create an empty context carrying the given (read-only) trigger payload.
    pub fn new(trigger_payload: Map<String, Value>) -> Self {
        Self {
            values: Map::new(),
            trigger_payload: Arc::new(trigger_payload),
        }
    }

    /// Value stored under exactly `key`.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Store `value` under `key`, returning whatever was there before.
    pub fn set(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.values.insert(key.into(), value)
    }

    pub fn values(&self) -> &Map<String, Value> {
        &self.values
    }

    pub fn trigger_payload(&self) -> &Map<String, Value> {
        &self.trigger_payload
    }

    /// Resolve a dotted path (`lead.address.city`, `items.0.sku`).
    ///
    /// An exact top-level key wins over path splitting, and paths starting
    /// with `trigger.` resolve into the trigger payload.
    pub fn lookup(&self, path: &str) -> Option<&Value> {
        if let Some(value) = self.values.get(path) {
            return Some(value);
        }
        if let Some(rest) = path.strip_prefix(TRIGGER_PREFIX) {
            return lookup_in(&self.trigger_payload, rest);
        }
        lookup_in(&self.values, path)
    }

    /// Immutable copy used for guard evaluation, executor input and logging.
    pub fn snapshot(&self) -> ContextSnapshot {
        ContextSnapshot(Arc::new(self.clone()))
    }

    /// JSON view: `{ "values": {...}, "trigger": {...} }`.
    pub fn to_value(&self) -> Value {
        serde_json::json!({
            "values": self.values,
            "trigger": self.trigger_payload.as_ref(),
        })
    }

    /// Replace every `{{ path }}` placeholder in `template` with the value
    /// found at `path`. Strings are inserted verbatim, other values as JSON;
    /// unresolved placeholders render as an empty string.
    pub fn render(&self, template: &str) -> String {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;

        while let Some(start) = rest.find("{{") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let Some(end) = after.find("}}") else {
                out.push_str(&rest[start..]);
                return out;
            };
            match self.lookup(after[..end].trim()) {
                Some(Value::String(s)) => out.push_str(s),
                Some(Value::Null) | None => {}
                Some(other) => out.push_str(&other.to_string()),
            }
            rest = &after[end + 2..];
        }

        out.push_str(rest);
        out
    }

    /// Render every string found inside `value`, recursing into arrays and objects.
    pub fn render_value(&self, value: &Value) -> Value {
        match value {
            Value::String(s) => Value::String(self.render(s)),
            Value::Array(items) => {
                Value::Array(items.iter().map(|v| self.render_value(v)).collect())
            }
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), self.render_value(v)))
                    .collect(),
            ),
            other => other.clone(),
        }
    }
}

fn lookup_in<'a>(root: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let mut current = root.get(segments.next()?)?;

    for segment in segments {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }

    Some(current)
}

/// Read-only, cheaply clonable copy of an [`ExecutionContext`].
#[derive(Debug, Clone, PartialEq)]
pub struct ContextSnapshot(Arc<ExecutionContext>);

impl Deref for ContextSnapshot {
    type Target = ExecutionContext;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Default for ContextSnapshot {
    fn default() -> Self {
        ExecutionContext::default().snapshot()
    }
}
