//! `MockNode`: a scriptable test double for `NodeExecutor`.
//!
//! One `MockNode` serves every node of a workflow: behaviour is scripted per
//! node id, and every call is recorded so tests can assert on invocation
//! order, join timing and concurrency.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::{ExecutionOutcome, NodeExecutor, NodeInvocation, NodeType};

/// What a scripted node does on one invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum MockBehaviour {
    /// Succeed, writing the entries of the given JSON object.
    Write(Value),
    /// Fail with a `Retryable` outcome.
    FailRetryable(String),
    /// Fail with a `Fatal` outcome.
    FailFatal(String),
    /// Report `Skip`.
    Skip(String),
}

impl MockBehaviour {
    fn outcome(&self) -> ExecutionOutcome {
        match self {
            Self::Write(value) => {
                let writes: Map<String, Value> = value.as_object().cloned().unwrap_or_default();
                ExecutionOutcome::Success(writes)
            }
            Self::FailRetryable(msg) => ExecutionOutcome::Retryable(msg.clone()),
            Self::FailFatal(msg) => ExecutionOutcome::Fatal(msg.clone()),
            Self::Skip(msg) => ExecutionOutcome::Skip(msg.clone()),
        }
    }
}

#[derive(Debug, Default)]
struct Script {
    /// Consumed one per call.
    steps: VecDeque<MockBehaviour>,
    /// Used once `steps` runs dry.
    fallback: Option<MockBehaviour>,
    delay: Duration,
}

/// A mock executor that records every call it receives and returns
/// programmer-specified outcomes.
///
/// Unscripted nodes succeed without writing anything.
pub struct MockNode {
    node_types: Vec<NodeType>,
    scripts: Mutex<HashMap<String, Script>>,
    /// Node ids in invocation order.
    calls: Mutex<Vec<String>>,
    /// `start:<id>` / `finish:<id>` in the order they happened.
    events: Mutex<Vec<String>>,
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl Default for MockNode {
    fn default() -> Self {
        Self::new()
    }
}

impl MockNode {
    /// Handles every node type.
    pub fn new() -> Self {
        Self::for_types(NodeType::ALL.to_vec())
    }

    pub fn for_types(node_types: Vec<NodeType>) -> Self {
        Self {
            node_types,
            scripts: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            events: Mutex::new(Vec::new()),
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    /// Always behave like `behaviour` for `node_id`.
    pub fn on(self, node_id: &str, behaviour: MockBehaviour) -> Self {
        self.scripts.lock().unwrap().entry(node_id.to_string()).or_default().fallback =
            Some(behaviour);
        self
    }

    /// Play `steps` in order for `node_id`, then fall back to `on`/default success.
    pub fn script(self, node_id: &str, steps: Vec<MockBehaviour>) -> Self {
        self.scripts.lock().unwrap().entry(node_id.to_string()).or_default().steps = steps.into();
        self
    }

    /// Sleep this long inside every invocation of `node_id`.
    pub fn with_delay(self, node_id: &str, delay: Duration) -> Self {
        self.scripts.lock().unwrap().entry(node_id.to_string()).or_default().delay = delay;
        self
    }

    /// Number of times `node_id` has been executed.
    pub fn call_count(&self, node_id: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|id| *id == node_id).count()
    }

    /// All invocations in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    /// Highest number of simultaneously running invocations observed.
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn next_step(&self, node_id: &str) -> (Option<MockBehaviour>, Duration) {
        let mut scripts = self.scripts.lock().unwrap();
        match scripts.get_mut(node_id) {
            Some(script) => {
                let step = script.steps.pop_front().or_else(|| script.fallback.clone());
                (step, script.delay)
            }
            None => (None, Duration::ZERO),
        }
    }
}

#[async_trait]
impl NodeExecutor for MockNode {
    fn node_types(&self) -> Vec<NodeType> {
        self.node_types.clone()
    }

    async fn execute(&self, invocation: &NodeInvocation) -> ExecutionOutcome {
        let node_id = invocation.node_id.as_str();
        self.calls.lock().unwrap().push(node_id.to_string());
        self.events.lock().unwrap().push(format!("start:{node_id}"));

        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now_active, Ordering::SeqCst);

        let (step, delay) = self.next_step(node_id);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        self.active.fetch_sub(1, Ordering::SeqCst);
        self.events.lock().unwrap().push(format!("finish:{node_id}"));

        step.map(|b| b.outcome()).unwrap_or_else(ExecutionOutcome::done)
    }
}
