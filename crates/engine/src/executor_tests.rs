//! End-to-end tests for the workflow executor.
//!
//! Runs are driven by `MockNode` against in-memory definition and log
//! stores. Time is paused so back-offs, delays and timeouts complete
//! instantly and deterministically.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Map, Value};
use uuid::Uuid;

use nodes::mock::{MockBehaviour, MockNode};
use nodes::{Collaborators, NodeType};
use store::{InMemoryDefinitions, MemoryLogSink};

use crate::{
    Edge, EngineConfig, EngineError, ExecutorRegistry, FailurePolicy, NodeDefinition, NodeStatus,
    RunStatus, RunView, Trigger, ValidationError, WorkflowDefinition, WorkflowExecutor,
};

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

struct Harness {
    executor: WorkflowExecutor,
    definitions: Arc<InMemoryDefinitions>,
    log: Arc<MemoryLogSink>,
}

impl Harness {
    fn with_registry(registry: ExecutorRegistry, config: EngineConfig) -> Self {
        let definitions = Arc::new(InMemoryDefinitions::new());
        let log = Arc::new(MemoryLogSink::new());
        let executor = WorkflowExecutor::new(definitions.clone(), log.clone(), registry, config);
        Self { executor, definitions, log }
    }

    fn new(mock: &Arc<MockNode>, config: EngineConfig) -> Self {
        let mut registry = ExecutorRegistry::new();
        registry.register(mock.clone());
        Self::with_registry(registry, config)
    }

    async fn deploy(&self, nodes: Vec<NodeDefinition>, edges: Vec<Edge>) -> Uuid {
        let definition = WorkflowDefinition::new("test", Trigger::Manual, nodes, edges);
        let row = definition.to_row().expect("definition serializes");
        let id = row.id;
        self.definitions.insert(row).await;
        id
    }
}

fn action(id: &str) -> NodeDefinition {
    NodeDefinition::new(id, "action")
}

fn linear(ids: &[&str]) -> (Vec<NodeDefinition>, Vec<Edge>) {
    let nodes = ids.iter().map(|id| action(id)).collect();
    let edges = ids.windows(2).map(|w| Edge::new(w[0], w[1])).collect();
    (nodes, edges)
}

fn payload(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}

fn position(events: &[String], event: &str) -> usize {
    events
        .iter()
        .position(|e| e == event)
        .unwrap_or_else(|| panic!("missing event {event} in {events:?}"))
}

// ============================================================
// Ordering and joins
// ============================================================

#[tokio::test(start_paused = true)]
async fn linear_workflow_runs_in_order() {
    let mock = Arc::new(
        MockNode::new()
            .on("a", MockBehaviour::Write(json!({ "a_out": 1 })))
            .on("b", MockBehaviour::Write(json!({ "b_out": 2 })))
            .on("c", MockBehaviour::Write(json!({ "c_out": 3 }))),
    );
    let h = Harness::new(&mock, EngineConfig::default());
    let (nodes, edges) = linear(&["a", "b", "c"]);
    let wf = h.deploy(nodes, edges).await;

    let view = h.executor.execute(wf, Map::new()).await.unwrap();

    assert_eq!(view.status, RunStatus::Completed);
    assert_eq!(mock.calls(), vec!["a", "b", "c"]);
    assert_eq!(view.context["a_out"], 1);
    assert_eq!(view.context["c_out"], 3);
    assert!(view.nodes.iter().all(|n| n.status == NodeStatus::Completed && n.attempts == 1));
    assert!(view.failure.is_none());
}

#[tokio::test(start_paused = true)]
async fn join_waits_for_the_slowest_predecessor() {
    let mock = Arc::new(MockNode::new().with_delay("p2", Duration::from_millis(500)));
    let h = Harness::new(&mock, EngineConfig::default());
    let wf = h
        .deploy(
            vec![action("p1"), action("p2"), action("j")],
            vec![Edge::new("p1", "j"), Edge::new("p2", "j")],
        )
        .await;

    let view = h.executor.execute(wf, Map::new()).await.unwrap();

    assert_eq!(view.status, RunStatus::Completed);
    let events = mock.events();
    assert!(position(&events, "start:j") > position(&events, "finish:p2"));
    assert_eq!(mock.call_count("j"), 1);
}

#[tokio::test(start_paused = true)]
async fn diamond_join_runs_once() {
    let mock = Arc::new(MockNode::new());
    let h = Harness::new(&mock, EngineConfig::default());
    let wf = h
        .deploy(
            vec![action("a"), action("b"), action("c"), action("d")],
            vec![
                Edge::new("a", "b"),
                Edge::new("a", "c"),
                Edge::new("b", "d"),
                Edge::new("c", "d"),
            ],
        )
        .await;

    let view = h.executor.execute(wf, Map::new()).await.unwrap();

    assert_eq!(view.status, RunStatus::Completed);
    assert_eq!(mock.call_count("d"), 1);
    assert_eq!(mock.calls().last().map(String::as_str), Some("d"));
}

#[tokio::test(start_paused = true)]
async fn concurrency_is_bounded() {
    let mut mock = MockNode::new();
    let ids = ["n1", "n2", "n3", "n4", "n5", "n6"];
    for id in ids {
        mock = mock.with_delay(id, Duration::from_millis(100));
    }
    let mock = Arc::new(mock);
    let h = Harness::new(&mock, EngineConfig::default().with_concurrency(2));
    let wf = h.deploy(ids.iter().map(|id| action(id)).collect(), vec![]).await;

    let view = h.executor.execute(wf, Map::new()).await.unwrap();

    assert_eq!(view.status, RunStatus::Completed);
    assert_eq!(mock.peak_concurrency(), 2);
    assert_eq!(mock.calls().len(), 6);
}

// ============================================================
// Guards and skips
// ============================================================

#[tokio::test(start_paused = true)]
async fn guards_route_on_written_context() {
    let mock = Arc::new(
        MockNode::new().on("score", MockBehaviour::Write(json!({ "lead": { "score": 80 } }))),
    );
    let h = Harness::new(&mock, EngineConfig::default());
    let wf = h
        .deploy(
            vec![action("score"), action("hot"), action("cold"), action("nurture")],
            vec![
                Edge::guarded(
                    "score",
                    "hot",
                    json!({ "op": "gt", "path": "lead.score", "value": 50 }),
                ),
                Edge::guarded(
                    "score",
                    "cold",
                    json!({ "op": "lt", "path": "lead.score", "value": 50 }),
                ),
                Edge::new("cold", "nurture"),
            ],
        )
        .await;

    let view = h.executor.execute(wf, Map::new()).await.unwrap();

    assert_eq!(view.status, RunStatus::Completed);
    assert_eq!(view.node_status("hot"), Some(NodeStatus::Completed));
    assert_eq!(view.node_status("cold"), Some(NodeStatus::Skipped));
    assert_eq!(view.node_status("nurture"), Some(NodeStatus::Skipped));
    assert_eq!(mock.call_count("cold"), 0);
    assert_eq!(mock.call_count("nurture"), 0);
}

#[tokio::test(start_paused = true)]
async fn guards_can_read_the_trigger_payload() {
    let mock = Arc::new(MockNode::new());
    let h = Harness::new(&mock, EngineConfig::default());
    let wf = h
        .deploy(
            vec![action("a"), action("pro_only")],
            vec![Edge::guarded(
                "a",
                "pro_only",
                json!({ "op": "eq", "path": "trigger.plan", "value": "pro" }),
            )],
        )
        .await;

    let pro = h.executor.execute(wf, payload(json!({ "plan": "pro" }))).await.unwrap();
    let free = h.executor.execute(wf, payload(json!({ "plan": "free" }))).await.unwrap();

    assert_eq!(pro.node_status("pro_only"), Some(NodeStatus::Completed));
    assert_eq!(free.node_status("pro_only"), Some(NodeStatus::Skipped));
}

#[tokio::test(start_paused = true)]
async fn guard_error_is_not_taken_by_default() {
    let mock = Arc::new(MockNode::new());
    let h = Harness::new(&mock, EngineConfig::default());
    let wf = h
        .deploy(
            vec![action("a"), action("b")],
            vec![Edge::guarded("a", "b", json!({ "op": "eq", "path": "missing", "value": 1 }))],
        )
        .await;

    let view = h.executor.execute(wf, Map::new()).await.unwrap();

    assert_eq!(view.status, RunStatus::Completed);
    assert_eq!(view.node_status("b"), Some(NodeStatus::Skipped));
}

#[tokio::test(start_paused = true)]
async fn guard_error_fails_the_node_in_strict_mode() {
    let mock = Arc::new(MockNode::new());
    let h = Harness::new(&mock, EngineConfig::default().with_strict_guards(true));
    let wf = h
        .deploy(
            vec![action("a"), action("b")],
            vec![Edge::guarded("a", "b", json!({ "op": "eq", "path": "missing", "value": 1 }))],
        )
        .await;

    let view = h.executor.execute(wf, Map::new()).await.unwrap();

    assert_eq!(view.status, RunStatus::Failed);
    assert_eq!(view.node_status("a"), Some(NodeStatus::Failed));
    assert_eq!(view.node_status("b"), Some(NodeStatus::Skipped));
    assert!(view.failure.unwrap().reason.contains("missing"));
}

#[tokio::test(start_paused = true)]
async fn strict_guard_failure_discards_the_node_writes() {
    let mock = Arc::new(MockNode::new().on("a", MockBehaviour::Write(json!({ "a_out": 1 }))));
    let h = Harness::new(&mock, EngineConfig::default().with_strict_guards(true));
    let wf = h
        .deploy(
            vec![action("a"), action("b")],
            vec![Edge::guarded("a", "b", json!({ "op": "gt", "path": "missing", "value": 1 }))],
        )
        .await;

    let view = h.executor.execute(wf, Map::new()).await.unwrap();

    assert_eq!(view.status, RunStatus::Failed);
    assert_eq!(view.node_status("a"), Some(NodeStatus::Failed));
    assert!(view.context.get("a_out").is_none());
}

#[tokio::test(start_paused = true)]
async fn skip_outcome_propagates_downstream() {
    let mock = Arc::new(MockNode::new().on("gate", MockBehaviour::Skip("not today".into())));
    let h = Harness::new(&mock, EngineConfig::default());
    let (nodes, edges) = linear(&["gate", "b", "c"]);
    let wf = h.deploy(nodes, edges).await;

    let view = h.executor.execute(wf, Map::new()).await.unwrap();

    assert_eq!(view.status, RunStatus::Completed);
    assert_eq!(view.node_status("gate"), Some(NodeStatus::Skipped));
    assert_eq!(view.node_status("c"), Some(NodeStatus::Skipped));
    assert_eq!(mock.calls(), vec!["gate"]);
}

// ============================================================
// Failures and retries
// ============================================================

#[tokio::test(start_paused = true)]
async fn retryable_failures_are_retried_until_success() {
    let mock = Arc::new(MockNode::new().script(
        "flaky",
        vec![
            MockBehaviour::FailRetryable("502".into()),
            MockBehaviour::FailRetryable("503".into()),
        ],
    ));
    let h = Harness::new(&mock, EngineConfig::default());
    let wf = h.deploy(vec![action("flaky")], vec![]).await;

    let view = h.executor.execute(wf, Map::new()).await.unwrap();

    assert_eq!(view.status, RunStatus::Completed);
    assert_eq!(mock.call_count("flaky"), 3);
    assert_eq!(view.node("flaky").unwrap().attempts, 3);
}

#[tokio::test(start_paused = true)]
async fn exhausted_retries_fail_the_run() {
    let mock = Arc::new(MockNode::new().on("flaky", MockBehaviour::FailRetryable("503".into())));
    let h = Harness::new(&mock, EngineConfig::default().with_max_attempts(2));
    let (nodes, edges) = linear(&["flaky", "after"]);
    let wf = h.deploy(nodes, edges).await;

    let view = h.executor.execute(wf, Map::new()).await.unwrap();

    assert_eq!(view.status, RunStatus::Failed);
    assert_eq!(mock.call_count("flaky"), 2);
    assert_eq!(mock.call_count("after"), 0);
    let failure = view.failure.unwrap();
    assert_eq!(failure.node_id.as_deref(), Some("flaky"));
    assert!(failure.reason.contains("retry budget exhausted"));
}

#[tokio::test(start_paused = true)]
async fn fatal_failure_halts_the_run() {
    let mock = Arc::new(
        MockNode::new()
            .on("boom", MockBehaviour::FailFatal("bad credentials".into()))
            .with_delay("slow", Duration::from_millis(200)),
    );
    let h = Harness::new(&mock, EngineConfig::default());
    let wf = h
        .deploy(
            vec![action("boom"), action("never"), action("slow"), action("after_slow")],
            vec![Edge::new("boom", "never"), Edge::new("slow", "after_slow")],
        )
        .await;

    let view = h.executor.execute(wf, Map::new()).await.unwrap();

    assert_eq!(view.status, RunStatus::Failed);
    assert_eq!(mock.call_count("boom"), 1);
    assert_eq!(mock.call_count("never"), 0);
    // already in flight when the halt happened
    assert_eq!(view.node_status("slow"), Some(NodeStatus::Completed));
    assert_eq!(view.node_status("after_slow"), Some(NodeStatus::Skipped));
    assert_eq!(mock.call_count("after_slow"), 0);
    assert_eq!(view.node("boom").unwrap().last_error.as_deref(), Some("bad credentials"));
}

#[tokio::test(start_paused = true)]
async fn continue_policy_lets_independent_branches_finish() {
    let mock = Arc::new(MockNode::new().on("post", MockBehaviour::FailFatal("rejected".into())));
    let h = Harness::new(&mock, EngineConfig::default());
    let wf = h
        .deploy(
            vec![
                action("post").on_failure(FailurePolicy::Continue),
                action("after_post"),
                action("email"),
                action("after_email"),
            ],
            vec![Edge::new("post", "after_post"), Edge::new("email", "after_email")],
        )
        .await;

    let view = h.executor.execute(wf, Map::new()).await.unwrap();

    assert_eq!(view.status, RunStatus::Completed);
    assert!(view.failure.is_none());
    assert_eq!(view.node_status("post"), Some(NodeStatus::Failed));
    assert_eq!(view.node_status("after_post"), Some(NodeStatus::Skipped));
    assert_eq!(view.node_status("after_email"), Some(NodeStatus::Completed));
    assert_eq!(view.node_failures.len(), 1);
    assert_eq!(view.node_failures[0].node_id.as_deref(), Some("post"));
    assert_eq!(view.node_failures[0].reason, "rejected");
}

#[tokio::test(start_paused = true)]
async fn later_halt_does_not_replace_the_run_failure() {
    let mock = Arc::new(
        MockNode::new()
            .on("boom", MockBehaviour::FailFatal("bad credentials".into()))
            .on("slow", MockBehaviour::FailFatal("quota exceeded".into()))
            .with_delay("slow", Duration::from_millis(200)),
    );
    let h = Harness::new(&mock, EngineConfig::default());
    let wf = h.deploy(vec![action("boom"), action("slow")], vec![]).await;

    let view = h.executor.execute(wf, Map::new()).await.unwrap();

    assert_eq!(view.status, RunStatus::Failed);
    assert_eq!(view.node_status("slow"), Some(NodeStatus::Failed));
    let failure = view.failure.unwrap();
    assert_eq!(failure.node_id.as_deref(), Some("boom"));
    assert_eq!(failure.reason, "bad credentials");
    let failed: Vec<_> = view.node_failures.iter().map(|f| f.node_id.as_deref()).collect();
    assert_eq!(failed, vec![Some("boom"), Some("slow")]);
}

#[tokio::test(start_paused = true)]
async fn halt_skips_nodes_waiting_on_a_retry() {
    let mock = Arc::new(
        MockNode::new()
            .script("flaky", vec![MockBehaviour::FailRetryable("503".into())])
            .on("boom", MockBehaviour::FailFatal("bad credentials".into()))
            .with_delay("boom", Duration::from_millis(50)),
    );
    let config = EngineConfig::default()
        .with_retry_delays(Duration::from_secs(10), Duration::from_secs(30));
    let h = Harness::new(&mock, config);
    let wf = h.deploy(vec![action("flaky"), action("boom")], vec![]).await;

    let view = h.executor.execute(wf, Map::new()).await.unwrap();

    assert_eq!(view.status, RunStatus::Failed);
    assert_eq!(view.failure.as_ref().unwrap().node_id.as_deref(), Some("boom"));
    let flaky = view.node("flaky").unwrap();
    assert_eq!(flaky.status, NodeStatus::Skipped);
    assert_eq!(flaky.attempts, 1);
    assert_eq!(mock.call_count("flaky"), 1);
}

#[tokio::test(start_paused = true)]
async fn timeouts_are_retryable() {
    let mock = Arc::new(MockNode::new().with_delay("hang", Duration::from_secs(60)));
    let h = Harness::new(&mock, EngineConfig::default());
    let wf = h
        .deploy(vec![action("hang").with_timeout_ms(50).with_max_attempts(2)], vec![])
        .await;

    let view = h.executor.execute(wf, Map::new()).await.unwrap();

    assert_eq!(view.status, RunStatus::Failed);
    assert_eq!(mock.call_count("hang"), 2);
    assert!(view.node("hang").unwrap().last_error.as_deref().unwrap().contains("timed out"));
}

#[tokio::test(start_paused = true)]
async fn undeclared_output_is_fatal() {
    let mock = Arc::new(
        MockNode::new().on("a", MockBehaviour::Write(json!({ "expected": 1, "surprise": 2 }))),
    );
    let h = Harness::new(&mock, EngineConfig::default());
    let wf = h.deploy(vec![action("a").with_outputs(&["expected"])], vec![]).await;

    let view = h.executor.execute(wf, Map::new()).await.unwrap();

    assert_eq!(view.status, RunStatus::Failed);
    assert!(view.context.is_empty());
    assert!(view.failure.unwrap().reason.contains("surprise"));
}

// ============================================================
// Pause, resume, cancel
// ============================================================

#[tokio::test(start_paused = true)]
async fn cancel_discards_in_flight_results() {
    let mock = Arc::new(
        MockNode::new()
            .on("a", MockBehaviour::Write(json!({ "a_out": true })))
            .with_delay("a", Duration::from_secs(1)),
    );
    let h = Harness::new(&mock, EngineConfig::default());
    let (nodes, edges) = linear(&["a", "b"]);
    let wf = h.deploy(nodes, edges).await;

    let run = h.executor.trigger(wf, Map::new()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    h.executor.cancel(run).await.unwrap();

    let view = h.executor.wait(run).await.unwrap();
    assert_eq!(view.status, RunStatus::Canceled);
    assert_eq!(view.node_status("a"), Some(NodeStatus::Canceled));
    assert_eq!(view.node_status("b"), Some(NodeStatus::Canceled));

    // let the canceled execution return
    tokio::time::sleep(Duration::from_secs(2)).await;
    let view = h.executor.status(run).await.unwrap();
    assert_eq!(view.status, RunStatus::Canceled);
    assert!(view.context.get("a_out").is_none());
    assert_eq!(mock.call_count("b"), 0);
}

#[tokio::test(start_paused = true)]
async fn pause_and_resume_is_transparent() {
    let mock = Arc::new(
        MockNode::new()
            .on("a", MockBehaviour::Write(json!({ "a_out": 1 })))
            .on("b", MockBehaviour::Write(json!({ "b_out": 2 })))
            .on("c", MockBehaviour::Write(json!({ "c_out": 3 })))
            .with_delay("a", Duration::from_millis(500)),
    );
    let h = Harness::new(&mock, EngineConfig::default());
    let (nodes, edges) = linear(&["a", "b", "c"]);
    let wf = h.deploy(nodes, edges).await;

    let run = h.executor.trigger(wf, Map::new()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    h.executor.pause(run).await.unwrap();

    let paused = h.executor.wait(run).await.unwrap();
    assert_eq!(paused.status, RunStatus::Paused);
    assert_eq!(paused.node_status("a"), Some(NodeStatus::Completed));
    assert_eq!(paused.node_status("b"), Some(NodeStatus::Paused));
    assert_eq!(paused.node_status("c"), Some(NodeStatus::Pending));
    assert_eq!(mock.call_count("b"), 0);

    h.executor.resume(run).await.unwrap();
    let done = h.executor.wait(run).await.unwrap();

    assert_eq!(done.status, RunStatus::Completed);
    assert_eq!(mock.calls(), vec!["a", "b", "c"]);
    assert_eq!(done.context, payload(json!({ "a_out": 1, "b_out": 2, "c_out": 3 })));
}

fn backoff_fixture() -> (Arc<MockNode>, Vec<NodeDefinition>, Vec<Edge>) {
    let mock = Arc::new(
        MockNode::new()
            .script("flaky", vec![MockBehaviour::FailRetryable("503".into())])
            .on("flaky", MockBehaviour::Write(json!({ "f": 1 })))
            .on("slow", MockBehaviour::Write(json!({ "s": 2 })))
            .on("j", MockBehaviour::Write(json!({ "j": 3 })))
            .with_delay("slow", Duration::from_millis(300)),
    );
    let nodes = vec![action("flaky"), action("slow"), action("j")];
    let edges = vec![Edge::new("flaky", "j"), Edge::new("slow", "j")];
    (mock, nodes, edges)
}

fn outline(view: &RunView) -> Vec<(String, NodeStatus, u32)> {
    view.nodes.iter().map(|n| (n.node_id.clone(), n.status, n.attempts)).collect()
}

#[tokio::test(start_paused = true)]
async fn pause_during_backoff_matches_an_unpaused_run() {
    let config = EngineConfig::default()
        .with_retry_delays(Duration::from_secs(1), Duration::from_secs(30));

    let (mock, nodes, edges) = backoff_fixture();
    let h = Harness::new(&mock, config.clone());
    let wf = h.deploy(nodes, edges).await;
    let unpaused = h.executor.execute(wf, Map::new()).await.unwrap();

    let (mock, nodes, edges) = backoff_fixture();
    let h = Harness::new(&mock, config);
    let wf = h.deploy(nodes, edges).await;

    let run = h.executor.trigger(wf, Map::new()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    h.executor.pause(run).await.unwrap();

    let paused = h.executor.wait(run).await.unwrap();
    assert_eq!(paused.status, RunStatus::Paused);
    assert_eq!(paused.node_status("flaky"), Some(NodeStatus::Failed));
    assert_eq!(paused.node("flaky").unwrap().attempts, 1);
    assert_eq!(paused.node_status("slow"), Some(NodeStatus::Completed));
    assert_eq!(paused.node_status("j"), Some(NodeStatus::Pending));

    // the back-off would have elapsed by now; nothing runs while paused
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(mock.call_count("flaky"), 1);

    h.executor.resume(run).await.unwrap();
    let resumed = h.executor.wait(run).await.unwrap();

    assert_eq!(resumed.status, RunStatus::Completed);
    assert_eq!(unpaused.status, RunStatus::Completed);
    assert_eq!(outline(&resumed), outline(&unpaused));
    assert_eq!(resumed.context, unpaused.context);
    assert_eq!(resumed.context, payload(json!({ "f": 1, "s": 2, "j": 3 })));
}

#[tokio::test(start_paused = true)]
async fn cancel_during_backoff_stops_the_retry() {
    let mock = Arc::new(MockNode::new().on("flaky", MockBehaviour::FailRetryable("503".into())));
    let config = EngineConfig::default()
        .with_retry_delays(Duration::from_secs(1), Duration::from_secs(30));
    let h = Harness::new(&mock, config);
    let wf = h.deploy(vec![action("flaky")], vec![]).await;

    let run = h.executor.trigger(wf, Map::new()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    h.executor.cancel(run).await.unwrap();

    let view = h.executor.wait(run).await.unwrap();
    assert_eq!(view.status, RunStatus::Canceled);
    assert_eq!(view.node_status("flaky"), Some(NodeStatus::Canceled));
    assert_eq!(mock.call_count("flaky"), 1);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(mock.call_count("flaky"), 1);
    assert_eq!(h.executor.status(run).await.unwrap().status, RunStatus::Canceled);
}

#[tokio::test(start_paused = true)]
async fn paused_run_can_be_canceled() {
    let mock = Arc::new(MockNode::new().with_delay("a", Duration::from_millis(100)));
    let h = Harness::new(&mock, EngineConfig::default());
    let (nodes, edges) = linear(&["a", "b"]);
    let wf = h.deploy(nodes, edges).await;

    let run = h.executor.trigger(wf, Map::new()).await.unwrap();
    h.executor.pause(run).await.unwrap();
    assert_eq!(h.executor.wait(run).await.unwrap().status, RunStatus::Paused);

    h.executor.cancel(run).await.unwrap();
    let view = h.executor.wait(run).await.unwrap();
    assert_eq!(view.status, RunStatus::Canceled);
    assert_eq!(mock.call_count("b"), 0);
}

#[tokio::test(start_paused = true)]
async fn control_misuse_is_rejected() {
    let mock = Arc::new(MockNode::new());
    let h = Harness::new(&mock, EngineConfig::default());
    let wf = h.deploy(vec![action("a")], vec![]).await;

    let view = h.executor.execute(wf, Map::new()).await.unwrap();
    let run = view.run_id;

    assert!(matches!(
        h.executor.resume(run).await,
        Err(EngineError::InvalidStateTransition {
            status: RunStatus::Completed,
            action: "resume",
            ..
        })
    ));
    assert!(matches!(
        h.executor.pause(run).await,
        Err(EngineError::InvalidStateTransition { action: "pause", .. })
    ));
    assert!(matches!(
        h.executor.cancel(run).await,
        Err(EngineError::InvalidStateTransition { action: "cancel", .. })
    ));

    let unknown = Uuid::new_v4();
    assert!(matches!(
        h.executor.status(unknown).await,
        Err(EngineError::RunNotFound(id)) if id == unknown
    ));
    assert!(matches!(h.executor.cancel(unknown).await, Err(EngineError::RunNotFound(_))));

    assert_eq!(h.executor.prune_finished().await, 1);
    assert!(h.executor.runs().await.is_empty());
}

// ============================================================
// Triggering errors
// ============================================================

#[tokio::test]
async fn trigger_rejects_bad_definitions() {
    let mock = Arc::new(MockNode::for_types(vec![NodeType::Action]));
    let h = Harness::new(&mock, EngineConfig::default());

    let missing = Uuid::new_v4();
    assert!(matches!(
        h.executor.trigger(missing, Map::new()).await,
        Err(EngineError::DefinitionNotFound(id)) if id == missing
    ));

    let cyclic = h
        .deploy(vec![action("x"), action("y")], vec![Edge::new("x", "y"), Edge::new("y", "x")])
        .await;
    assert!(matches!(
        h.executor.trigger(cyclic, Map::new()).await,
        Err(EngineError::Validation(
            ValidationError::CycleDetected(_) | ValidationError::NoEntryNodes
        ))
    ));

    let unknown_type = h.deploy(vec![NodeDefinition::new("t", "teleport")], vec![]).await;
    assert!(matches!(
        h.executor.trigger(unknown_type, Map::new()).await,
        Err(EngineError::UnknownNodeType { node_type, .. }) if node_type == "teleport"
    ));

    let unsupported = h.deploy(vec![NodeDefinition::new("w", "webhook")], vec![]).await;
    assert!(matches!(
        h.executor.trigger(unsupported, Map::new()).await,
        Err(EngineError::UnknownNodeType { node_type, .. }) if node_type == "webhook"
    ));

    assert!(h.executor.runs().await.is_empty());
}

// ============================================================
// Run log
// ============================================================

#[tokio::test(start_paused = true)]
async fn run_log_records_transitions_in_order() {
    let mock = Arc::new(MockNode::new().on("a", MockBehaviour::Write(json!({ "a_out": 1 }))));
    let h = Harness::new(&mock, EngineConfig::default());
    let (nodes, edges) = linear(&["a", "b"]);
    let wf = h.deploy(nodes, edges).await;

    let view = h.executor.execute(wf, Map::new()).await.unwrap();
    let records = h.log.for_run(view.run_id).await;

    let trail: Vec<String> = records
        .iter()
        .map(|r| {
            let subject = r.node_id.as_deref().unwrap_or("run");
            format!("{subject}:{}->{}", r.from_status, r.to_status)
        })
        .collect();
    assert_eq!(
        trail,
        vec![
            "run:pending->running",
            "a:pending->running",
            "a:running->completed",
            "b:pending->running",
            "b:running->completed",
            "run:running->completed",
        ]
    );

    let a_done = &records[2];
    assert_eq!(a_done.context.as_ref().unwrap()["values"]["a_out"], 1);
    assert!(records.last().unwrap().is_run_level());
    assert!(records.windows(2).all(|w| w[0].at <= w[1].at));
}

#[tokio::test(start_paused = true)]
async fn retries_show_up_in_the_log() {
    let mock = Arc::new(
        MockNode::new().script("flaky", vec![MockBehaviour::FailRetryable("503".into())]),
    );
    let h = Harness::new(&mock, EngineConfig::default());
    let wf = h.deploy(vec![action("flaky")], vec![]).await;

    let view = h.executor.execute(wf, Map::new()).await.unwrap();
    let statuses: Vec<String> = h
        .log
        .for_run(view.run_id)
        .await
        .into_iter()
        .filter(|r| !r.is_run_level())
        .map(|r| r.to_status)
        .collect();

    assert_eq!(statuses, vec!["running", "failed", "running", "completed"]);
}

// ============================================================
// Built-in executors
// ============================================================

#[tokio::test(start_paused = true)]
async fn builtin_lead_follow_up_flow() {
    let h = Harness::with_registry(
        ExecutorRegistry::with_builtins(&Collaborators::dry_run()),
        EngineConfig::default(),
    );
    let wf = h
        .deploy(
            vec![
                NodeDefinition::new("start", "trigger"),
                NodeDefinition::new("qualified", "condition").with_config(json!({
                    "field": "trigger.score",
                    "operator": "greater_than",
                    "value": 50
                })),
                NodeDefinition::new("wait", "delay").with_config(json!({ "seconds": 60 })),
                NodeDefinition::new("email", "email_send").with_config(json!({
                    "to": "{{trigger.email}}",
                    "subject": "Welcome",
                    "body": "Hi {{trigger.name}}"
                })),
            ],
            vec![
                Edge::new("start", "qualified"),
                Edge::guarded(
                    "qualified",
                    "wait",
                    json!({ "op": "eq", "path": "condition_result", "value": true }),
                ),
                Edge::new("wait", "email"),
            ],
        )
        .await;

    let hot = h
        .executor
        .execute(wf, payload(json!({ "score": 80, "email": "ana@example.com", "name": "Ana" })))
        .await
        .unwrap();
    assert_eq!(hot.status, RunStatus::Completed);
    assert_eq!(hot.context["condition_result"], true);
    assert_eq!(hot.context["email_receipt"]["dry_run"], true);

    let cold = h.executor.execute(wf, payload(json!({ "score": 10 }))).await.unwrap();
    assert_eq!(cold.status, RunStatus::Completed);
    assert_eq!(cold.node_status("email"), Some(NodeStatus::Skipped));
    assert!(cold.context.get("email_receipt").is_none());
}
