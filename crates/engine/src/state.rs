//! Run state machine.
//!
//! [`RunState`] holds everything one run owns: per-node and per-edge status,
//! the ready queue, the live [`ExecutionContext`] and the outbox of
//! transition records waiting for the log sink. Its methods are the only
//! place where node or run status changes; the executor calls them while
//! holding the run's lock and never while a node is executing.
//!
//! Per node: `pending → running → {completed | failed | skipped}`. A
//! retryable failure leaves the node `failed` with a retry pending, and the
//! next claim moves it back to `running`. `pending`/`running`/`paused` nodes
//! become `canceled` on cancel; ready-but-unclaimed nodes become `paused`
//! on pause.
//!
//! Join semantics are AND-join: a node with several inbound edges becomes
//! ready only once *every* inbound edge is resolved and at least one of them
//! was taken. If all of them were not taken the node is skipped, and the skip
//! propagates through its outgoing edges.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use nodes::{ExecutionContext, ExecutionOutcome, NodeInvocation, NodeType};
use store::TransitionRecord;

use crate::{
    config::EngineConfig,
    graph::ValidatedGraph,
    guard::evaluate_guard,
    models::FailurePolicy,
};

// ---------------------------------------------------------------------------
// Statuses
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Paused,
    Canceled,
    Skipped,
}

impl NodeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending   => "pending",
            Self::Running   => "running",
            Self::Completed => "completed",
            Self::Failed    => "failed",
            Self::Paused    => "paused",
            Self::Canceled  => "canceled",
            Self::Skipped   => "skipped",
        }
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Paused,
    Completed,
    Failed,
    Canceled,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending   => "pending",
            Self::Running   => "running",
            Self::Paused    => "paused",
            Self::Completed => "completed",
            Self::Failed    => "failed",
            Self::Canceled  => "canceled",
        }
    }

    /// `completed`, `failed` and `canceled` are final.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Canceled)
    }

    /// Terminal, or paused: nothing will happen until someone acts.
    pub fn is_settled(&self) -> bool {
        self.is_terminal() || *self == Self::Paused
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EdgeState {
    Unresolved,
    Taken,
    /// Guard false, or the source was skipped.
    NotTaken,
    /// The source failed under the `continue` policy.
    Blocked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Control {
    Run,
    Pause,
}

/// A node that failed for good, and why.
///
/// `RunState::failure` holds the `halt` failure that stopped the run;
/// every permanent node failure, `continue` ones included, is also listed
/// in `RunView::node_failures`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunFailure {
    pub node_id: Option<String>,
    pub reason: String,
}

#[derive(Debug, Clone)]
struct NodeRecord {
    status: NodeStatus,
    attempts: u32,
    retry_pending: bool,
    last_error: Option<String>,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
}

impl NodeRecord {
    fn new() -> Self {
        Self {
            status: NodeStatus::Pending,
            attempts: 0,
            retry_pending: false,
            last_error: None,
            started_at: None,
            ended_at: None,
        }
    }

    fn awaiting_retry(&self) -> bool {
        self.status == NodeStatus::Failed && self.retry_pending
    }
}

// ---------------------------------------------------------------------------
// Values handed to the executor
// ---------------------------------------------------------------------------

/// A node the executor should run now.
#[derive(Debug)]
pub(crate) struct Claim {
    pub index: usize,
    pub node_type: NodeType,
    pub invocation: NodeInvocation,
    pub timeout: Duration,
}

/// What applying an outcome did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Applied {
    /// The node was no longer running (canceled); the outcome was dropped.
    Discarded,
    Completed,
    Skipped,
    /// Re-claim the node after this delay.
    Retry(Duration),
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Settle {
    /// Retry timers are still pending; keep waiting.
    Continue,
    /// The run is settled (terminal or paused); the driver can stop.
    Exit,
}

// ---------------------------------------------------------------------------
// RunState
// ---------------------------------------------------------------------------

pub struct RunState {
    run_id: Uuid,
    graph: Arc<ValidatedGraph>,
    config: EngineConfig,
    status: RunStatus,
    nodes: Vec<NodeRecord>,
    edges: Vec<EdgeState>,
    ready: VecDeque<usize>,
    context: ExecutionContext,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
    failure: Option<RunFailure>,
    node_failures: Vec<RunFailure>,
    halted: bool,
    control: Control,
    outbox: Vec<TransitionRecord>,
}

impl RunState {
    /// A fresh run: every node `pending`, every edge unresolved.
    pub fn new(
        run_id: Uuid,
        graph: Arc<ValidatedGraph>,
        trigger_payload: Map<String, Value>,
        config: EngineConfig,
    ) -> Self {
        Self {
            run_id,
            nodes: vec![NodeRecord::new(); graph.len()],
            edges: vec![EdgeState::Unresolved; graph.edge_count()],
            graph,
            config,
            status: RunStatus::Pending,
            ready: VecDeque::new(),
            context: ExecutionContext::new(trigger_payload),
            started_at: None,
            ended_at: None,
            failure: None,
            node_failures: Vec::new(),
            halted: false,
            control: Control::Run,
            outbox: Vec::new(),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn status(&self) -> RunStatus {
        self.status
    }

    pub fn context(&self) -> &ExecutionContext {
        &self.context
    }

    pub fn node_status(&self, node_id: &str) -> Option<NodeStatus> {
        self.graph.index_of(node_id).map(|n| self.nodes[n].status)
    }

    /// Records produced since the last call, in transition order.
    pub fn take_outbox(&mut self) -> Vec<TransitionRecord> {
        std::mem::take(&mut self.outbox)
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// `pending → running`, seeding the ready queue with the entry nodes.
    /// No-op for runs that already left `pending`.
    pub(crate) fn start(&mut self) {
        if self.status != RunStatus::Pending {
            return;
        }
        self.started_at = Some(Utc::now());
        self.set_run_status(RunStatus::Running, None);
        self.recompute_ready();
    }

    /// Next node to execute, already marked `running`.
    ///
    /// Returns `None` while the run is not running, a pause is pending, or
    /// a `halt` failure happened.
    pub(crate) fn claim_next(&mut self) -> Option<Claim> {
        if self.status != RunStatus::Running || self.control != Control::Run || self.halted {
            return None;
        }

        while let Some(index) = self.ready.pop_front() {
            let record = &self.nodes[index];
            if record.status != NodeStatus::Pending && !record.awaiting_retry() {
                continue;
            }

            let attempt = record.attempts + 1;
            let reason = (attempt > 1).then(|| format!("attempt {attempt}"));
            {
                let record = &mut self.nodes[index];
                record.attempts = attempt;
                record.retry_pending = false;
            }
            self.set_node_status(index, NodeStatus::Running, reason);

            let node = self.graph.graph_node(index);
            debug!(run_id = %self.run_id, node_id = %node.definition.id, attempt, "claimed node");

            return Some(Claim {
                index,
                node_type: node.node_type,
                timeout: self.config.timeout_for(&node.definition),
                invocation: NodeInvocation {
                    run_id: self.run_id,
                    workflow_id: self.graph.workflow_id(),
                    node_id: node.definition.id.clone(),
                    node_type: node.node_type,
                    config: node.definition.config.clone(),
                    attempt,
                    context: self.context.snapshot(),
                },
            });
        }

        None
    }

    /// Fold an executor outcome into node status, context and edge state.
    pub(crate) fn apply_outcome(&mut self, index: usize, outcome: ExecutionOutcome) -> Applied {
        if self.nodes[index].status != NodeStatus::Running {
            debug!(
                run_id = %self.run_id,
                node_id = %self.graph.node_id(index),
                status = %self.nodes[index].status,
                "discarding outcome of a node that is no longer running"
            );
            return Applied::Discarded;
        }

        match outcome {
            ExecutionOutcome::Success(writes) => self.complete(index, writes),
            ExecutionOutcome::Skip(reason) => {
                self.skip(index, reason);
                Applied::Skipped
            }
            ExecutionOutcome::Retryable(reason) => self.retry_or_fail(index, reason),
            ExecutionOutcome::Fatal(reason) => self.fail(index, reason),
        }
    }

    /// A retry back-off for `index` elapsed.
    pub(crate) fn retry_due(&mut self, index: usize) {
        if self.status == RunStatus::Running
            && !self.halted
            && self.nodes[index].awaiting_retry()
            && !self.ready.contains(&index)
        {
            self.ready.push_back(index);
        }
    }

    /// Called when nothing is in flight and nothing more can be claimed.
    pub(crate) fn quiesce(&mut self, timers_pending: bool) -> Settle {
        if self.status != RunStatus::Running {
            return Settle::Exit;
        }
        if self.control == Control::Pause {
            self.settle_pause();
            return Settle::Exit;
        }
        if timers_pending && !self.halted {
            return Settle::Continue;
        }
        self.finish();
        Settle::Exit
    }

    // -----------------------------------------------------------------------
    // External control
    // -----------------------------------------------------------------------

    /// Ask the run to pause at the next node boundary.
    pub(crate) fn request_pause(&mut self) -> Result<(), RunStatus> {
        match self.status {
            RunStatus::Pending | RunStatus::Running => {
                info!(run_id = %self.run_id, "pause requested");
                self.control = Control::Pause;
                Ok(())
            }
            other => Err(other),
        }
    }

    /// `paused → running`; the ready queue is rebuilt from node and edge status.
    pub(crate) fn resume(&mut self) -> Result<(), RunStatus> {
        if self.status != RunStatus::Paused {
            return Err(self.status);
        }
        self.control = Control::Run;
        for index in 0..self.nodes.len() {
            if self.nodes[index].status == NodeStatus::Paused {
                self.set_node_status(index, NodeStatus::Pending, None);
            }
        }
        self.set_run_status(RunStatus::Running, Some("resumed".into()));
        self.recompute_ready();
        Ok(())
    }

    /// Cancel immediately. Nodes still executing are marked `canceled` now;
    /// their outcomes will be discarded when they return.
    pub(crate) fn cancel(&mut self) -> Result<(), RunStatus> {
        if self.status.is_terminal() {
            return Err(self.status);
        }
        for index in 0..self.nodes.len() {
            let record = &self.nodes[index];
            let cancelable = matches!(
                record.status,
                NodeStatus::Pending | NodeStatus::Running | NodeStatus::Paused
            ) || record.awaiting_retry();

            if cancelable {
                self.nodes[index].retry_pending = false;
                self.set_node_status(index, NodeStatus::Canceled, Some("run canceled".into()));
            }
        }
        self.ready.clear();
        self.ended_at = Some(Utc::now());
        self.set_run_status(RunStatus::Canceled, None);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Outcome handling
    // -----------------------------------------------------------------------

    fn complete(&mut self, index: usize, writes: Map<String, Value>) -> Applied {
        let graph = Arc::clone(&self.graph);
        let node = &graph.graph_node(index).definition;

        if !node.outputs.is_empty() {
            if let Some(key) = writes.keys().find(|k| !node.outputs.contains(k)) {
                return self.fail(index, format!("undeclared output key '{key}'"));
            }
        }
        // Writes are committed only once every guard has been evaluated.
        let mut staged = self.context.clone();
        for (key, value) in writes {
            staged.set(key, value);
        }

        // Guards see the post-write context, edges in declaration order.
        let snapshot = staged.snapshot();
        let mut decisions = Vec::with_capacity(graph.outgoing_of(index).len());
        for &e in graph.outgoing_of(index) {
            let edge = graph.edge(e);
            let taken = match &edge.guard {
                None => true,
                Some(guard) => match evaluate_guard(guard, &snapshot) {
                    Ok(taken) => taken,
                    Err(err) if self.config.strict_guards => {
                        let reason = format!("guard on edge {} -> {}: {err}", edge.from, edge.to);
                        return self.fail(index, reason);
                    }
                    Err(err) => {
                        warn!(
                            run_id = %self.run_id,
                            from = %edge.from,
                            to = %edge.to,
                            error = %err,
                            "guard evaluation failed; edge not taken"
                        );
                        false
                    }
                },
            };
            decisions.push((e, taken));
        }

        self.context = staged;
        self.set_node_status(index, NodeStatus::Completed, None);
        for (e, taken) in decisions {
            self.resolve_edge(e, if taken { EdgeState::Taken } else { EdgeState::NotTaken });
        }
        Applied::Completed
    }

    fn skip(&mut self, index: usize, reason: String) {
        self.set_node_status(index, NodeStatus::Skipped, Some(reason));
        let graph = Arc::clone(&self.graph);
        for &e in graph.outgoing_of(index) {
            self.resolve_edge(e, EdgeState::NotTaken);
        }
    }

    fn retry_or_fail(&mut self, index: usize, reason: String) -> Applied {
        let attempts = self.nodes[index].attempts;
        let budget = self.config.attempts_for(&self.graph.graph_node(index).definition);

        if self.halted {
            return self.fail(index, reason);
        }
        if attempts >= budget {
            let reason = format!("retry budget exhausted after {attempts} attempts: {reason}");
            return self.fail(index, reason);
        }

        let delay = self.config.backoff_delay(attempts);
        {
            let record = &mut self.nodes[index];
            record.retry_pending = true;
            record.last_error = Some(reason.clone());
        }
        self.set_node_status(
            index,
            NodeStatus::Failed,
            Some(format!("attempt {attempts}/{budget} failed, retrying in {delay:?}: {reason}")),
        );
        Applied::Retry(delay)
    }

    fn fail(&mut self, index: usize, reason: String) -> Applied {
        let graph = Arc::clone(&self.graph);
        let node = &graph.graph_node(index).definition;

        {
            let record = &mut self.nodes[index];
            record.retry_pending = false;
            record.last_error = Some(reason.clone());
        }
        self.set_node_status(index, NodeStatus::Failed, Some(reason.clone()));
        warn!(
            run_id = %self.run_id,
            node_id = %node.id,
            policy = ?node.on_failure,
            %reason,
            "node failed"
        );

        let failure = RunFailure {
            node_id: Some(node.id.clone()),
            reason,
        };
        self.node_failures.push(failure.clone());

        match node.on_failure {
            // Only the first halt names the run's failure; nodes that were
            // already in flight may fail afterwards.
            FailurePolicy::Halt if !self.halted => {
                self.failure = Some(failure);
                self.halt();
            }
            FailurePolicy::Halt => {}
            FailurePolicy::Continue => {
                for &e in graph.outgoing_of(index) {
                    self.resolve_edge(e, EdgeState::Blocked);
                }
            }
        }
        Applied::Failed
    }

    /// Stop claiming. Nodes waiting on a retry back-off will never be
    /// re-run, so they are skipped now rather than left `failed`.
    fn halt(&mut self) {
        self.halted = true;
        self.ready.clear();
        for index in 0..self.nodes.len() {
            if self.nodes[index].awaiting_retry() {
                self.nodes[index].retry_pending = false;
                self.set_node_status(index, NodeStatus::Skipped, Some("run halted".into()));
            }
        }
    }

    /// Resolve an edge and settle its target, propagating skips.
    fn resolve_edge(&mut self, edge: usize, state: EdgeState) {
        let graph = Arc::clone(&self.graph);
        let mut work = vec![(edge, state)];

        while let Some((e, state)) = work.pop() {
            if self.edges[e] != EdgeState::Unresolved {
                continue;
            }
            self.edges[e] = state;

            let target = graph.target_of(e);
            if self.nodes[target].status != NodeStatus::Pending {
                continue;
            }

            let inbound: Vec<EdgeState> =
                graph.incoming_of(target).iter().map(|&i| self.edges[i]).collect();
            let propagate = if inbound.contains(&EdgeState::Blocked) {
                let reason = Some("upstream node failed".into());
                self.set_node_status(target, NodeStatus::Skipped, reason);
                EdgeState::Blocked
            } else if inbound.contains(&EdgeState::Unresolved) {
                // join barrier: wait for the remaining predecessors
                continue;
            } else if inbound.contains(&EdgeState::Taken) {
                self.ready.push_back(target);
                continue;
            } else {
                let reason = Some("no inbound edge taken".into());
                self.set_node_status(target, NodeStatus::Skipped, reason);
                EdgeState::NotTaken
            };

            work.extend(graph.outgoing_of(target).iter().map(|&out| (out, propagate)));
        }
    }

    fn recompute_ready(&mut self) {
        self.ready.clear();
        for index in 0..self.nodes.len() {
            let record = &self.nodes[index];
            let ready = match record.status {
                NodeStatus::Pending => self.inbound_satisfied(index),
                NodeStatus::Failed => record.retry_pending,
                _ => false,
            };
            if ready {
                self.ready.push_back(index);
            }
        }
    }

    fn inbound_satisfied(&self, index: usize) -> bool {
        if self.graph.is_entry(index) {
            return true;
        }
        let inbound = self.graph.incoming_of(index).iter().map(|&e| self.edges[e]);
        let mut any_taken = false;
        for state in inbound {
            match state {
                EdgeState::Taken => any_taken = true,
                EdgeState::NotTaken => {}
                EdgeState::Unresolved | EdgeState::Blocked => return false,
            }
        }
        any_taken
    }

    fn settle_pause(&mut self) {
        while let Some(index) = self.ready.pop_front() {
            if self.nodes[index].status == NodeStatus::Pending {
                self.set_node_status(index, NodeStatus::Paused, Some("run paused".into()));
            }
        }
        self.set_run_status(RunStatus::Paused, None);
    }

    fn finish(&mut self) {
        let leftover_reason = if self.halted { "run halted" } else { "not reached" };
        for index in 0..self.nodes.len() {
            self.nodes[index].retry_pending = false;
            if matches!(self.nodes[index].status, NodeStatus::Pending | NodeStatus::Paused) {
                self.set_node_status(index, NodeStatus::Skipped, Some(leftover_reason.into()));
            }
        }
        self.ready.clear();
        self.ended_at = Some(Utc::now());

        // Failures under `continue` stay node-level; only a halt fails the run.
        match self.failure.clone() {
            Some(failure) => self.set_run_status(RunStatus::Failed, Some(failure.reason)),
            None => self.set_run_status(RunStatus::Completed, None),
        }
    }

    // -----------------------------------------------------------------------
    // Transitions
    // -----------------------------------------------------------------------

    fn set_node_status(&mut self, index: usize, to: NodeStatus, reason: Option<String>) {
        let now = Utc::now();
        let record = &mut self.nodes[index];
        let from = record.status;
        if from == to {
            return;
        }
        record.status = to;
        match to {
            NodeStatus::Running => {
                if record.started_at.is_none() {
                    record.started_at = Some(now);
                }
                record.ended_at = None;
            }
            NodeStatus::Completed
            | NodeStatus::Failed
            | NodeStatus::Skipped
            | NodeStatus::Canceled => {
                record.ended_at = Some(now);
            }
            NodeStatus::Pending | NodeStatus::Paused => {}
        }

        let context = (to == NodeStatus::Completed && self.config.log_context_snapshots)
            .then(|| self.context.to_value());
        self.outbox.push(TransitionRecord {
            run_id: self.run_id,
            node_id: Some(self.graph.node_id(index).to_string()),
            from_status: from.to_string(),
            to_status: to.to_string(),
            at: now,
            reason,
            context,
        });
    }

    fn set_run_status(&mut self, to: RunStatus, reason: Option<String>) {
        let from = self.status;
        if from == to {
            return;
        }
        self.status = to;
        info!(run_id = %self.run_id, %from, %to, "run status changed");

        let context = (to.is_settled() && self.config.log_context_snapshots)
            .then(|| self.context.to_value());
        self.outbox.push(TransitionRecord {
            run_id: self.run_id,
            node_id: None,
            from_status: from.to_string(),
            to_status: to.to_string(),
            at: Utc::now(),
            reason,
            context,
        });
    }

    // -----------------------------------------------------------------------
    // Views
    // -----------------------------------------------------------------------

    pub fn view(&self) -> RunView {
        RunView {
            run_id: self.run_id,
            workflow_id: self.graph.workflow_id(),
            status: self.status,
            nodes: self
                .nodes
                .iter()
                .enumerate()
                .map(|(index, record)| NodeView {
                    node_id: self.graph.node_id(index).to_string(),
                    status: record.status,
                    attempts: record.attempts,
                    last_error: record.last_error.clone(),
                    started_at: record.started_at,
                    ended_at: record.ended_at,
                })
                .collect(),
            context: self.context.values().clone(),
            started_at: self.started_at,
            ended_at: self.ended_at,
            failure: self.failure.clone(),
            node_failures: self.node_failures.clone(),
        }
    }
}

/// Read-only snapshot of a run, as returned by the control API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunView {
    pub run_id: Uuid,
    pub workflow_id: Uuid,
    pub status: RunStatus,
    /// In declaration order.
    pub nodes: Vec<NodeView>,
    pub context: Map<String, Value>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    /// Set when a `halt` failure stopped the run.
    pub failure: Option<RunFailure>,
    /// Every node that failed for good, in the order they failed.
    pub node_failures: Vec<RunFailure>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeView {
    pub node_id: String,
    pub status: NodeStatus,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl RunView {
    pub fn node(&self, node_id: &str) -> Option<&NodeView> {
        self.nodes.iter().find(|n| n.node_id == node_id)
    }

    pub fn node_status(&self, node_id: &str) -> Option<NodeStatus> {
        self.node(node_id).map(|n| n.status)
    }
}
