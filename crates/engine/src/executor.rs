//! Workflow execution engine.
//!
//! `WorkflowExecutor` is the central orchestrator:
//! 1. Loads a definition, validates its graph and checks every node type has
//!    an executor.
//! 2. Creates a run and spawns a driver task for it.
//! 3. The driver claims ready nodes (up to `concurrency` at a time), runs
//!    each with a timeout, and folds the outcome back into the run state.
//! 4. Retry back-offs are timers; the run state is never locked while a
//!    node executes.
//! 5. Every transition is appended to the run log before the run's status
//!    is published to waiters.
//!
//! Pause, resume and cancel act on the run state directly and wake the
//! driver. A paused run has no driver; resume spawns a new one.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};
use tokio::sync::{watch, Mutex, Notify, RwLock};
use tokio::task::JoinSet;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use nodes::{ExecutionOutcome, NodeExecutor, NodeInvocation};
use store::{DefinitionRepository, RunLogSink, StoreError};

use crate::{
    config::EngineConfig,
    graph::ValidatedGraph,
    models::WorkflowDefinition,
    registry::ExecutorRegistry,
    state::{Applied, RunState, RunStatus, RunView, Settle},
    EngineError,
};

// ---------------------------------------------------------------------------
// Per-run handle
// ---------------------------------------------------------------------------

struct RunHandle {
    run_id: Uuid,
    state: Mutex<RunState>,
    /// Wakes the driver after an external pause or cancel.
    wake: Notify,
    /// Serialises outbox flushes so records reach the sink in order.
    flush_lock: Mutex<()>,
    /// Last status whose records have been flushed.
    status: watch::Sender<RunStatus>,
    sink: Arc<dyn RunLogSink>,
}

impl RunHandle {
    /// Append pending transition records, then publish the run status.
    async fn flush(&self) {
        let _guard = self.flush_lock.lock().await;
        let (records, status) = {
            let mut state = self.state.lock().await;
            (state.take_outbox(), state.status())
        };
        for record in records {
            if let Err(e) = self.sink.append(record).await {
                warn!(run_id = %self.run_id, error = %e, "failed to append run log record");
            }
        }
        self.status.send_replace(status);
    }
}

// ---------------------------------------------------------------------------
// WorkflowExecutor
// ---------------------------------------------------------------------------

/// Drives workflow runs and exposes the run control API.
///
/// Construct one executor per process and share it; runs are independent
/// of each other and of the caller that triggered them.
pub struct WorkflowExecutor {
    definitions: Arc<dyn DefinitionRepository>,
    sink: Arc<dyn RunLogSink>,
    registry: Arc<ExecutorRegistry>,
    config: EngineConfig,
    runs: RwLock<HashMap<Uuid, Arc<RunHandle>>>,
}

impl WorkflowExecutor {
    pub fn new(
        definitions: Arc<dyn DefinitionRepository>,
        sink: Arc<dyn RunLogSink>,
        registry: ExecutorRegistry,
        config: EngineConfig,
    ) -> Self {
        Self {
            definitions,
            sink,
            registry: Arc::new(registry),
            config,
            runs: RwLock::new(HashMap::new()),
        }
    }

    pub fn registry(&self) -> &ExecutorRegistry {
        &self.registry
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Start a run of a stored workflow and return its id without waiting.
    ///
    /// # Errors
    /// `DefinitionNotFound` for an unknown id, `Validation` for a malformed
    /// or cyclic graph, `UnknownNodeType` when a node has no executor.
    #[instrument(skip(self, payload))]
    pub async fn trigger(
        &self,
        workflow_id: Uuid,
        payload: Map<String, Value>,
    ) -> Result<Uuid, EngineError> {
        let row = self.definitions.load(workflow_id).await.map_err(|e| match e {
            StoreError::NotFound => EngineError::DefinitionNotFound(workflow_id),
            other => other.into(),
        })?;
        let definition = WorkflowDefinition::from_row(row)?;
        let graph = ValidatedGraph::load(definition)?;
        self.start(Arc::new(graph), payload).await
    }

    /// Start a run of an already validated graph. The graph can be shared
    /// by any number of concurrent runs.
    pub async fn start(
        &self,
        graph: Arc<ValidatedGraph>,
        payload: Map<String, Value>,
    ) -> Result<Uuid, EngineError> {
        self.registry.ensure_supported(&graph)?;

        let run_id = Uuid::new_v4();
        let workflow_id = graph.workflow_id();
        let (status, _) = watch::channel(RunStatus::Pending);
        let handle = Arc::new(RunHandle {
            run_id,
            state: Mutex::new(RunState::new(run_id, graph, payload, self.config.clone())),
            wake: Notify::new(),
            flush_lock: Mutex::new(()),
            status,
            sink: Arc::clone(&self.sink),
        });

        self.runs.write().await.insert(run_id, Arc::clone(&handle));
        info!(%run_id, %workflow_id, "run created");

        self.spawn_driver(handle);
        Ok(run_id)
    }

    /// Trigger a run and wait until it is settled.
    pub async fn execute(
        &self,
        workflow_id: Uuid,
        payload: Map<String, Value>,
    ) -> Result<RunView, EngineError> {
        let run_id = self.trigger(workflow_id, payload).await?;
        self.wait(run_id).await
    }

    /// Wait until the run is terminal or paused, and return its view.
    pub async fn wait(&self, run_id: Uuid) -> Result<RunView, EngineError> {
        let handle = self.handle(run_id).await?;
        let mut status = handle.status.subscribe();
        // The handle owns the sender, so this cannot observe a closed channel.
        let _ = status.wait_for(RunStatus::is_settled).await;
        let view = handle.state.lock().await.view();
        Ok(view)
    }

    pub async fn status(&self, run_id: Uuid) -> Result<RunView, EngineError> {
        let handle = self.handle(run_id).await?;
        let view = handle.state.lock().await.view();
        Ok(view)
    }

    /// Ids of every run this executor knows about.
    pub async fn runs(&self) -> Vec<Uuid> {
        self.runs.read().await.keys().copied().collect()
    }

    /// Stop claiming new nodes; in-flight nodes finish first.
    #[instrument(skip(self))]
    pub async fn pause(&self, run_id: Uuid) -> Result<(), EngineError> {
        let handle = self.handle(run_id).await?;
        handle
            .state
            .lock()
            .await
            .request_pause()
            .map_err(|status| EngineError::InvalidStateTransition {
                run_id,
                status,
                action: "pause",
            })?;
        handle.wake.notify_one();
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn resume(&self, run_id: Uuid) -> Result<(), EngineError> {
        let handle = self.handle(run_id).await?;
        handle
            .state
            .lock()
            .await
            .resume()
            .map_err(|status| EngineError::InvalidStateTransition {
                run_id,
                status,
                action: "resume",
            })?;
        handle.flush().await;
        self.spawn_driver(handle);
        Ok(())
    }

    /// Cancel the run now. Outcomes of nodes still executing are discarded.
    #[instrument(skip(self))]
    pub async fn cancel(&self, run_id: Uuid) -> Result<(), EngineError> {
        let handle = self.handle(run_id).await?;
        handle
            .state
            .lock()
            .await
            .cancel()
            .map_err(|status| EngineError::InvalidStateTransition {
                run_id,
                status,
                action: "cancel",
            })?;
        handle.flush().await;
        handle.wake.notify_one();
        Ok(())
    }

    /// Forget terminal runs. Returns how many were dropped.
    pub async fn prune_finished(&self) -> usize {
        let mut runs = self.runs.write().await;
        let before = runs.len();
        runs.retain(|_, handle| !handle.status.borrow().is_terminal());
        before - runs.len()
    }

    async fn handle(&self, run_id: Uuid) -> Result<Arc<RunHandle>, EngineError> {
        self.runs
            .read()
            .await
            .get(&run_id)
            .cloned()
            .ok_or(EngineError::RunNotFound(run_id))
    }

    fn spawn_driver(&self, handle: Arc<RunHandle>) {
        let driver = RunDriver {
            handle,
            registry: Arc::clone(&self.registry),
            concurrency: self.config.concurrency.max(1),
        };
        tokio::spawn(driver.drive());
    }
}

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

struct RunDriver {
    handle: Arc<RunHandle>,
    registry: Arc<ExecutorRegistry>,
    concurrency: usize,
}

impl RunDriver {
    #[instrument(name = "run", skip(self), fields(run_id = %self.handle.run_id))]
    async fn drive(self) {
        let mut in_flight: JoinSet<(usize, ExecutionOutcome)> = JoinSet::new();
        let mut timers: JoinSet<usize> = JoinSet::new();

        self.handle.state.lock().await.start();

        loop {
            let settle = {
                let mut state = self.handle.state.lock().await;
                while in_flight.len() < self.concurrency {
                    let Some(claim) = state.claim_next() else { break };
                    let executor = self.registry.get(claim.node_type);
                    let index = claim.index;
                    in_flight.spawn(async move {
                        let outcome = match executor {
                            Some(executor) => {
                                invoke(executor, claim.invocation, claim.timeout).await
                            }
                            None => ExecutionOutcome::Fatal(format!(
                                "no executor registered for node type '{}'",
                                claim.node_type
                            )),
                        };
                        (index, outcome)
                    });
                }
                if in_flight.is_empty() {
                    state.quiesce(!timers.is_empty())
                } else {
                    Settle::Continue
                }
            };
            self.handle.flush().await;

            if settle == Settle::Exit {
                break;
            }

            tokio::select! {
                Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => match joined {
                    Ok((index, outcome)) => {
                        let applied = self.handle.state.lock().await.apply_outcome(index, outcome);
                        if let Applied::Retry(delay) = applied {
                            timers.spawn(async move {
                                tokio::time::sleep(delay).await;
                                index
                            });
                        }
                    }
                    Err(e) => error!(error = %e, "node task failed outside the executor"),
                },
                Some(Ok(index)) = timers.join_next(), if !timers.is_empty() => {
                    self.handle.state.lock().await.retry_due(index);
                }
                _ = self.handle.wake.notified() => {}
            }
        }

        timers.abort_all();
        let status = *self.handle.status.borrow();
        info!(%status, "driver stopped");
    }
}

/// Run one invocation with a timeout. A panicking executor is a fatal
/// failure of that node; a timeout is retryable.
async fn invoke(
    executor: Arc<dyn NodeExecutor>,
    invocation: NodeInvocation,
    timeout: Duration,
) -> ExecutionOutcome {
    let node_id = invocation.node_id.clone();
    let mut task = tokio::spawn(async move { executor.execute(&invocation).await });

    match tokio::time::timeout(timeout, &mut task).await {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(e)) => {
            error!(%node_id, error = %e, "executor panicked");
            ExecutionOutcome::Fatal(format!("executor panicked: {e}"))
        }
        Err(_) => {
            task.abort();
            warn!(%node_id, ?timeout, "node execution timed out");
            ExecutionOutcome::Retryable(format!("timed out after {timeout:?}"))
        }
    }
}
