//! Flow - the orchestration entry point
//!
//! Drives a [`FlowPlan`] batch by batch: every descriptor in a batch runs as
//! its own tokio task, failures are captured per descriptor without
//! cancelling siblings, and the first batch carrying an error triggers the
//! rollback pass before the run surfaces an aggregate error.

use chrono::Utc;
use futures::future::join_all;
use futures::stream::{FuturesUnordered, StreamExt};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::core::errors::{ActionError, FlowError, Result};
use crate::flow::plan::{ActionDescriptor, FlowGraph, FlowPlan};
use crate::flow::trace::ExecutionTrace;

/// A runnable workflow built from a DAG of actions.
///
/// Construction validates and plans the graph once; the plan and its
/// descriptors live as long as the Flow. `run` mutates descriptor state in
/// place and must not be invoked concurrently on the same Flow.
pub struct Flow {
    plan: Arc<FlowPlan>,
    run_id: RwLock<Option<String>>,
}

impl Flow {
    /// Build a Flow from a workflow graph.
    ///
    /// Fails with [`FlowError::Construction`] if the graph is cyclic.
    pub fn new(dag: FlowGraph) -> Result<Self> {
        let plan = FlowPlan::build(dag)?;
        Ok(Self {
            plan: Arc::new(plan),
            run_id: RwLock::new(None),
        })
    }

    /// The plan derived from the DAG at construction time
    pub fn plan(&self) -> &FlowPlan {
        &self.plan
    }

    /// Execute the workflow against a seed input.
    ///
    /// Batches run strictly in order; within a batch every action runs
    /// concurrently against the results of strictly earlier batches. On the
    /// first batch carrying a failure, compensation runs and the call
    /// returns [`FlowError::Aggregate`] holding exactly that batch's action
    /// errors. On success, returns the ordered results of the final batch
    /// only.
    pub async fn run(&self, initial_input: Value) -> Result<Vec<Value>> {
        let run_id = cuid2::create_id();
        info!(run_id = %run_id, batches = self.plan.len(), "starting flow run");
        *self.run_id.write().await = Some(run_id);

        self.plan.reset().await;
        if let Some(root) = self.plan.batches.first().and_then(|batch| batch.first()) {
            let mut state = root.state.write().await;
            state.result = Some(initial_input);
            state.started_at = Some(Utc::now());
            state.ended_at = state.started_at;
        }

        for batch_index in 1..self.plan.len() {
            self.execute_batch(batch_index).await;

            let mut failures = Vec::new();
            for descriptor in &self.plan.batches[batch_index] {
                if let Some(error) = descriptor.state.read().await.error.clone() {
                    failures.push((descriptor.clone(), error));
                }
            }
            if !failures.is_empty() {
                warn!(
                    batch = batch_index,
                    failed = failures.len(),
                    "batch failed, rolling back"
                );
                self.rollback(batch_index, &failures).await;
                let errors = failures.into_iter().map(|(_, error)| error).collect();
                return Err(FlowError::aggregate(batch_index, errors));
            }
        }

        let mut results = Vec::new();
        if let Some(last) = self.plan.batches.last() {
            for descriptor in last {
                let state = descriptor.state.read().await;
                results.push(state.result.clone().unwrap_or(Value::Null));
            }
        }
        Ok(results)
    }

    /// Snapshot the per-node execution records of the most recent run
    pub async fn trace(&self) -> ExecutionTrace {
        let run_id = self.run_id.read().await.clone();
        ExecutionTrace::capture(run_id, &self.plan).await
    }

    /// Run one batch to completion, every descriptor as its own task.
    ///
    /// A failing or panicking action never cancels its siblings; the batch
    /// is finished only once every task has settled.
    async fn execute_batch(&self, batch_index: usize) {
        let batch = &self.plan.batches[batch_index];
        debug!(batch = batch_index, size = batch.len(), "executing batch");

        let mut tasks = FuturesUnordered::new();
        for descriptor in batch {
            let plan = self.plan.clone();
            let descriptor = descriptor.clone();
            let handle = tokio::spawn(run_descriptor(plan, descriptor.clone()));
            tasks.push(async move { (descriptor, handle.await) });
        }

        while let Some((descriptor, joined)) = tasks.next().await {
            if let Err(join_error) = joined {
                // A panicking action never reached its own bookkeeping
                let mut state = descriptor.state.write().await;
                if state.error.is_none() {
                    state.error = Some(ActionError {
                        action: descriptor.action.name().to_string(),
                        message: format!("action panicked: {join_error}"),
                    });
                }
                if state.ended_at.is_none() {
                    state.ended_at = Some(Utc::now());
                }
            }
        }
    }

    /// Compensation pass for a failed batch.
    ///
    /// First compensates the failed descriptors of the triggering batch, one
    /// by one; then compensates every descriptor of every batch from the
    /// triggering index through the last, concurrently within each batch.
    /// The triggering batch is thus compensated twice and batches before it
    /// are never compensated; descriptors past the point of failure are
    /// compensated even though they never ran, seeing `Null` where their
    /// predecessors produced nothing.
    async fn rollback(&self, failed_batch: usize, failures: &[(Arc<ActionDescriptor>, ActionError)]) {
        for (descriptor, _) in failures {
            self.compensate(descriptor).await;
        }
        for batch in &self.plan.batches[failed_batch..] {
            join_all(batch.iter().map(|descriptor| self.compensate(descriptor))).await;
        }
    }

    /// Invoke one descriptor's compensating action with its predecessor
    /// results. Missing compensation is a logged no-op; a compensation
    /// error is observed but never propagated. A successful compensation's
    /// return value is recorded on the descriptor without touching the
    /// primary `result`, so later compensations read the run's real data.
    async fn compensate(&self, descriptor: &ActionDescriptor) {
        let name = descriptor.action.name();
        let Some(compensation) = descriptor.action.compensation() else {
            warn!(action = name, "no compensating action registered");
            return;
        };
        info!(
            action = name,
            compensation = compensation.name(),
            "rolling back"
        );
        let results = self.plan.predecessor_results(descriptor).await;
        match compensation.execute(results).await {
            Ok(value) => {
                descriptor.state.write().await.compensated = Some(value);
            }
            Err(error) => {
                warn!(
                    action = name,
                    compensation = compensation.name(),
                    error = %error,
                    "compensation failed"
                );
            }
        }
    }
}

impl fmt::Debug for Flow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Flow").field("plan", &self.plan).finish()
    }
}

/// Run one descriptor's action and record the outcome on its state
async fn run_descriptor(plan: Arc<FlowPlan>, descriptor: Arc<ActionDescriptor>) {
    let results = plan.predecessor_results(&descriptor).await;
    descriptor.state.write().await.started_at = Some(Utc::now());

    let outcome = descriptor.action.execute(results).await;

    let mut state = descriptor.state.write().await;
    state.ended_at = Some(Utc::now());
    match outcome {
        Ok(value) => {
            debug!(action = descriptor.action.name(), "action completed");
            state.result = Some(value);
        }
        Err(error) => {
            warn!(action = descriptor.action.name(), error = %error, "action failed");
            state.error = Some(ActionError::new(descriptor.action.name(), &error));
        }
    }
}
