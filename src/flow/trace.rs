//! Replayable execution trace
//!
//! A serializable snapshot of every descriptor's run record, for
//! diagnostics: what ran, when, with which outcome.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::errors::ActionError;
use crate::flow::plan::{Coord, FlowPlan};

/// One node's record within a trace
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeTrace {
    pub action: String,
    pub coord: Coord,
    pub predecessors: Vec<Coord>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub result: Option<Value>,
    pub error: Option<ActionError>,
    pub compensated: Option<Value>,
}

/// Snapshot of a flow's descriptors, batch by batch, keyed by the id of the
/// run that last touched them
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionTrace {
    pub run_id: Option<String>,
    pub batches: Vec<Vec<NodeTrace>>,
}

impl ExecutionTrace {
    pub(crate) async fn capture(run_id: Option<String>, plan: &FlowPlan) -> Self {
        let mut batches = Vec::with_capacity(plan.len());
        for batch in &plan.batches {
            let mut nodes = Vec::with_capacity(batch.len());
            for descriptor in batch {
                let state = descriptor.state.read().await;
                nodes.push(NodeTrace {
                    action: descriptor.action.name().to_string(),
                    coord: descriptor.coord,
                    predecessors: descriptor.predecessors.clone(),
                    started_at: state.started_at,
                    ended_at: state.ended_at,
                    result: state.result.clone(),
                    error: state.error.clone(),
                    compensated: state.compensated.clone(),
                });
            }
            batches.push(nodes);
        }
        Self { run_id, batches }
    }

    /// Flat iterator over every node record
    pub fn nodes(&self) -> impl Iterator<Item = &NodeTrace> {
        self.batches.iter().flatten()
    }

    /// Find a node record by action name
    pub fn node(&self, action: &str) -> Option<&NodeTrace> {
        self.nodes().find(|node| node.action == action)
    }
}
