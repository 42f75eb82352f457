//! Graph normalization and batch planning
//!
//! Turns a validated DAG of actions into a `FlowPlan`: an ordered list of
//! batches in which every node sits strictly after all of its predecessors.
//! Nodes in the same batch share a topological generation and are safe to
//! run concurrently.

use chrono::{DateTime, Utc};
use petgraph::algo::{is_cyclic_directed, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::core::errors::{ActionError, FlowError, Result};
use crate::flow::action::{Action, NoopAction};

/// The workflow graph accepted by [`Flow::new`](crate::flow::Flow::new).
///
/// Nodes are actions, edges mean "must complete before".
pub type FlowGraph = DiGraph<Arc<dyn Action>, ()>;

/// Position of a descriptor inside the plan: `(batch index, slot in batch)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Coord {
    pub batch: usize,
    pub slot: usize,
}

/// Mutable per-run record of one node's execution
#[derive(Debug, Default)]
pub struct DescriptorState {
    pub result: Option<Value>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub error: Option<ActionError>,
    pub compensated: Option<Value>,
}

/// One DAG node wrapped for execution: the action, its plan coordinates,
/// and its mutable run record.
///
/// During the primary pass each state field is written at most once, by the
/// task running this descriptor's action. Rollback records a compensating
/// action's return value in `compensated`; `result` keeps whatever the
/// primary pass produced, so compensations of later batches still see the
/// run's real data (or the null holes it left).
pub struct ActionDescriptor {
    pub action: Arc<dyn Action>,
    pub coord: Coord,
    pub predecessors: Vec<Coord>,
    pub state: RwLock<DescriptorState>,
}

impl ActionDescriptor {
    fn new(action: Arc<dyn Action>, coord: Coord, predecessors: Vec<Coord>) -> Self {
        Self {
            action,
            coord,
            predecessors,
            state: RwLock::new(DescriptorState::default()),
        }
    }
}

/// Descriptors sharing one topological generation; intra-batch order carries
/// no dependency meaning.
pub type Batch = Vec<Arc<ActionDescriptor>>;

/// The ordered batches derived from a DAG. Batch 0 holds exactly the
/// synthetic root; batch indices strictly increase along every edge.
pub struct FlowPlan {
    pub batches: Vec<Batch>,
}

impl FlowPlan {
    /// Validate, normalize and layer a DAG into a plan.
    ///
    /// Fails if the graph is cyclic. Every node with in-degree zero gets an
    /// edge from a synthetic [`NoopAction`] root first, so the caller's seed
    /// input has a single entry point.
    pub fn build(mut dag: FlowGraph) -> Result<Self> {
        if is_cyclic_directed(&dag) {
            return Err(FlowError::construction("workflow graph contains a cycle"));
        }
        let root = attach_synthetic_root(&mut dag);

        let order = toposort(&dag, None)
            .map_err(|_| FlowError::construction("workflow graph contains a cycle"))?;

        // Batch index = topological generation: 0 for the root, else
        // 1 + max generation of the predecessors.
        let mut generations: HashMap<NodeIndex, usize> = HashMap::new();
        let mut coords: HashMap<NodeIndex, Coord> = HashMap::new();
        let mut layers: Vec<Vec<NodeIndex>> = Vec::new();
        for idx in order {
            let generation = if idx == root {
                0
            } else {
                1 + dag
                    .neighbors_directed(idx, Direction::Incoming)
                    .map(|pred| generations.get(&pred).copied().unwrap_or(0))
                    .max()
                    .unwrap_or(0)
            };
            generations.insert(idx, generation);
            if layers.len() <= generation {
                layers.resize_with(generation + 1, Vec::new);
            }
            coords.insert(
                idx,
                Coord {
                    batch: generation,
                    slot: layers[generation].len(),
                },
            );
            layers[generation].push(idx);
        }

        let mut batches = Vec::with_capacity(layers.len());
        for layer in &layers {
            let mut batch = Vec::with_capacity(layer.len());
            for &idx in layer {
                let predecessors = dag
                    .neighbors_directed(idx, Direction::Incoming)
                    .map(|pred| {
                        coords.get(&pred).copied().ok_or_else(|| {
                            FlowError::construction(format!(
                                "predecessor of '{}' has no plan coordinate",
                                dag[idx].name()
                            ))
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                batch.push(Arc::new(ActionDescriptor::new(
                    dag[idx].clone(),
                    coords[&idx],
                    predecessors,
                )));
            }
            batches.push(batch);
        }

        Ok(Self { batches })
    }

    /// Number of batches, the synthetic root's included
    pub fn len(&self) -> usize {
        self.batches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    pub fn descriptor(&self, coord: Coord) -> Option<&Arc<ActionDescriptor>> {
        self.batches.get(coord.batch)?.get(coord.slot)
    }

    /// Gather the ordered predecessor results of a descriptor.
    ///
    /// Predecessors live in strictly earlier batches, so their records are
    /// settled by the time this runs; a predecessor that never produced a
    /// result reads as `Value::Null` (rollback relies on this).
    pub async fn predecessor_results(&self, descriptor: &ActionDescriptor) -> Vec<Value> {
        let mut results = Vec::with_capacity(descriptor.predecessors.len());
        for &coord in &descriptor.predecessors {
            let value = match self.descriptor(coord) {
                Some(pred) => pred.state.read().await.result.clone(),
                None => None,
            };
            results.push(value.unwrap_or(Value::Null));
        }
        results
    }

    /// Clear every descriptor's run record ahead of a fresh run
    pub async fn reset(&self) {
        for batch in &self.batches {
            for descriptor in batch {
                *descriptor.state.write().await = DescriptorState::default();
            }
        }
    }
}

impl fmt::Debug for FlowPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let batch_sizes: Vec<usize> = self.batches.iter().map(Vec::len).collect();
        f.debug_struct("FlowPlan")
            .field("batches", &batch_sizes)
            .finish()
    }
}

/// Wire every in-degree-zero node to a fresh synthetic root
fn attach_synthetic_root(dag: &mut FlowGraph) -> NodeIndex {
    let rootless: Vec<NodeIndex> = dag
        .node_indices()
        .filter(|&idx| {
            dag.neighbors_directed(idx, Direction::Incoming)
                .next()
                .is_none()
        })
        .collect();
    let root = dag.add_node(Arc::new(NoopAction));
    for idx in rootless {
        dag.add_edge(root, idx, ());
    }
    root
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::action::FnAction;
    use serde_json::json;

    fn named(name: &str) -> Arc<dyn Action> {
        Arc::new(FnAction::new(name, |_| async move { Ok(json!(null)) }))
    }

    fn diamond() -> FlowGraph {
        let mut dag = FlowGraph::new();
        let a = dag.add_node(named("a"));
        let b = dag.add_node(named("b"));
        let c = dag.add_node(named("c"));
        let d = dag.add_node(named("d"));
        dag.add_edge(a, b, ());
        dag.add_edge(a, c, ());
        dag.add_edge(b, d, ());
        dag.add_edge(c, d, ());
        dag
    }

    #[test]
    fn test_batches_follow_generations() {
        let plan = FlowPlan::build(diamond()).unwrap();
        // synthetic root, a, {b, c}, d
        assert_eq!(plan.len(), 4);
        assert_eq!(plan.batches[0].len(), 1);
        assert_eq!(plan.batches[0][0].action.name(), "noop");
        assert_eq!(plan.batches[1].len(), 1);
        assert_eq!(plan.batches[2].len(), 2);
        assert_eq!(plan.batches[3].len(), 1);

        // every predecessor coordinate points at a strictly earlier batch
        for batch in &plan.batches {
            for descriptor in batch {
                for pred in &descriptor.predecessors {
                    assert!(pred.batch < descriptor.coord.batch);
                }
            }
        }
    }

    #[test]
    fn test_cycle_rejected_before_planning() {
        let mut dag = FlowGraph::new();
        let a = dag.add_node(named("a"));
        let b = dag.add_node(named("b"));
        dag.add_edge(a, b, ());
        dag.add_edge(b, a, ());
        let err = FlowPlan::build(dag).unwrap_err();
        assert!(matches!(err, FlowError::Construction { .. }));
    }

    #[test]
    fn test_single_node_yields_two_batches() {
        let mut dag = FlowGraph::new();
        dag.add_node(named("only"));
        let plan = FlowPlan::build(dag).unwrap();
        assert_eq!(plan.len(), 2);
        assert_eq!(plan.batches[1][0].action.name(), "only");
        assert_eq!(
            plan.batches[1][0].predecessors,
            vec![Coord { batch: 0, slot: 0 }]
        );
    }

    #[test]
    fn test_plan_debug_lists_batch_sizes() {
        let plan = FlowPlan::build(diamond()).unwrap();
        assert_eq!(format!("{plan:?}"), "FlowPlan { batches: [1, 1, 2, 1] }");
    }

    #[test]
    fn test_plan_is_deterministic() {
        let one = FlowPlan::build(diamond()).unwrap();
        let two = FlowPlan::build(diamond()).unwrap();
        assert_eq!(one.len(), two.len());
        for (a, b) in one.batches.iter().zip(&two.batches) {
            let names_a: Vec<&str> = a.iter().map(|d| d.action.name()).collect();
            let names_b: Vec<&str> = b.iter().map(|d| d.action.name()).collect();
            assert_eq!(names_a, names_b);
            for (da, db) in a.iter().zip(b) {
                assert_eq!(da.coord, db.coord);
                assert_eq!(da.predecessors, db.predecessors);
            }
        }
    }

    #[tokio::test]
    async fn test_unset_predecessor_reads_as_null() {
        let plan = FlowPlan::build(diamond()).unwrap();
        let last = plan.batches.last().unwrap()[0].clone();
        let results = plan.predecessor_results(&last).await;
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|v| v.is_null()));
    }
}
