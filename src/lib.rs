//! dagaflow - DAG workflow execution with batched parallelism and
//! saga-style rollback.
//!
//! A workflow is a directed acyclic graph whose nodes are [`Action`]s and
//! whose edges mean "must complete before". [`Flow::new`] layers the graph
//! into parallel-safe batches; [`Flow::run`] executes the batches in order,
//! feeding every action the results of its predecessors, and on failure
//! drives the compensating actions before surfacing an aggregate error.
//!
//! ```ignore
//! let mut dag = FlowGraph::new();
//! let fetch = dag.add_node(Arc::new(FnAction::new("fetch", |prev| async move { .. })));
//! let store = dag.add_node(Arc::new(
//!     FnAction::new("store", |prev| async move { .. })
//!         .with_compensation(|prev| async move { .. }),
//! ));
//! dag.add_edge(fetch, store, ());
//!
//! let flow = Flow::new(dag)?;
//! let results = flow.run(json!({"user": "alice"})).await?;
//! ```

// Core infrastructure modules
pub mod core;

// The flow-execution engine
pub mod flow;

// Re-exports for convenience
pub use crate::core::errors::{ActionError, FlowError, Result};
pub use crate::flow::*;
