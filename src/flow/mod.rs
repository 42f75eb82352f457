pub mod action;
pub mod executor;
pub mod plan;
pub mod registry;
pub mod trace;

pub use action::{Action, FnAction, NoopAction};
pub use executor::Flow;
pub use plan::{ActionDescriptor, Batch, Coord, DescriptorState, FlowGraph, FlowPlan};
pub use registry::ActionRegistry;
pub use trace::{ExecutionTrace, NodeTrace};
