pub mod core;
pub mod engine;
pub mod error;
pub mod graph;
pub mod observability;
pub mod operations;
pub mod registry;

pub use engine::{Pipeline, Scheduler};
pub use graph::{Graph, NodeId};
