pub mod pipeline;
pub mod scheduler;
pub mod state;
pub mod status;

pub use pipeline::Pipeline;
pub use scheduler::{RunOutcome, RunSummary, Scheduler, SchedulerConfig};
pub use state::RunState;
pub use status::{NodeReport, NodeStatus, RunEvent};
