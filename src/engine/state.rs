use crate::graph::NodeId;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Scheduler run states
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunState {
    Idle,
    Running {
        #[serde(skip)]
        start_time: Option<Instant>,
        reachable: usize,
    },
    Completed {
        #[serde(skip)]
        duration: Option<Duration>,
        nodes_run: usize,
    },
    Aborted {
        node: NodeId,
        error_msg: String,
    },
}

impl RunState {
    /// Check if transition from current state to target state is valid
    pub fn can_transition_to(&self, target: &RunState) -> bool {
        use RunState::*;

        matches!(
            (self, target),
            (Idle, Running { .. }) |

            (Running { .. }, Completed { .. }) |
            (Running { .. }, Aborted { .. }) |

            // A finished run may be followed directly by the next one
            (Completed { .. }, Running { .. }) |
            (Completed { .. }, Idle) |

            // Aborted runs must be acknowledged with a reset
            (Aborted { .. }, Idle)
        )
    }

    /// Get human-readable state name
    pub fn name(&self) -> &str {
        match self {
            Self::Idle => "Idle",
            Self::Running { .. } => "Running",
            Self::Completed { .. } => "Completed",
            Self::Aborted { .. } => "Aborted",
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running { .. })
    }
}

impl Default for RunState {
    fn default() -> Self {
        Self::Idle
    }
}
