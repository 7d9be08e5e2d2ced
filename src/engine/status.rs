use crate::core::{Frame, FrameSummary, Shape, ShapeDiff};
use crate::graph::NodeId;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Per-node status within one run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeStatus {
    Progress,
    Success,
    Error,
}

/// What a finished node offers to logging consumers
#[derive(Debug, Clone)]
pub struct NodeReport {
    pub node: NodeId,
    pub kind: String,
    /// The node's input, when it has exactly one
    pub input: Option<Arc<Frame>>,
    pub input_summary: Option<FrameSummary>,
    pub input_shape: Option<Shape>,
    pub output: Option<Arc<Frame>>,
    pub output_summary: Option<FrameSummary>,
    pub output_shape: Option<Shape>,
    /// Going from input shape to output shape
    pub shape_diff: Option<ShapeDiff>,
    pub latency: Duration,
    pub error: Option<String>,
}

impl NodeReport {
    pub(crate) fn new(node: NodeId, kind: impl Into<String>, input: Option<Arc<Frame>>, latency: Duration) -> Self {
        Self {
            node,
            kind: kind.into(),
            input_summary: input.as_ref().map(|f| f.summary()),
            input_shape: input.as_ref().map(|f| f.shape()),
            input,
            output: None,
            output_summary: None,
            output_shape: None,
            shape_diff: None,
            latency,
            error: None,
        }
    }

    pub(crate) fn with_output(mut self, output: Arc<Frame>) -> Self {
        let shape = output.shape();
        self.shape_diff = self.input_shape.as_ref().map(|old| old.diff(&shape));
        self.output_summary = Some(output.summary());
        self.output_shape = Some(shape);
        self.output = Some(output);
        self
    }

    pub(crate) fn with_error(mut self, error: impl ToString) -> Self {
        self.error = Some(error.to_string());
        self
    }

    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Notifications broadcast by the scheduler
#[derive(Debug, Clone)]
pub enum RunEvent {
    Started { reachable: Vec<NodeId> },
    NodeStatus { node: NodeId, status: NodeStatus },
    NodeFinished(Arc<NodeReport>),
    Completed,
    Aborted { node: NodeId, error: String },
}
