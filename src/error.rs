use crate::core::{ColumnType, Shape};
use crate::graph::NodeId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Errors produced while building or transforming frames
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FrameError {
    #[error("duplicate column '{0}'")]
    DuplicateColumn(String),
    #[error("missing column '{0}'")]
    MissingColumn(String),
    #[error("column '{column}' has {actual} rows, expected {expected}")]
    LengthMismatch {
        column: String,
        expected: usize,
        actual: usize,
    },
    #[error("shape mismatch: expected {expected}, got {actual}")]
    ShapeMismatch { expected: Shape, actual: Shape },
    #[error("cannot parse '{0}' as {1}")]
    Unparsable(String, ColumnType),
}

/// Failure of an operation's compute step
#[derive(Debug, Clone, thiserror::Error)]
pub enum ComputeError {
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error("{0}")]
    Failed(String),
    #[error("operation panicked: {0}")]
    Panicked(String),
}

impl ComputeError {
    pub fn failed(message: impl Into<String>) -> Self {
        ComputeError::Failed(message.into())
    }
}

/// One rejected option field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

/// Rejected `set_options` call; lists every offending field
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionValidationError {
    pub fields: Vec<FieldError>,
}

impl OptionValidationError {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut err = Self::new();
        err.push(field, message);
        err
    }

    pub fn push(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.fields.push(FieldError {
            field: field.into(),
            message: message.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// `Err(self)` if any field was rejected
    pub fn into_result(self) -> Result<(), OptionValidationError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for OptionValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid options")?;
        for (i, e) in self.fields.iter().enumerate() {
            let sep = if i == 0 { ": " } else { "; " };
            write!(f, "{}{}: {}", sep, e.field, e.message)?;
        }
        Ok(())
    }
}

impl std::error::Error for OptionValidationError {}

/// Structural and configuration errors from graph mutation
#[derive(Debug, Clone, thiserror::Error)]
pub enum GraphError {
    #[error("unknown node {0}")]
    UnknownNode(NodeId),
    #[error("unknown edge {0} -> {1}")]
    UnknownEdge(NodeId, NodeId),
    #[error("slot {slot} is out of range for node {node}")]
    InvalidSlot { node: NodeId, slot: usize },
    #[error("slot {slot} of node {node} is already fed by {producer}")]
    SlotOccupied {
        node: NodeId,
        slot: usize,
        producer: NodeId,
    },
    #[error("node {node} has no input from {producer}")]
    UnknownProducer { node: NodeId, producer: NodeId },
    #[error(transparent)]
    Options(#[from] OptionValidationError),
}

/// Why a single node could not produce a result
#[derive(Debug, Clone, thiserror::Error)]
pub enum NodeError {
    #[error("node {node} has {filled} inputs, expects {expected}")]
    Arity {
        node: NodeId,
        filled: usize,
        expected: String,
    },
    #[error("options of node {0} are not set")]
    OptionsNotSet(NodeId),
    #[error(transparent)]
    Compute(#[from] ComputeError),
}

/// Errors raised by `Scheduler::execute` before any node is started
#[derive(Debug, Clone, thiserror::Error)]
pub enum ExecutionError {
    #[error("a run is already in progress")]
    AlreadyRunning,
    #[error("previous run was aborted; reset the scheduler first")]
    ResetRequired,
    #[error("graph has no input nodes")]
    NoInputNodes,
    #[error("node {0} is not configured")]
    UnconfiguredNode(NodeId),
    #[error("node {node} waits on {producer}, which no input node reaches")]
    MissingInput { node: NodeId, producer: NodeId },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_lists_fields() {
        let mut err = OptionValidationError::new();
        assert!(err.clone().into_result().is_ok());

        err.push("column", "not found");
        err.push("factor", "must be finite");
        assert_eq!(
            err.to_string(),
            "invalid options: column: not found; factor: must be finite"
        );
        assert!(err.into_result().is_err());
    }
}
