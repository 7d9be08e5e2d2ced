use super::{Frame, Shape};
use crate::error::{ComputeError, OptionValidationError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Inclusive bounds on the number of edges a node accepts on one side.
/// `max: None` means unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Arity {
    pub min: usize,
    pub max: Option<usize>,
}

impl Arity {
    pub const fn exactly(n: usize) -> Self {
        Self { min: n, max: Some(n) }
    }

    pub const fn at_least(min: usize) -> Self {
        Self { min, max: None }
    }

    pub const fn between(min: usize, max: usize) -> Self {
        Self { min, max: Some(max) }
    }

    pub fn contains(&self, count: usize) -> bool {
        count >= self.min && self.max.map_or(true, |max| count <= max)
    }

    /// True when one more edge would exceed the upper bound
    pub fn is_saturated(&self, count: usize) -> bool {
        self.max.map_or(false, |max| count >= max)
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.max {
            Some(max) if max == self.min => write!(f, "{}", max),
            Some(max) => write!(f, "{}..={}", self.min, max),
            None => write!(f, "{}..", self.min),
        }
    }
}

/// A transformation step placed on the graph.
///
/// Options are plain JSON so that graphs can be built from configuration
/// files. `set_options` must validate before touching any state: on error the
/// previous options stay in place.
#[async_trait]
pub trait Operation: Send + Sync {
    /// Registry id of the operation type, e.g. `"scale"`
    fn kind(&self) -> &'static str;

    fn inputs(&self) -> Arity;

    fn outputs(&self) -> Arity;

    /// Whether `infer_output_shape` can answer before the graph runs
    fn output_shape_known(&self) -> bool {
        true
    }

    /// Whether a producer must have a known output shape to feed this operation
    fn needs_known_input_shape(&self) -> bool {
        false
    }

    fn options(&self) -> Value;

    fn set_options(&mut self, options: &Value) -> Result<(), OptionValidationError>;

    fn has_valid_options(&self) -> bool;

    /// Clear every option that depends on an input shape. Idempotent.
    fn unset_options(&mut self);

    /// Called whenever the shape arriving at `slot` changes
    fn set_input_shape(&mut self, _slot: usize, _shape: Option<Shape>) {}

    /// Output shape for the given per-slot input shapes, `None` if unknown
    fn infer_output_shape(&self, input_shapes: &[Option<Shape>]) -> Option<Shape>;

    /// Inputs arrive ordered by slot. Frames are shared with sibling consumers.
    async fn compute(&self, inputs: Vec<Arc<Frame>>) -> Result<Frame, ComputeError>;

    fn clone_box(&self) -> Box<dyn Operation>;
}

impl Clone for Box<dyn Operation> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

impl fmt::Debug for dyn Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operation")
            .field("kind", &self.kind())
            .field("options", &self.options())
            .finish()
    }
}
