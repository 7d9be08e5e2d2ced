use crate::core::{Arity, Frame, Operation, Shape};
use crate::error::{ComputeError, OptionValidationError};
use crate::registry::{OperationMetadata, OperationMetadataFactoryWrapper};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

/// Stacks the rows of two or more inputs that share one shape
#[derive(Debug, Clone, Default)]
pub struct Concat;

impl Concat {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Operation for Concat {
    fn kind(&self) -> &'static str {
        "concat"
    }

    fn inputs(&self) -> Arity {
        Arity::at_least(2)
    }

    fn outputs(&self) -> Arity {
        Arity::at_least(0)
    }

    fn options(&self) -> Value {
        json!({})
    }

    fn set_options(&mut self, options: &Value) -> Result<(), OptionValidationError> {
        match options {
            Value::Null => Ok(()),
            Value::Object(map) if map.is_empty() => Ok(()),
            _ => Err(OptionValidationError::single("options", "concat takes no options")),
        }
    }

    fn has_valid_options(&self) -> bool {
        true
    }

    fn unset_options(&mut self) {}

    /// Known only when every bound input has the same known shape
    fn infer_output_shape(&self, input_shapes: &[Option<Shape>]) -> Option<Shape> {
        let mut shapes = input_shapes.iter();
        let first = shapes.next()?.as_ref()?;
        for shape in shapes {
            if shape.as_ref()? != first {
                return None;
            }
        }
        Some(first.clone())
    }

    async fn compute(&self, inputs: Vec<Arc<Frame>>) -> Result<Frame, ComputeError> {
        let frames: Vec<Frame> = inputs.into_iter().map(Arc::unwrap_or_clone).collect();
        Ok(Frame::concat(&frames)?)
    }

    fn clone_box(&self) -> Box<dyn Operation> {
        Box::new(self.clone())
    }
}

fn metadata() -> OperationMetadata {
    OperationMetadata::new("concat", "Concatenate", "Combine", || Box::new(Concat::new()))
}

inventory::submit! {
    OperationMetadataFactoryWrapper(metadata)
}
