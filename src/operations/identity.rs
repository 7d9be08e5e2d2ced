use crate::core::{Arity, Frame, Operation, Shape};
use crate::error::{ComputeError, OptionValidationError};
use crate::registry::{OperationMetadata, OperationMetadataFactoryWrapper};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

/// Forwards its single input unchanged
#[derive(Debug, Clone, Default)]
pub struct Identity;

impl Identity {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Operation for Identity {
    fn kind(&self) -> &'static str {
        "identity"
    }

    fn inputs(&self) -> Arity {
        Arity::exactly(1)
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
            _ => Err(OptionValidationError::single("options", "identity takes no options")),
        }
    }

    fn has_valid_options(&self) -> bool {
        true
    }

    fn unset_options(&mut self) {}

    fn infer_output_shape(&self, input_shapes: &[Option<Shape>]) -> Option<Shape> {
        super::first_shape(input_shapes).cloned()
    }

    async fn compute(&self, inputs: Vec<Arc<Frame>>) -> Result<Frame, ComputeError> {
        inputs
            .into_iter()
            .next()
            .map(Arc::unwrap_or_clone)
            .ok_or_else(|| ComputeError::failed("identity needs one input"))
    }

    fn clone_box(&self) -> Box<dyn Operation> {
        Box::new(self.clone())
    }
}

fn metadata() -> OperationMetadata {
    OperationMetadata::new("identity", "Identity", "Utility", || Box::new(Identity::new()))
}

inventory::submit! {
    OperationMetadataFactoryWrapper(metadata)
}
