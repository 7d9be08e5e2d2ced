use crate::core::{Arity, ColumnType, Frame, Operation, Shape};
use crate::error::{ComputeError, FrameError, OptionValidationError};
use crate::registry::{OperationMetadata, OperationMetadataFactoryWrapper, ParameterSchema};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct CastOptions {
    column: Option<String>,
    to: Option<ColumnType>,
}

/// Converts one column to another element type
#[derive(Debug, Clone, Default)]
pub struct Cast {
    column: Option<String>,
    to: Option<ColumnType>,
    input: Option<Shape>,
}

impl Cast {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Operation for Cast {
    fn kind(&self) -> &'static str {
        "cast"
    }

    fn inputs(&self) -> Arity {
        Arity::exactly(1)
    }

    fn outputs(&self) -> Arity {
        Arity::at_least(0)
    }

    fn needs_known_input_shape(&self) -> bool {
        true
    }

    fn options(&self) -> Value {
        json!({ "column": self.column, "to": self.to })
    }

    fn set_options(&mut self, options: &Value) -> Result<(), OptionValidationError> {
        let opts: CastOptions = super::parse_options(options)?;

        let mut errors = OptionValidationError::new();
        if let Some(column) = &opts.column {
            super::check_column(&mut errors, "column", self.input.as_ref(), column, false);
        }
        errors.into_result()?;

        self.column = opts.column;
        self.to = opts.to;
        Ok(())
    }

    fn has_valid_options(&self) -> bool {
        match (&self.column, self.to) {
            (Some(column), Some(_)) => super::column_matches(self.input.as_ref(), column, |_| true),
            _ => false,
        }
    }

    fn unset_options(&mut self) {
        self.column = None;
    }

    fn set_input_shape(&mut self, _slot: usize, shape: Option<Shape>) {
        self.input = shape;
    }

    fn infer_output_shape(&self, input_shapes: &[Option<Shape>]) -> Option<Shape> {
        let mut shape = super::first_shape(input_shapes)?.clone();
        if let (Some(column), Some(to)) = (&self.column, self.to) {
            if let Some(spec) = shape.columns.iter_mut().find(|c| &c.name == column) {
                spec.dtype = to;
            }
        }
        Some(shape)
    }

    async fn compute(&self, inputs: Vec<Arc<Frame>>) -> Result<Frame, ComputeError> {
        let (Some(column), Some(to)) = (self.column.as_deref(), self.to) else {
            return Err(ComputeError::failed("cast is not configured"));
        };
        let input = inputs
            .into_iter()
            .next()
            .ok_or_else(|| ComputeError::failed("cast needs one input"))?;

        let mut frame = Arc::unwrap_or_clone(input);
        let target = frame
            .column_mut(column)
            .ok_or_else(|| FrameError::MissingColumn(column.to_string()))?;
        target.values = target.values.cast(to)?;
        Ok(frame)
    }

    fn clone_box(&self) -> Box<dyn Operation> {
        Box::new(self.clone())
    }
}

fn metadata() -> OperationMetadata {
    OperationMetadata::new("cast", "Cast", "Transforms", || Box::new(Cast::new()))
        .add_parameter(ParameterSchema::new("column", "column", Value::Null).shape_dependent())
        .add_parameter(ParameterSchema::new("to", "column_type", Value::Null))
}

inventory::submit! {
    OperationMetadataFactoryWrapper(metadata)
}
