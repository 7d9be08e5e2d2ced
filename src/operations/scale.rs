use crate::core::{Arity, Column, ColumnType, ColumnValues, Frame, Operation, Shape};
use crate::error::{ComputeError, FrameError, OptionValidationError};
use crate::registry::{OperationMetadata, OperationMetadataFactoryWrapper, ParameterSchema};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct ScaleOptions {
    column: Option<String>,
    #[serde(default = "unit")]
    factor: f64,
}

fn unit() -> f64 {
    1.0
}

impl Default for ScaleOptions {
    fn default() -> Self {
        Self {
            column: None,
            factor: unit(),
        }
    }
}

/// Multiplies one numeric column by a constant. The column always comes out
/// as `float`.
#[derive(Debug, Clone, Default)]
pub struct Scale {
    column: Option<String>,
    factor: f64,
    input: Option<Shape>,
}

impl Scale {
    pub fn new() -> Self {
        Self {
            factor: unit(),
            ..Self::default()
        }
    }
}

#[async_trait]
impl Operation for Scale {
    fn kind(&self) -> &'static str {
        "scale"
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
        json!({ "column": self.column, "factor": self.factor })
    }

    fn set_options(&mut self, options: &Value) -> Result<(), OptionValidationError> {
        let opts: ScaleOptions = super::parse_options(options)?;

        let mut errors = OptionValidationError::new();
        if !opts.factor.is_finite() {
            errors.push("factor", "must be a finite number");
        }
        if let Some(column) = &opts.column {
            super::check_column(&mut errors, "column", self.input.as_ref(), column, true);
        }
        errors.into_result()?;

        self.column = opts.column;
        self.factor = opts.factor;
        Ok(())
    }

    fn has_valid_options(&self) -> bool {
        match &self.column {
            Some(column) => super::column_matches(self.input.as_ref(), column, |t| t.is_numeric()),
            None => false,
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
        if let Some(column) = &self.column {
            if let Some(spec) = shape.columns.iter_mut().find(|c| &c.name == column) {
                spec.dtype = ColumnType::Float;
            }
        }
        Some(shape)
    }

    async fn compute(&self, inputs: Vec<Arc<Frame>>) -> Result<Frame, ComputeError> {
        let column = self
            .column
            .as_deref()
            .ok_or_else(|| ComputeError::failed("scale has no column"))?;
        let input = inputs
            .into_iter()
            .next()
            .ok_or_else(|| ComputeError::failed("scale needs one input"))?;

        let mut frame = Arc::unwrap_or_clone(input);
        let target: &mut Column = frame
            .column_mut(column)
            .ok_or_else(|| FrameError::MissingColumn(column.to_string()))?;
        let data = target
            .values
            .as_f64()
            .ok_or_else(|| ComputeError::failed(format!("column '{}' is not numeric", column)))?;

        target.values = ColumnValues::Float(data.into_iter().map(|x| x * self.factor).collect());
        Ok(frame)
    }

    fn clone_box(&self) -> Box<dyn Operation> {
        Box::new(self.clone())
    }
}

fn metadata() -> OperationMetadata {
    OperationMetadata::new("scale", "Scale", "Transforms", || Box::new(Scale::new()))
        .add_parameter(ParameterSchema::new("column", "column", Value::Null).shape_dependent())
        .add_parameter(ParameterSchema::new("factor", "number", json!(1.0)))
}

inventory::submit! {
    OperationMetadataFactoryWrapper(metadata)
}
