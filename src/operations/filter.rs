use crate::core::{Arity, Frame, Operation, Shape};
use crate::error::{ComputeError, FrameError, OptionValidationError};
use crate::registry::{OperationMetadata, OperationMetadataFactoryWrapper, ParameterSchema};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompareOp {
    Gt,
    Ge,
    Lt,
    Le,
    Eq,
    Ne,
}

impl CompareOp {
    pub fn test(&self, lhs: f64, rhs: f64) -> bool {
        match self {
            CompareOp::Gt => lhs > rhs,
            CompareOp::Ge => lhs >= rhs,
            CompareOp::Lt => lhs < rhs,
            CompareOp::Le => lhs <= rhs,
            CompareOp::Eq => lhs == rhs,
            CompareOp::Ne => lhs != rhs,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct FilterOptions {
    column: Option<String>,
    #[serde(default = "default_op")]
    op: CompareOp,
    #[serde(default)]
    value: f64,
}

fn default_op() -> CompareOp {
    CompareOp::Gt
}

impl Default for FilterOptions {
    fn default() -> Self {
        Self {
            column: None,
            op: default_op(),
            value: 0.0,
        }
    }
}

/// Keeps the rows where `column <op> value` holds
#[derive(Debug, Clone)]
pub struct Filter {
    column: Option<String>,
    op: CompareOp,
    value: f64,
    input: Option<Shape>,
}

impl Default for Filter {
    fn default() -> Self {
        Self::new()
    }
}

impl Filter {
    pub fn new() -> Self {
        Self {
            column: None,
            op: default_op(),
            value: 0.0,
            input: None,
        }
    }
}

#[async_trait]
impl Operation for Filter {
    fn kind(&self) -> &'static str {
        "filter"
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
        json!({ "column": self.column, "op": self.op, "value": self.value })
    }

    fn set_options(&mut self, options: &Value) -> Result<(), OptionValidationError> {
        let opts: FilterOptions = super::parse_options(options)?;

        let mut errors = OptionValidationError::new();
        if opts.value.is_nan() {
            errors.push("value", "must be a number");
        }
        if let Some(column) = &opts.column {
            super::check_column(&mut errors, "column", self.input.as_ref(), column, true);
        }
        errors.into_result()?;

        self.column = opts.column;
        self.op = opts.op;
        self.value = opts.value;
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
        super::first_shape(input_shapes).cloned()
    }

    async fn compute(&self, inputs: Vec<Arc<Frame>>) -> Result<Frame, ComputeError> {
        let column = self
            .column
            .as_deref()
            .ok_or_else(|| ComputeError::failed("filter has no column"))?;
        let input = inputs
            .first()
            .ok_or_else(|| ComputeError::failed("filter needs one input"))?;

        let data = input
            .column(column)
            .ok_or_else(|| FrameError::MissingColumn(column.to_string()))?
            .values
            .as_f64()
            .ok_or_else(|| ComputeError::failed(format!("column '{}' is not numeric", column)))?;

        let mask: Vec<bool> = data.iter().map(|&x| self.op.test(x, self.value)).collect();
        Ok(input.retain_rows(&mask)?)
    }

    fn clone_box(&self) -> Box<dyn Operation> {
        Box::new(self.clone())
    }
}

fn metadata() -> OperationMetadata {
    OperationMetadata::new("filter", "Filter Rows", "Transforms", || Box::new(Filter::new()))
        .add_parameter(ParameterSchema::new("column", "column", Value::Null).shape_dependent())
        .add_parameter(ParameterSchema::new("op", "compare_op", json!("gt")))
        .add_parameter(ParameterSchema::new("value", "number", json!(0.0)))
}

inventory::submit! {
    OperationMetadataFactoryWrapper(metadata)
}
