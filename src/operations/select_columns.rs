use crate::core::{Arity, Frame, Operation, Shape};
use crate::error::{ComputeError, OptionValidationError};
use crate::registry::{OperationMetadata, OperationMetadataFactoryWrapper, ParameterSchema};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct SelectOptions {
    #[serde(default)]
    columns: Vec<String>,
}

/// Keeps a subset of the input columns, in the listed order
#[derive(Debug, Clone, Default)]
pub struct SelectColumns {
    columns: Vec<String>,
    input: Option<Shape>,
}

impl SelectColumns {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Operation for SelectColumns {
    fn kind(&self) -> &'static str {
        "select_columns"
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
        json!({ "columns": self.columns })
    }

    fn set_options(&mut self, options: &Value) -> Result<(), OptionValidationError> {
        let opts: SelectOptions = super::parse_options(options)?;

        let mut errors = OptionValidationError::new();
        for (i, column) in opts.columns.iter().enumerate() {
            if opts.columns[..i].contains(column) {
                errors.push("columns", format!("'{}' listed twice", column));
                continue;
            }
            super::check_column(&mut errors, "columns", self.input.as_ref(), column, false);
        }
        errors.into_result()?;

        self.columns = opts.columns;
        Ok(())
    }

    fn has_valid_options(&self) -> bool {
        !self.columns.is_empty()
            && self
                .columns
                .iter()
                .all(|c| super::column_matches(self.input.as_ref(), c, |_| true))
    }

    fn unset_options(&mut self) {
        self.columns.clear();
    }

    fn set_input_shape(&mut self, _slot: usize, shape: Option<Shape>) {
        self.input = shape;
    }

    fn infer_output_shape(&self, input_shapes: &[Option<Shape>]) -> Option<Shape> {
        let input = super::first_shape(input_shapes)?;
        let columns = self
            .columns
            .iter()
            .map(|name| input.column(name).cloned())
            .collect::<Option<Vec<_>>>()?;
        Some(Shape::new(columns).with_index(input.index.clone()))
    }

    async fn compute(&self, inputs: Vec<Arc<Frame>>) -> Result<Frame, ComputeError> {
        let input = inputs
            .first()
            .ok_or_else(|| ComputeError::failed("select_columns needs one input"))?;
        Ok(input.select(&self.columns)?)
    }

    fn clone_box(&self) -> Box<dyn Operation> {
        Box::new(self.clone())
    }
}

fn metadata() -> OperationMetadata {
    OperationMetadata::new("select_columns", "Select Columns", "Transforms", || {
        Box::new(SelectColumns::new())
    })
    .add_parameter(ParameterSchema::new("columns", "column_list", json!([])).shape_dependent())
}

inventory::submit! {
    OperationMetadataFactoryWrapper(metadata)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ColumnSpec, ColumnType};

    #[test]
    fn test_selection_changes_shape() {
        let shape = Shape::new(vec![
            ColumnSpec::new("a", ColumnType::Int),
            ColumnSpec::new("b", ColumnType::Float),
        ]);
        let mut select = SelectColumns::new();
        select.set_input_shape(0, Some(shape.clone()));
        select.set_options(&json!({"columns": ["b"]})).unwrap();

        let out = select.infer_output_shape(&[Some(shape)]).unwrap();
        assert_eq!(out, Shape::new(vec![ColumnSpec::new("b", ColumnType::Float)]));
    }

    #[test]
    fn test_duplicate_and_missing_columns_rejected() {
        let shape = Shape::new(vec![ColumnSpec::new("a", ColumnType::Int)]);
        let mut select = SelectColumns::new();
        select.set_input_shape(0, Some(shape));

        let err = select.set_options(&json!({"columns": ["a", "a", "zz"]})).unwrap_err();
        assert_eq!(err.fields.len(), 2);
        assert!(select.columns.is_empty());
    }
}
