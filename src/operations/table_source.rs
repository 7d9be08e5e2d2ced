use crate::core::{Arity, Column, Frame, Operation, Shape};
use crate::error::{ComputeError, OptionValidationError};
use crate::registry::{OperationMetadata, OperationMetadataFactoryWrapper, ParameterSchema};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct TableSourceOptions {
    columns: Vec<Column>,
    #[serde(default)]
    index: Vec<String>,
}

/// Pipeline input holding a literal table
#[derive(Debug, Clone, Default)]
pub struct TableSource {
    table: Option<Frame>,
}

impl TableSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(table: Frame) -> Self {
        Self { table: Some(table) }
    }
}

#[async_trait]
impl Operation for TableSource {
    fn kind(&self) -> &'static str {
        "table_source"
    }

    fn inputs(&self) -> Arity {
        Arity::exactly(0)
    }

    fn outputs(&self) -> Arity {
        Arity::at_least(0)
    }

    fn options(&self) -> Value {
        match &self.table {
            Some(table) => json!({ "columns": table.columns(), "index": table.index() }),
            None => Value::Null,
        }
    }

    fn set_options(&mut self, options: &Value) -> Result<(), OptionValidationError> {
        let opts: TableSourceOptions = super::parse_options(options)?;

        let mut errors = OptionValidationError::new();
        if opts.columns.is_empty() {
            errors.push("columns", "at least one column is required");
        }
        let table = match Frame::from_columns(opts.columns) {
            Ok(frame) => Some(frame.with_index(opts.index.clone())),
            Err(e) => {
                errors.push("columns", e.to_string());
                None
            }
        };
        if let Some(table) = &table {
            for level in &opts.index {
                if table.column(level).is_none() {
                    errors.push("index", format!("no column named '{}'", level));
                }
            }
        }
        errors.into_result()?;

        self.table = table;
        Ok(())
    }

    fn has_valid_options(&self) -> bool {
        self.table.is_some()
    }

    // The table does not depend on any input
    fn unset_options(&mut self) {}

    fn infer_output_shape(&self, _input_shapes: &[Option<Shape>]) -> Option<Shape> {
        self.table.as_ref().map(Frame::shape)
    }

    async fn compute(&self, _inputs: Vec<Arc<Frame>>) -> Result<Frame, ComputeError> {
        self.table
            .clone()
            .ok_or_else(|| ComputeError::failed("table source has no table"))
    }

    fn clone_box(&self) -> Box<dyn Operation> {
        Box::new(self.clone())
    }
}

fn metadata() -> OperationMetadata {
    OperationMetadata::new("table_source", "Table", "Sources", || Box::new(TableSource::new()))
        .add_parameter(ParameterSchema::new("columns", "columns", json!([])))
        .add_parameter(ParameterSchema::new("index", "string_list", json!([])))
}

inventory::submit! {
    OperationMetadataFactoryWrapper(metadata)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ColumnValues;

    #[test]
    fn test_set_options_builds_table() {
        let mut source = TableSource::new();
        assert!(!source.has_valid_options());

        source
            .set_options(&json!({
                "columns": [
                    {"name": "x", "type": "float", "values": [1.0, 2.0]},
                    {"name": "k", "type": "text", "values": ["a", "b"]}
                ],
                "index": ["k"]
            }))
            .unwrap();

        assert!(source.has_valid_options());
        let shape = source.infer_output_shape(&[]).unwrap();
        assert_eq!(shape.columns.len(), 2);
        assert_eq!(shape.index, vec!["k".to_string()]);
    }

    #[test]
    fn test_rejected_options_keep_previous_table() {
        let table = Frame::from_columns(vec![Column::new("x", ColumnValues::Int(vec![1]))]).unwrap();
        let mut source = TableSource::with_table(table.clone());

        let err = source
            .set_options(&json!({
                "columns": [
                    {"name": "x", "type": "int", "values": [1, 2]},
                    {"name": "y", "type": "int", "values": [1]}
                ]
            }))
            .unwrap_err();

        assert_eq!(err.fields[0].field, "columns");
        assert_eq!(source.table, Some(table));
    }

    #[tokio::test]
    async fn test_compute_emits_table() {
        let table = Frame::from_columns(vec![Column::new("x", ColumnValues::Int(vec![1, 2]))]).unwrap();
        let source = TableSource::with_table(table.clone());
        assert_eq!(source.compute(Vec::new()).await.unwrap(), table);
    }
}
