pub mod cast;
pub mod concat;
pub mod filter;
pub mod identity;
pub mod scale;
pub mod select_columns;
pub mod table_source;

pub use cast::Cast;
pub use concat::Concat;
pub use filter::{CompareOp, Filter};
pub use identity::Identity;
pub use scale::Scale;
pub use select_columns::SelectColumns;
pub use table_source::TableSource;

use crate::core::{ColumnType, Shape};
use crate::error::OptionValidationError;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Decode an options document; `null` yields the defaults
pub(crate) fn parse_options<T: DeserializeOwned + Default>(options: &Value) -> Result<T, OptionValidationError> {
    if options.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(options.clone())
        .map_err(|e| OptionValidationError::single("options", e.to_string()))
}

/// Check that `column` exists in the known input shape, optionally numeric
pub(crate) fn check_column(
    errors: &mut OptionValidationError,
    field: &str,
    input: Option<&Shape>,
    column: &str,
    numeric: bool,
) {
    let Some(shape) = input else {
        errors.push(field, "input shape is not known yet");
        return;
    };
    match shape.column(column) {
        None => errors.push(field, format!("no column named '{}'", column)),
        Some(spec) if numeric && !spec.dtype.is_numeric() => {
            errors.push(field, format!("column '{}' is {}, expected a number", column, spec.dtype))
        }
        Some(_) => {}
    }
}

/// Input shape of a single-input operation
pub(crate) fn first_shape(input_shapes: &[Option<Shape>]) -> Option<&Shape> {
    input_shapes.first().and_then(Option::as_ref)
}

pub(crate) fn column_matches(input: Option<&Shape>, column: &str, dtype: impl Fn(ColumnType) -> bool) -> bool {
    input
        .and_then(|shape| shape.column(column))
        .map_or(false, |spec| dtype(spec.dtype))
}
