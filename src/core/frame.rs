use super::shape::{ColumnSpec, ColumnType, Shape};
use crate::error::FrameError;
use serde::{Deserialize, Serialize};

/// Typed storage of one column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "values", rename_all = "lowercase")]
pub enum ColumnValues {
    Float(Vec<f64>),
    Int(Vec<i64>),
    Text(Vec<String>),
    Bool(Vec<bool>),
}

impl ColumnValues {
    pub fn dtype(&self) -> ColumnType {
        match self {
            ColumnValues::Float(_) => ColumnType::Float,
            ColumnValues::Int(_) => ColumnType::Int,
            ColumnValues::Text(_) => ColumnType::Text,
            ColumnValues::Bool(_) => ColumnType::Bool,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ColumnValues::Float(v) => v.len(),
            ColumnValues::Int(v) => v.len(),
            ColumnValues::Text(v) => v.len(),
            ColumnValues::Bool(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Numeric view of the column, `None` for text and bool columns
    pub fn as_f64(&self) -> Option<Vec<f64>> {
        match self {
            ColumnValues::Float(v) => Some(v.clone()),
            ColumnValues::Int(v) => Some(v.iter().map(|&x| x as f64).collect()),
            _ => None,
        }
    }

    fn empty_like(dtype: ColumnType) -> Self {
        match dtype {
            ColumnType::Float => ColumnValues::Float(Vec::new()),
            ColumnType::Int => ColumnValues::Int(Vec::new()),
            ColumnType::Text => ColumnValues::Text(Vec::new()),
            ColumnType::Bool => ColumnValues::Bool(Vec::new()),
        }
    }

    fn retain(&self, mask: &[bool]) -> Self {
        fn keep<T: Clone>(values: &[T], mask: &[bool]) -> Vec<T> {
            values
                .iter()
                .zip(mask)
                .filter(|(_, &m)| m)
                .map(|(v, _)| v.clone())
                .collect()
        }

        match self {
            ColumnValues::Float(v) => ColumnValues::Float(keep(v, mask)),
            ColumnValues::Int(v) => ColumnValues::Int(keep(v, mask)),
            ColumnValues::Text(v) => ColumnValues::Text(keep(v, mask)),
            ColumnValues::Bool(v) => ColumnValues::Bool(keep(v, mask)),
        }
    }

    fn extend(&mut self, other: &ColumnValues) -> bool {
        match (self, other) {
            (ColumnValues::Float(a), ColumnValues::Float(b)) => a.extend_from_slice(b),
            (ColumnValues::Int(a), ColumnValues::Int(b)) => a.extend_from_slice(b),
            (ColumnValues::Text(a), ColumnValues::Text(b)) => a.extend_from_slice(b),
            (ColumnValues::Bool(a), ColumnValues::Bool(b)) => a.extend_from_slice(b),
            _ => return false,
        }
        true
    }

    /// Convert to another element type
    pub fn cast(&self, to: ColumnType) -> Result<ColumnValues, FrameError> {
        let out = match (self, to) {
            (values, to) if values.dtype() == to => values.clone(),

            (ColumnValues::Int(v), ColumnType::Float) => {
                ColumnValues::Float(v.iter().map(|&x| x as f64).collect())
            }
            (ColumnValues::Bool(v), ColumnType::Float) => {
                ColumnValues::Float(v.iter().map(|&b| if b { 1.0 } else { 0.0 }).collect())
            }
            (ColumnValues::Float(v), ColumnType::Int) => {
                ColumnValues::Int(v.iter().map(|&x| x.trunc() as i64).collect())
            }
            (ColumnValues::Bool(v), ColumnType::Int) => {
                ColumnValues::Int(v.iter().map(|&b| b as i64).collect())
            }
            (ColumnValues::Float(v), ColumnType::Bool) => {
                ColumnValues::Bool(v.iter().map(|&x| x != 0.0).collect())
            }
            (ColumnValues::Int(v), ColumnType::Bool) => {
                ColumnValues::Bool(v.iter().map(|&x| x != 0).collect())
            }

            (ColumnValues::Float(v), ColumnType::Text) => {
                ColumnValues::Text(v.iter().map(|x| x.to_string()).collect())
            }
            (ColumnValues::Int(v), ColumnType::Text) => {
                ColumnValues::Text(v.iter().map(|x| x.to_string()).collect())
            }
            (ColumnValues::Bool(v), ColumnType::Text) => {
                ColumnValues::Text(v.iter().map(|x| x.to_string()).collect())
            }

            (ColumnValues::Text(v), ColumnType::Float) => ColumnValues::Float(
                v.iter()
                    .map(|s| s.trim().parse::<f64>().map_err(|_| FrameError::Unparsable(s.clone(), to)))
                    .collect::<Result<_, _>>()?,
            ),
            (ColumnValues::Text(v), ColumnType::Int) => ColumnValues::Int(
                v.iter()
                    .map(|s| s.trim().parse::<i64>().map_err(|_| FrameError::Unparsable(s.clone(), to)))
                    .collect::<Result<_, _>>()?,
            ),
            (ColumnValues::Text(v), ColumnType::Bool) => ColumnValues::Bool(
                v.iter()
                    .map(|s| s.trim().parse::<bool>().map_err(|_| FrameError::Unparsable(s.clone(), to)))
                    .collect::<Result<_, _>>()?,
            ),

            // Same-type pairs are caught by the guard above
            (values, _) => values.clone(),
        };
        Ok(out)
    }
}

/// A named column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    #[serde(flatten)]
    pub values: ColumnValues,
}

impl Column {
    pub fn new(name: impl Into<String>, values: ColumnValues) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }

    pub fn spec(&self) -> ColumnSpec {
        ColumnSpec::new(self.name.clone(), self.values.dtype())
    }
}

/// Tabular value flowing along graph edges
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    columns: Vec<Column>,
    /// Names of the index levels
    #[serde(default)]
    index: Vec<String>,
}

impl Frame {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a frame, checking that column names are unique and lengths agree
    pub fn from_columns(columns: Vec<Column>) -> Result<Self, FrameError> {
        let mut frame = Self::new();
        for column in columns {
            frame.push_column(column)?;
        }
        Ok(frame)
    }

    pub fn with_index(mut self, index: Vec<String>) -> Self {
        self.index = index;
        self
    }

    pub fn push_column(&mut self, column: Column) -> Result<(), FrameError> {
        if self.column(&column.name).is_some() {
            return Err(FrameError::DuplicateColumn(column.name));
        }
        if let Some(first) = self.columns.first() {
            if first.values.len() != column.values.len() {
                return Err(FrameError::LengthMismatch {
                    column: column.name,
                    expected: first.values.len(),
                    actual: column.values.len(),
                });
            }
        }
        self.columns.push(column);
        Ok(())
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn index(&self) -> &[String] {
        &self.index
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_mut(&mut self, name: &str) -> Option<&mut Column> {
        self.columns.iter_mut().find(|c| c.name == name)
    }

    pub fn num_rows(&self) -> usize {
        self.columns.first().map(|c| c.values.len()).unwrap_or(0)
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn shape(&self) -> Shape {
        Shape::new(self.columns.iter().map(Column::spec).collect()).with_index(self.index.clone())
    }

    /// Keep only the named columns, in the given order
    pub fn select(&self, names: &[String]) -> Result<Frame, FrameError> {
        let mut columns = Vec::with_capacity(names.len());
        for name in names {
            let column = self
                .column(name)
                .ok_or_else(|| FrameError::MissingColumn(name.clone()))?;
            columns.push(column.clone());
        }
        Ok(Frame {
            columns,
            index: self.index.clone(),
        })
    }

    /// Keep the rows whose mask entry is true
    pub fn retain_rows(&self, mask: &[bool]) -> Result<Frame, FrameError> {
        if mask.len() != self.num_rows() {
            return Err(FrameError::LengthMismatch {
                column: "<mask>".to_string(),
                expected: self.num_rows(),
                actual: mask.len(),
            });
        }
        Ok(Frame {
            columns: self
                .columns
                .iter()
                .map(|c| Column::new(c.name.clone(), c.values.retain(mask)))
                .collect(),
            index: self.index.clone(),
        })
    }

    /// Row-wise concatenation of frames sharing one shape
    pub fn concat(frames: &[Frame]) -> Result<Frame, FrameError> {
        let Some(first) = frames.first() else {
            return Ok(Frame::new());
        };
        let shape = first.shape();

        let mut out = Frame {
            columns: shape
                .columns
                .iter()
                .map(|spec| Column::new(spec.name.clone(), ColumnValues::empty_like(spec.dtype)))
                .collect(),
            index: shape.index.clone(),
        };

        for frame in frames {
            if frame.shape() != shape {
                return Err(FrameError::ShapeMismatch {
                    expected: shape.clone(),
                    actual: frame.shape(),
                });
            }
            for (dst, src) in out.columns.iter_mut().zip(&frame.columns) {
                dst.values.extend(&src.values);
            }
        }

        Ok(out)
    }

    /// Row/column statistics used by run reports
    pub fn summary(&self) -> FrameSummary {
        let columns = self
            .columns
            .iter()
            .map(|column| {
                let mut summary = ColumnSummary {
                    name: column.name.clone(),
                    dtype: column.values.dtype(),
                    count: column.values.len(),
                    min: None,
                    max: None,
                    mean: None,
                };
                if let Some(data) = column.values.as_f64() {
                    if !data.is_empty() {
                        let sum: f64 = data.iter().sum();
                        summary.mean = Some(sum / data.len() as f64);
                        summary.min = data.iter().copied().reduce(f64::min);
                        summary.max = data.iter().copied().reduce(f64::max);
                    }
                }
                summary
            })
            .collect();

        FrameSummary {
            rows: self.num_rows(),
            columns,
        }
    }
}

/// Statistics of one column; numeric fields stay `None` for non-numeric data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSummary {
    pub name: String,
    pub dtype: ColumnType,
    pub count: usize,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub mean: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameSummary {
    pub rows: usize,
    pub columns: Vec<ColumnSummary>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Frame {
        Frame::from_columns(vec![
            Column::new("x", ColumnValues::Float(vec![1.0, 2.0, 3.0])),
            Column::new("label", ColumnValues::Text(vec!["a".into(), "b".into(), "c".into()])),
        ])
        .unwrap()
    }

    #[test]
    fn test_from_columns_rejects_ragged_input() {
        let result = Frame::from_columns(vec![
            Column::new("x", ColumnValues::Float(vec![1.0, 2.0])),
            Column::new("y", ColumnValues::Int(vec![1])),
        ]);
        assert!(matches!(result, Err(FrameError::LengthMismatch { .. })));
    }

    #[test]
    fn test_shape_follows_columns() {
        let shape = sample().shape();
        assert_eq!(
            shape,
            Shape::new(vec![
                ColumnSpec::new("x", ColumnType::Float),
                ColumnSpec::new("label", ColumnType::Text),
            ])
        );
    }

    #[test]
    fn test_summary_stats() {
        let summary = sample().summary();
        assert_eq!(summary.rows, 3);
        assert_eq!(summary.columns[0].mean, Some(2.0));
        assert_eq!(summary.columns[0].min, Some(1.0));
        assert_eq!(summary.columns[0].max, Some(3.0));
        assert_eq!(summary.columns[1].mean, None);
    }

    #[test]
    fn test_retain_rows_and_concat() {
        let frame = sample();
        let kept = frame.retain_rows(&[true, false, true]).unwrap();
        assert_eq!(kept.num_rows(), 2);

        let joined = Frame::concat(&[frame.clone(), kept]).unwrap();
        assert_eq!(joined.num_rows(), 5);
        assert_eq!(joined.shape(), frame.shape());
    }

    #[test]
    fn test_cast_text_to_int() {
        let values = ColumnValues::Text(vec!["1".into(), " 2 ".into()]);
        assert_eq!(values.cast(ColumnType::Int).unwrap(), ColumnValues::Int(vec![1, 2]));

        let bad = ColumnValues::Text(vec!["one".into()]);
        assert!(bad.cast(ColumnType::Float).is_err());
    }

    #[test]
    fn test_column_json_layout() {
        let column: Column = serde_json::from_value(serde_json::json!({
            "name": "x", "type": "int", "values": [1, 2]
        }))
        .unwrap();
        assert_eq!(column.values, ColumnValues::Int(vec![1, 2]));
    }
}
