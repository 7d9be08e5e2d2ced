use serde::{Deserialize, Serialize};
use std::fmt;

/// Element type of a frame column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Float,
    Int,
    Text,
    Bool,
}

impl ColumnType {
    pub fn is_numeric(&self) -> bool {
        matches!(self, ColumnType::Float | ColumnType::Int)
    }

    pub fn name(&self) -> &'static str {
        match self {
            ColumnType::Float => "float",
            ColumnType::Int => "int",
            ColumnType::Text => "text",
            ColumnType::Bool => "bool",
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Name and type of a single column
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    pub dtype: ColumnType,
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>, dtype: ColumnType) -> Self {
        Self {
            name: name.into(),
            dtype,
        }
    }
}

/// Structural description of a frame: ordered columns plus index levels.
///
/// Graph code only compares shapes for equality and hands them to
/// `Operation::infer_output_shape`; operations are free to inspect them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Shape {
    pub columns: Vec<ColumnSpec>,
    #[serde(default)]
    pub index: Vec<String>,
}

impl Shape {
    pub fn new(columns: Vec<ColumnSpec>) -> Self {
        Self {
            columns,
            index: Vec::new(),
        }
    }

    pub fn with_index(mut self, index: Vec<String>) -> Self {
        self.index = index;
        self
    }

    pub fn column(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    /// Column-level difference going from `self` to `other`
    pub fn diff(&self, other: &Shape) -> ShapeDiff {
        let mut diff = ShapeDiff::default();

        for col in &other.columns {
            match self.column(&col.name) {
                None => diff.added.push(col.clone()),
                Some(old) if old.dtype != col.dtype => {
                    diff.retyped.push((col.name.clone(), old.dtype, col.dtype))
                }
                Some(_) => {}
            }
        }
        for col in &self.columns {
            if !other.has_column(&col.name) {
                diff.removed.push(col.clone());
            }
        }
        diff.index_changed = self.index != other.index;

        diff
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, col) in self.columns.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", col.name, col.dtype)?;
        }
        write!(f, "]")?;
        if !self.index.is_empty() {
            write!(f, " index({})", self.index.join(", "))?;
        }
        Ok(())
    }
}

/// Result of `Shape::diff`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShapeDiff {
    pub added: Vec<ColumnSpec>,
    pub removed: Vec<ColumnSpec>,
    /// (column, old type, new type)
    pub retyped: Vec<(String, ColumnType, ColumnType)>,
    pub index_changed: bool,
}

impl ShapeDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.retyped.is_empty() && !self.index_changed
    }
}
