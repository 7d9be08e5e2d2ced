pub mod frame;
pub mod operation;
pub mod shape;

pub use frame::{Column, ColumnSummary, ColumnValues, Frame, FrameSummary};
pub use operation::{Arity, Operation};
pub use shape::{ColumnSpec, ColumnType, Shape, ShapeDiff};
