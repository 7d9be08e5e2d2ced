#![allow(dead_code)]

use async_trait::async_trait;
use pipegraph::core::{Arity, Column, ColumnSpec, ColumnType, ColumnValues, Frame, Operation, Shape};
use pipegraph::error::{ComputeError, OptionValidationError};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Counts how many test operations compute at the same time
#[derive(Debug, Default)]
pub struct ConcurrencyTracker {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl ConcurrencyTracker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn enter(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn leave(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

pub fn float_shape(names: &[&str]) -> Shape {
    Shape::new(names.iter().map(|n| ColumnSpec::new(*n, ColumnType::Float)).collect())
}

pub fn sample_frame() -> Frame {
    Frame::from_columns(vec![Column::new("x", ColumnValues::Float(vec![1.0, 2.0, 3.0]))]).unwrap()
}

/// Configurable operation for exercising the graph and the scheduler.
///
/// Options are `{"columns": [...]}`; when given, the operation declares a float
/// output shape with those columns, otherwise it passes its first input
/// shape through. Computing returns the first input, or `sample_frame()`
/// for sources.
#[derive(Debug, Clone)]
pub struct TestOp {
    inputs: Arity,
    outputs: Arity,
    shape_known: bool,
    needs_shape: bool,
    columns: Option<Vec<String>>,
    configured: bool,
    fail: bool,
    panic: bool,
    delay: Duration,
    tracker: Option<Arc<ConcurrencyTracker>>,
    calls: Arc<AtomicUsize>,
}

impl TestOp {
    pub fn new(inputs: Arity, outputs: Arity) -> Self {
        Self {
            inputs,
            outputs,
            shape_known: true,
            needs_shape: false,
            columns: None,
            configured: true,
            fail: false,
            panic: false,
            delay: Duration::ZERO,
            tracker: None,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn source() -> Self {
        Self::new(Arity::exactly(0), Arity::at_least(0)).with_columns(&["x"])
    }

    pub fn unary() -> Self {
        Self::new(Arity::exactly(1), Arity::at_least(0))
    }

    pub fn with_columns(mut self, names: &[&str]) -> Self {
        self.columns = Some(names.iter().map(|n| n.to_string()).collect());
        self
    }

    pub fn unknown_shape(mut self) -> Self {
        self.shape_known = false;
        self
    }

    pub fn needs_shape(mut self) -> Self {
        self.needs_shape = true;
        self
    }

    pub fn unconfigured(mut self) -> Self {
        self.configured = false;
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn panicking(mut self) -> Self {
        self.panic = true;
        self
    }

    pub fn slow(mut self, millis: u64) -> Self {
        self.delay = Duration::from_millis(millis);
        self
    }

    pub fn tracked(mut self, tracker: Arc<ConcurrencyTracker>) -> Self {
        self.tracker = Some(tracker);
        self
    }

    /// Shared with every clone, including scheduler snapshots
    pub fn calls(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }

    pub fn boxed(self) -> Box<dyn Operation> {
        Box::new(self)
    }
}

#[async_trait]
impl Operation for TestOp {
    fn kind(&self) -> &'static str {
        "test_op"
    }

    fn inputs(&self) -> Arity {
        self.inputs
    }

    fn outputs(&self) -> Arity {
        self.outputs
    }

    fn output_shape_known(&self) -> bool {
        self.shape_known
    }

    fn needs_known_input_shape(&self) -> bool {
        self.needs_shape
    }

    fn options(&self) -> Value {
        json!({ "columns": self.columns, "configured": self.configured })
    }

    fn set_options(&mut self, options: &Value) -> Result<(), OptionValidationError> {
        let columns = match options.get("columns") {
            None | Some(Value::Null) => None,
            Some(Value::Array(items)) => {
                let mut names = Vec::new();
                for item in items {
                    match item.as_str() {
                        Some(name) if !name.is_empty() => names.push(name.to_string()),
                        _ => return Err(OptionValidationError::single("columns", "expected column names")),
                    }
                }
                Some(names)
            }
            Some(_) => return Err(OptionValidationError::single("columns", "expected a list")),
        };
        self.columns = columns;
        self.configured = true;
        Ok(())
    }

    fn has_valid_options(&self) -> bool {
        self.configured
    }

    fn unset_options(&mut self) {
        self.configured = false;
    }

    fn infer_output_shape(&self, input_shapes: &[Option<Shape>]) -> Option<Shape> {
        if !self.shape_known {
            return None;
        }
        match &self.columns {
            Some(names) => {
                let names: Vec<&str> = names.iter().map(String::as_str).collect();
                Some(float_shape(&names))
            }
            None => input_shapes.iter().flatten().next().cloned(),
        }
    }

    async fn compute(&self, inputs: Vec<Arc<Frame>>) -> Result<Frame, ComputeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(tracker) = &self.tracker {
            tracker.enter();
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let Some(tracker) = &self.tracker {
            tracker.leave();
        }

        if self.panic {
            panic!("test op panicked");
        }
        if self.fail {
            return Err(ComputeError::failed("test op failed"));
        }
        Ok(match inputs.first() {
            Some(frame) => frame.as_ref().clone(),
            None => sample_frame(),
        })
    }

    fn clone_box(&self) -> Box<dyn Operation> {
        Box::new(self.clone())
    }
}
