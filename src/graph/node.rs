use super::NodeId;
use crate::core::{Frame, Operation, Shape};
use crate::error::{GraphError, NodeError};
use std::collections::BTreeMap;
use std::sync::Arc;

/// A graph vertex: one operation plus the bookkeeping that maps producers
/// onto input slots.
pub struct Node {
    id: NodeId,
    operation: Box<dyn Operation>,
    /// Frames delivered for the current run, one per slot
    input_slots: Vec<Option<Arc<Frame>>>,
    /// Last known shape arriving at each slot
    input_shapes: Vec<Option<Shape>>,
    producer_slots: BTreeMap<NodeId, usize>,
}

impl Node {
    pub fn new(id: NodeId, operation: Box<dyn Operation>) -> Self {
        // Bounded operations get a fixed slot array, unbounded ones grow on bind
        let slots = operation.inputs().max.unwrap_or(0);
        Self {
            id,
            operation,
            input_slots: vec![None; slots],
            input_shapes: vec![None; slots],
            producer_slots: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn operation(&self) -> &dyn Operation {
        self.operation.as_ref()
    }

    pub(crate) fn operation_mut(&mut self) -> &mut dyn Operation {
        self.operation.as_mut()
    }

    pub fn has_valid_options(&self) -> bool {
        self.operation.has_valid_options()
    }

    /// Producer id -> slot index
    pub fn producer_slots(&self) -> &BTreeMap<NodeId, usize> {
        &self.producer_slots
    }

    pub fn slot_of(&self, producer: NodeId) -> Option<usize> {
        self.producer_slots.get(&producer).copied()
    }

    fn producer_at(&self, slot: usize) -> Option<NodeId> {
        self.producer_slots
            .iter()
            .find(|(_, &s)| s == slot)
            .map(|(&producer, _)| producer)
    }

    /// Check that `producer` could be bound at `slot` without touching state
    ///
    /// Unbounded operations keep their slots dense, so the only new slot they
    /// accept is the one right after the last bound producer.
    pub fn check_slot(&self, producer: NodeId, slot: usize) -> Result<(), GraphError> {
        let limit = match self.operation.inputs().max {
            Some(max) => max,
            None => self.producer_slots.len().saturating_add(1),
        };
        if slot >= limit {
            return Err(GraphError::InvalidSlot { node: self.id, slot });
        }
        match self.producer_at(slot) {
            Some(other) if other != producer => Err(GraphError::SlotOccupied {
                node: self.id,
                slot,
                producer: other,
            }),
            _ => Ok(()),
        }
    }

    /// Lowest slot no producer is bound to
    pub fn next_free_slot(&self) -> Option<usize> {
        match self.operation.inputs().max {
            Some(max) => (0..max).find(|&slot| self.producer_at(slot).is_none()),
            None => Some(self.producer_slots.len()),
        }
    }

    pub fn bind_producer(&mut self, producer: NodeId, slot: usize) -> Result<(), GraphError> {
        self.check_slot(producer, slot)?;
        if self.input_slots.len() <= slot {
            self.input_slots.resize(slot + 1, None);
            self.input_shapes.resize(slot + 1, None);
        }
        self.producer_slots.insert(producer, slot);
        Ok(())
    }

    /// Returns the slot `producer` was bound to. On unbounded operations the
    /// producers above it move down one slot.
    pub fn unbind_producer(&mut self, producer: NodeId) -> Result<usize, GraphError> {
        let slot = self.producer_slots.remove(&producer).ok_or(GraphError::UnknownProducer {
            node: self.id,
            producer,
        })?;

        if self.operation.inputs().max.is_some() {
            if let Some(frame) = self.input_slots.get_mut(slot) {
                *frame = None;
            }
            return Ok(slot);
        }

        if slot < self.input_slots.len() {
            self.input_slots.remove(slot);
            self.input_shapes.remove(slot);
        }
        for bound in self.producer_slots.values_mut() {
            if *bound > slot {
                *bound -= 1;
            }
        }
        for (index, shape) in self.input_shapes.iter().enumerate().skip(slot) {
            self.operation.set_input_shape(index, shape.clone());
        }
        self.operation.set_input_shape(self.input_shapes.len(), None);
        Ok(slot)
    }

    fn resolve(&self, producer: NodeId) -> Result<usize, GraphError> {
        self.slot_of(producer).ok_or(GraphError::UnknownProducer {
            node: self.id,
            producer,
        })
    }

    pub fn set_input_shape(&mut self, shape: Option<Shape>, producer: NodeId) -> Result<(), GraphError> {
        let slot = self.resolve(producer)?;
        self.input_shapes[slot] = shape.clone();
        self.operation.set_input_shape(slot, shape);
        Ok(())
    }

    pub fn clear_input_shape(&mut self, producer: NodeId) -> Result<(), GraphError> {
        self.set_input_shape(None, producer)
    }

    pub fn shape_from_producer(&self, producer: NodeId) -> Option<&Shape> {
        let slot = self.slot_of(producer)?;
        self.input_shapes[slot].as_ref()
    }

    pub fn input_shapes(&self) -> &[Option<Shape>] {
        &self.input_shapes
    }

    /// What this node will emit given its current input shapes
    pub fn output_shape(&self) -> Option<Shape> {
        self.operation.infer_output_shape(&self.input_shapes)
    }

    /// Store a producer's result. A second delivery before the node runs
    /// overwrites the first.
    pub fn supply_input(&mut self, frame: Arc<Frame>, producer: NodeId) -> Result<(), GraphError> {
        let slot = self.resolve(producer)?;
        self.input_slots[slot] = Some(frame);
        Ok(())
    }

    pub fn pending_input_count(&self) -> usize {
        self.input_slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn clear_inputs(&mut self) {
        self.input_slots.iter_mut().for_each(|slot| *slot = None);
    }

    /// Check run preconditions and detach everything needed to compute.
    ///
    /// On success the input slots are drained; on failure they are left as is.
    pub fn take_job(&mut self) -> Result<NodeJob, NodeError> {
        let filled = self.pending_input_count();
        let arity = self.operation.inputs();
        if !arity.contains(filled) {
            return Err(NodeError::Arity {
                node: self.id,
                filled,
                expected: arity.to_string(),
            });
        }
        if !self.operation.has_valid_options() {
            return Err(NodeError::OptionsNotSet(self.id));
        }

        let inputs = self.input_slots.iter_mut().filter_map(Option::take).collect();
        Ok(NodeJob {
            node: self.id,
            operation: self.operation.clone_box(),
            inputs,
        })
    }

    /// Compute in place; used outside the scheduler
    pub async fn run(&mut self) -> Result<Frame, NodeError> {
        self.take_job()?.run().await
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("operation", &self.operation)
            .field("producer_slots", &self.producer_slots)
            .field("filled", &self.pending_input_count())
            .finish()
    }
}

/// A detached unit of work: an options snapshot of the operation plus its inputs
pub struct NodeJob {
    node: NodeId,
    operation: Box<dyn Operation>,
    inputs: Vec<Arc<Frame>>,
}

impl NodeJob {
    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn inputs(&self) -> &[Arc<Frame>] {
        &self.inputs
    }

    pub async fn run(self) -> Result<Frame, NodeError> {
        Ok(self.operation.compute(self.inputs).await?)
    }
}
