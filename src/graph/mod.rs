pub mod id;
pub mod node;

pub use id::{NodeId, NodeIdGenerator};
pub use node::{Node, NodeJob};

use crate::core::{Operation, Shape};
use crate::error::GraphError;
use log::{debug, warn};
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;

/// Why `add_connection` refused an edge
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Rejection {
    /// Source already feeds as many consumers as it allows
    SourceSaturated,
    /// Target already has as many producers as it allows
    TargetSaturated,
    /// Target needs a known input shape but source cannot infer one
    UnknownInputShape,
    DuplicateEdge,
    InvalidSlot(usize),
    SlotOccupied { slot: usize, producer: NodeId },
    Cycle,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::SourceSaturated => write!(f, "source has no free output"),
            Rejection::TargetSaturated => write!(f, "target has no free input"),
            Rejection::UnknownInputShape => write!(f, "target needs a known input shape"),
            Rejection::DuplicateEdge => write!(f, "edge already exists"),
            Rejection::InvalidSlot(slot) => write!(f, "slot {} out of range", slot),
            Rejection::SlotOccupied { slot, producer } => {
                write!(f, "slot {} already fed by {}", slot, producer)
            }
            Rejection::Cycle => write!(f, "edge would create a cycle"),
        }
    }
}

/// Directed acyclic graph of operations.
///
/// All structural changes go through the methods below, which keep each
/// node's producer/slot bookkeeping in step with the edge set and re-derive
/// downstream input shapes whenever an upstream shape changes.
pub struct Graph {
    nodes: BTreeMap<NodeId, Node>,
    successors: BTreeMap<NodeId, BTreeSet<NodeId>>,
    predecessors: BTreeMap<NodeId, BTreeSet<NodeId>>,
    ids: NodeIdGenerator,
}

impl Graph {
    pub fn new() -> Self {
        Self::with_id_generator(NodeIdGenerator::new())
    }

    pub fn with_id_generator(ids: NodeIdGenerator) -> Self {
        Self {
            nodes: BTreeMap::new(),
            successors: BTreeMap::new(),
            predecessors: BTreeMap::new(),
            ids,
        }
    }

    pub fn next_node_id(&mut self) -> NodeId {
        self.ids.next_id()
    }

    /// Wrap `operation` in a fresh node and add it
    pub fn insert(&mut self, operation: Box<dyn Operation>) -> NodeId {
        let id = self.next_node_id();
        self.add_node(Node::new(id, operation));
        id
    }

    /// Returns false if a node with the same id is already present
    pub fn add_node(&mut self, node: Node) -> bool {
        let id = node.id();
        if self.nodes.contains_key(&id) {
            return false;
        }
        self.ids.observe(id);
        self.successors.insert(id, BTreeSet::new());
        self.predecessors.insert(id, BTreeSet::new());
        self.nodes.insert(id, node);
        debug!("Added node {}", id);
        true
    }

    /// Disconnect every edge of `id`, then drop it. Returns false if absent.
    pub fn remove_node(&mut self, id: NodeId) -> bool {
        if !self.nodes.contains_key(&id) {
            return false;
        }

        for producer in self.predecessors(id).collect::<Vec<_>>() {
            if let Err(e) = self.remove_connection(producer, id) {
                warn!("Failed to disconnect {} -> {}: {}", producer, id, e);
            }
        }
        for consumer in self.successors(id).collect::<Vec<_>>() {
            if let Err(e) = self.remove_connection(id, consumer) {
                warn!("Failed to disconnect {} -> {}: {}", id, consumer, e);
            }
        }

        self.successors.remove(&id);
        self.predecessors.remove(&id);
        self.nodes.remove(&id);
        debug!("Removed node {}", id);
        true
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(&id)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.keys().copied()
    }

    pub fn successors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.successors.get(&id).into_iter().flatten().copied()
    }

    pub fn predecessors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.predecessors.get(&id).into_iter().flatten().copied()
    }

    pub fn in_degree(&self, id: NodeId) -> usize {
        self.predecessors.get(&id).map_or(0, BTreeSet::len)
    }

    pub fn out_degree(&self, id: NodeId) -> usize {
        self.successors.get(&id).map_or(0, BTreeSet::len)
    }

    pub fn has_edge(&self, source: NodeId, target: NodeId) -> bool {
        self.successors
            .get(&source)
            .map_or(false, |s| s.contains(&target))
    }

    pub fn edges(&self) -> Vec<(NodeId, NodeId)> {
        self.successors
            .iter()
            .flat_map(|(&from, tos)| tos.iter().map(move |&to| (from, to)))
            .collect()
    }

    /// Nodes with no producers that also accept running without inputs
    pub fn sources(&self) -> Vec<NodeId> {
        self.nodes
            .iter()
            .filter(|(&id, node)| self.in_degree(id) == 0 && node.operation().inputs().min == 0)
            .map(|(&id, _)| id)
            .collect()
    }

    /// Every node reachable from `id`, excluding `id` itself
    pub fn descendants(&self, id: NodeId) -> BTreeSet<NodeId> {
        let mut seen = BTreeSet::new();
        let mut queue: VecDeque<NodeId> = self.successors(id).collect();
        while let Some(next) = queue.pop_front() {
            if seen.insert(next) {
                queue.extend(self.successors(next));
            }
        }
        seen
    }

    /// Shape `id` currently emits, if inferable
    pub fn output_shape(&self, id: NodeId) -> Option<Shape> {
        self.nodes.get(&id).and_then(Node::output_shape)
    }

    /// Structural checks for a prospective edge, without mutating anything.
    ///
    /// `Ok(None)` means `add_connection` would accept the edge.
    pub fn check_connection(
        &self,
        source: NodeId,
        target: NodeId,
        slot: usize,
    ) -> Result<Option<Rejection>, GraphError> {
        if let Some(rejection) = self.precheck(source, target, slot)? {
            return Ok(Some(rejection));
        }
        if source == target || self.descendants(target).contains(&source) {
            return Ok(Some(Rejection::Cycle));
        }
        Ok(None)
    }

    fn precheck(
        &self,
        source: NodeId,
        target: NodeId,
        slot: usize,
    ) -> Result<Option<Rejection>, GraphError> {
        let src = self.nodes.get(&source).ok_or(GraphError::UnknownNode(source))?;
        let dst = self.nodes.get(&target).ok_or(GraphError::UnknownNode(target))?;

        if src.operation().outputs().is_saturated(self.out_degree(source)) {
            return Ok(Some(Rejection::SourceSaturated));
        }
        if dst.operation().inputs().is_saturated(self.in_degree(target)) {
            return Ok(Some(Rejection::TargetSaturated));
        }
        if !src.operation().output_shape_known() && dst.operation().needs_known_input_shape() {
            return Ok(Some(Rejection::UnknownInputShape));
        }
        if self.has_edge(source, target) {
            return Ok(Some(Rejection::DuplicateEdge));
        }
        match dst.check_slot(source, slot) {
            Ok(()) => Ok(None),
            Err(GraphError::InvalidSlot { slot, .. }) => Ok(Some(Rejection::InvalidSlot(slot))),
            Err(GraphError::SlotOccupied { slot, producer, .. }) => {
                Ok(Some(Rejection::SlotOccupied { slot, producer }))
            }
            Err(e) => Err(e),
        }
    }

    /// Connect `source`'s output to input `slot` of `target`.
    ///
    /// Returns `Ok(false)` and leaves the graph untouched if the edge is
    /// refused. On success the target learns the source's output shape and
    /// the change is cascaded downstream.
    pub fn add_connection(
        &mut self,
        source: NodeId,
        target: NodeId,
        slot: usize,
    ) -> Result<bool, GraphError> {
        if let Some(rejection) = self.precheck(source, target, slot)? {
            debug!("Rejected {} -> {}: {}", source, target, rejection);
            return Ok(false);
        }

        self.link(source, target);
        if self.has_cycle() {
            self.unlink(source, target);
            debug!("Rejected {} -> {}: {}", source, target, Rejection::Cycle);
            return Ok(false);
        }

        let shape = self.output_shape(source);
        let Some(node) = self.nodes.get_mut(&target) else {
            self.unlink(source, target);
            return Err(GraphError::UnknownNode(target));
        };
        if let Err(e) = node.bind_producer(source, slot) {
            self.unlink(source, target);
            return Err(e);
        }
        node.set_input_shape(shape, source)?;

        debug!("Connected {} -> {} (slot {})", source, target, slot);
        self.cascade(target);
        Ok(true)
    }

    /// Drop the edge and invalidate the target's options, which may have
    /// depended on the vanished input.
    pub fn remove_connection(&mut self, source: NodeId, target: NodeId) -> Result<(), GraphError> {
        if !self.has_edge(source, target) {
            return Err(GraphError::UnknownEdge(source, target));
        }
        self.unlink(source, target);

        let node = self.nodes.get_mut(&target).ok_or(GraphError::UnknownNode(target))?;
        node.clear_input_shape(source)?;
        node.unbind_producer(source)?;
        node.operation_mut().unset_options();

        debug!("Disconnected {} -> {}", source, target);
        self.cascade(target);
        Ok(())
    }

    /// Apply new options to a node and cascade the resulting shape change.
    /// Rejected options leave the node's previous options in place.
    pub fn update_node_options(&mut self, id: NodeId, options: &Value) -> Result<(), GraphError> {
        let node = self.nodes.get_mut(&id).ok_or(GraphError::UnknownNode(id))?;
        node.operation_mut().set_options(options)?;
        self.cascade(id);
        Ok(())
    }

    fn link(&mut self, source: NodeId, target: NodeId) {
        self.successors.entry(source).or_default().insert(target);
        self.predecessors.entry(target).or_default().insert(source);
    }

    fn unlink(&mut self, source: NodeId, target: NodeId) {
        if let Some(s) = self.successors.get_mut(&source) {
            s.remove(&target);
        }
        if let Some(p) = self.predecessors.get_mut(&target) {
            p.remove(&source);
        }
    }

    /// DFS over the whole edge set looking for a back edge
    fn has_cycle(&self) -> bool {
        fn visit(
            graph: &Graph,
            node: NodeId,
            done: &mut BTreeSet<NodeId>,
            on_path: &mut BTreeSet<NodeId>,
        ) -> bool {
            on_path.insert(node);
            for next in graph.successors(node) {
                if on_path.contains(&next) {
                    return true;
                }
                if !done.contains(&next) && visit(graph, next, done, on_path) {
                    return true;
                }
            }
            on_path.remove(&node);
            done.insert(node);
            false
        }

        let mut done = BTreeSet::new();
        let mut on_path = BTreeSet::new();
        self.nodes
            .keys()
            .any(|&id| !done.contains(&id) && visit(self, id, &mut done, &mut on_path))
    }

    /// Push `root`'s output shape to its consumers, and theirs, stopping at
    /// every consumer whose cached input shape is unchanged.
    ///
    /// Nodes are visited at most once, in topological order of the affected
    /// subgraph, so a node fed by two changed producers is settled before
    /// its own consumers are examined.
    fn cascade(&mut self, root: NodeId) {
        let mut changed = BTreeSet::from([root]);

        for parent in self.topological_from(root) {
            if !changed.contains(&parent) {
                continue;
            }
            let new_shape = self.output_shape(parent);

            for child_id in self.successors(parent).collect::<Vec<_>>() {
                let Some(child) = self.nodes.get_mut(&child_id) else {
                    continue;
                };
                if child.shape_from_producer(parent) == new_shape.as_ref() {
                    continue;
                }

                debug!("Shape from {} changed, invalidating {}", parent, child_id);
                child.operation_mut().unset_options();
                if let Err(e) = child.set_input_shape(new_shape.clone(), parent) {
                    warn!("Inconsistent slot map on {}: {}", child_id, e);
                }
                changed.insert(child_id);
            }
        }
    }

    /// Every node, each after all of its producers
    pub fn topological_order(&self) -> Vec<NodeId> {
        self.topological_within(self.nodes.keys().copied().collect())
    }

    /// `root` and its descendants, each after all of its in-set producers
    fn topological_from(&self, root: NodeId) -> Vec<NodeId> {
        let mut members = self.descendants(root);
        members.insert(root);
        self.topological_within(members)
    }

    fn topological_within(&self, members: BTreeSet<NodeId>) -> Vec<NodeId> {
        let mut remaining: BTreeMap<NodeId, usize> = members
            .iter()
            .map(|&id| {
                let deps = self.predecessors(id).filter(|p| members.contains(p)).count();
                (id, deps)
            })
            .collect();

        let mut order = Vec::with_capacity(members.len());
        let mut ready: VecDeque<NodeId> = remaining
            .iter()
            .filter(|(_, &deps)| deps == 0)
            .map(|(&id, _)| id)
            .collect();

        while let Some(id) = ready.pop_front() {
            order.push(id);
            for next in self.successors(id) {
                if let Some(deps) = remaining.get_mut(&next) {
                    *deps -= 1;
                    if *deps == 0 {
                        ready.push_back(next);
                    }
                }
            }
        }
        order
    }

    /// Serialisable copy of the structure and option state
    pub fn snapshot(&self) -> GraphSnapshot {
        GraphSnapshot {
            nodes: self
                .nodes
                .values()
                .map(|node| NodeSnapshot {
                    id: node.id(),
                    kind: node.operation().kind().to_string(),
                    options: node.operation().options(),
                    valid: node.has_valid_options(),
                    producer_slots: node.producer_slots().iter().map(|(&p, &s)| (p, s)).collect(),
                    input_shapes: node.input_shapes().to_vec(),
                })
                .collect(),
            edges: self.edges(),
        }
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Graph")
            .field("nodes", &self.nodes.values().collect::<Vec<_>>())
            .field("edges", &self.edges())
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeSnapshot {
    pub id: NodeId,
    pub kind: String,
    pub options: Value,
    pub valid: bool,
    pub producer_slots: Vec<(NodeId, usize)>,
    pub input_shapes: Vec<Option<Shape>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphSnapshot {
    pub nodes: Vec<NodeSnapshot>,
    pub edges: Vec<(NodeId, NodeId)>,
}
