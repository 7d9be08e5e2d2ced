use super::scheduler::{RunSummary, Scheduler, SchedulerConfig};
use crate::graph::{Graph, NodeId};
use crate::registry::OperationRegistry;
use anyhow::{anyhow, bail, Context, Result};
use log::info;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

/// A graph built from a JSON document, together with the scheduler that runs it
pub struct Pipeline {
    graph: Graph,
    scheduler: Scheduler,
    labels: BTreeMap<String, NodeId>,
}

impl Pipeline {
    pub fn from_json(config: Value) -> Result<Self> {
        Self::from_json_with_registry(config, &OperationRegistry::from_inventory())
    }

    pub fn from_json_with_registry(config: Value, registry: &OperationRegistry) -> Result<Self> {
        let scheduler_config: SchedulerConfig = match config.get("pipeline_config") {
            Some(cfg) => serde_json::from_value(cfg.clone()).context("Invalid pipeline_config")?,
            None => SchedulerConfig::default(),
        };

        let mut graph = Graph::new();
        let mut labels = BTreeMap::new();
        let mut options = BTreeMap::new();

        // Parse nodes
        if let Some(nodes_array) = config["nodes"].as_array() {
            for node_config in nodes_array {
                let label = node_config["id"]
                    .as_str()
                    .ok_or(anyhow!("Node missing id"))?
                    .to_string();
                let node_type = node_config["type"]
                    .as_str()
                    .ok_or_else(|| anyhow!("Node '{}' missing type", label))?;
                if labels.contains_key(&label) {
                    bail!("Duplicate node id '{}'", label);
                }

                let operation = registry
                    .create(node_type)
                    .with_context(|| format!("Failed to create node '{}'", label))?;
                let id = graph.insert(operation);
                if !node_config["options"].is_null() {
                    options.insert(id, (label.clone(), node_config["options"].clone()));
                }
                labels.insert(label, id);
            }
        }

        // Parse connections
        if let Some(conns_array) = config["connections"].as_array() {
            for conn in conns_array {
                let from = conn["from"].as_str().ok_or(anyhow!("Connection missing from"))?;
                let to = conn["to"].as_str().ok_or(anyhow!("Connection missing to"))?;
                let source = *labels
                    .get(from)
                    .ok_or_else(|| anyhow!("Connection references unknown node '{}'", from))?;
                let target = *labels
                    .get(to)
                    .ok_or_else(|| anyhow!("Connection references unknown node '{}'", to))?;

                let slot = match conn.get("slot").and_then(Value::as_u64) {
                    Some(slot) => usize::try_from(slot)
                        .map_err(|_| anyhow!("Slot {} of '{}' -> '{}' is out of range", slot, from, to))?,
                    None => graph
                        .node(target)
                        .and_then(|n| n.next_free_slot())
                        .ok_or_else(|| anyhow!("Node '{}' has no free input slot", to))?,
                };

                if let Some(rejection) = graph.check_connection(source, target, slot)? {
                    bail!("Cannot connect '{}' -> '{}': {}", from, to, rejection);
                }
                if !graph
                    .add_connection(source, target, slot)
                    .with_context(|| format!("Failed to connect '{}' -> '{}'", from, to))?
                {
                    bail!("Cannot connect '{}' -> '{}'", from, to);
                }
            }
        }

        // Options may depend on input shapes, so producers are configured first
        for id in graph.topological_order() {
            if let Some((label, node_options)) = options.remove(&id) {
                graph
                    .update_node_options(id, &node_options)
                    .with_context(|| format!("Invalid options for node '{}'", label))?;
            }
        }

        info!("Built pipeline with {} nodes", graph.len());
        Ok(Self {
            graph,
            scheduler: Scheduler::new(scheduler_config),
            labels,
        })
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read pipeline file {}", path.display()))?;
        let config: Value = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse pipeline file {}", path.display()))?;
        Self::from_json(config)
    }

    pub fn node_id(&self, label: &str) -> Option<NodeId> {
        self.labels.get(label).copied()
    }

    pub fn labels(&self) -> &BTreeMap<String, NodeId> {
        &self.labels
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut Graph {
        &mut self.graph
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut Scheduler {
        &mut self.scheduler
    }

    /// Clear the statuses of the last run so the pipeline can run again
    pub fn reset(&mut self) {
        self.scheduler.reset();
    }

    /// Run the graph once. After an aborted run this fails with
    /// `ExecutionError::ResetRequired` until `reset` is called.
    pub async fn execute(&mut self) -> Result<RunSummary> {
        let summary = self
            .scheduler
            .execute(&mut self.graph)
            .await
            .context("Pipeline could not start")?;
        Ok(summary)
    }
}
