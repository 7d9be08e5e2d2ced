use super::NodeMetrics;
use crate::graph::NodeId;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub node_id: NodeId,
    pub kind: String,
    pub runs: u64,
    pub errors_count: u64,
    pub avg_latency_us: u64,
}

/// Per-node metrics; a clone shares the counters of nodes already registered
#[derive(Clone, Default)]
pub struct MetricsCollector {
    metrics: BTreeMap<NodeId, Arc<NodeMetrics>>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, metrics: Arc<NodeMetrics>) {
        self.metrics.insert(metrics.node_id(), metrics);
    }

    /// Metrics for `node_id`, created on first use
    pub fn node(&mut self, node_id: NodeId, kind: &str) -> Arc<NodeMetrics> {
        self.metrics
            .entry(node_id)
            .or_insert_with(|| Arc::new(NodeMetrics::new(node_id, kind)))
            .clone()
    }

    pub fn snapshot(&self) -> BTreeMap<NodeId, MetricsSnapshot> {
        self.metrics
            .iter()
            .map(|(&id, metrics)| {
                (
                    id,
                    MetricsSnapshot {
                        node_id: metrics.node_id(),
                        kind: metrics.kind().to_string(),
                        runs: metrics.runs(),
                        errors_count: metrics.errors_count(),
                        avg_latency_us: metrics.avg_latency_us(),
                    },
                )
            })
            .collect()
    }

    pub fn get_node_metrics(&self, node_id: NodeId) -> Option<Arc<NodeMetrics>> {
        self.metrics.get(&node_id).cloned()
    }
}
