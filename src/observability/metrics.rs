use crate::graph::NodeId;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Execution counters of one node across runs
pub struct NodeMetrics {
    node_id: NodeId,
    kind: String,
    runs: AtomicU64,
    errors_count: AtomicU64,
    total_latency_us: AtomicU64,
    latency_samples: AtomicU64,
}

impl NodeMetrics {
    pub fn new(node_id: NodeId, kind: impl Into<String>) -> Self {
        Self {
            node_id,
            kind: kind.into(),
            runs: AtomicU64::new(0),
            errors_count: AtomicU64::new(0),
            total_latency_us: AtomicU64::new(0),
            latency_samples: AtomicU64::new(0),
        }
    }

    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn runs(&self) -> u64 {
        self.runs.load(Ordering::Relaxed)
    }

    pub fn errors_count(&self) -> u64 {
        self.errors_count.load(Ordering::Relaxed)
    }

    pub fn record_success(&self, latency: Duration) {
        self.runs.fetch_add(1, Ordering::Relaxed);
        self.record_latency(latency);
    }

    pub fn record_error(&self, latency: Duration) {
        self.errors_count.fetch_add(1, Ordering::Relaxed);
        self.record_latency(latency);
    }

    fn record_latency(&self, latency: Duration) {
        self.total_latency_us
            .fetch_add(latency.as_micros() as u64, Ordering::Relaxed);
        self.latency_samples.fetch_add(1, Ordering::Relaxed);
    }

    pub fn avg_latency_us(&self) -> u64 {
        let samples = self.latency_samples.load(Ordering::Relaxed);
        if samples == 0 {
            return 0;
        }
        self.total_latency_us.load(Ordering::Relaxed) / samples
    }
}
