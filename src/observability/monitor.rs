use super::{MetricsCollector, MetricsSnapshot};
use crate::engine::RunState;
use std::fmt::Write;

/// Read-only view over the scheduler's metrics and the state its last run
/// ended in
pub struct RunMonitor {
    collector: MetricsCollector,
    last_run: RunState,
}

impl RunMonitor {
    pub fn new(collector: MetricsCollector) -> Self {
        Self {
            collector,
            last_run: RunState::Idle,
        }
    }

    pub fn with_last_run(mut self, state: RunState) -> Self {
        self.last_run = state;
        self
    }

    pub fn last_run(&self) -> &RunState {
        &self.last_run
    }

    pub fn collector(&self) -> &MetricsCollector {
        &self.collector
    }

    /// Text summary: how the last run ended, totals over every run so far,
    /// then one line per node
    pub fn generate_report(&self) -> String {
        let snapshot = self.collector.snapshot();
        if snapshot.is_empty() && self.last_run == RunState::Idle {
            return "No nodes executed".to_string();
        }

        let mut report = String::from("=== Run Report ===\n");
        let _ = writeln!(report, "Last run: {}", describe(&self.last_run));

        let runs: u64 = snapshot.values().map(|m| m.runs).sum();
        let errors: u64 = snapshot.values().map(|m| m.errors_count).sum();
        let _ = writeln!(
            report,
            "Totals: {} across {} node{}, {}",
            plural(runs, "run"),
            snapshot.len(),
            if snapshot.len() == 1 { "" } else { "s" },
            plural(errors, "error")
        );

        if let Some(slowest) = snapshot.values().max_by_key(|m| m.avg_latency_us) {
            let _ = writeln!(report, "Slowest: {} {} ({}μs avg)", slowest.node_id, slowest.kind, slowest.avg_latency_us);
        }

        for metrics in snapshot.values() {
            let _ = writeln!(report, "  {}", node_line(metrics));
        }
        report
    }
}

fn describe(state: &RunState) -> String {
    match state {
        RunState::Idle => "none".to_string(),
        RunState::Running { reachable, .. } => format!("still running, {} reachable", plural(*reachable as u64, "node")),
        RunState::Completed { duration, nodes_run } => {
            let nodes = plural(*nodes_run as u64, "node");
            match duration {
                Some(d) => format!("completed in {:?}, {}", d, nodes),
                None => format!("completed, {}", nodes),
            }
        }
        RunState::Aborted { node, error_msg } => format!("aborted at {}: {}", node, error_msg),
    }
}

fn node_line(metrics: &MetricsSnapshot) -> String {
    format!(
        "{} {}: {}, {}, avg {}μs",
        metrics.node_id,
        metrics.kind,
        plural(metrics.runs, "run"),
        plural(metrics.errors_count, "error"),
        metrics.avg_latency_us
    )
}

fn plural(count: u64, noun: &str) -> String {
    if count == 1 {
        format!("1 {}", noun)
    } else {
        format!("{} {}s", count, noun)
    }
}
