use super::state::RunState;
use super::status::{NodeReport, NodeStatus, RunEvent};
use crate::core::Frame;
use crate::error::{ComputeError, ExecutionError, NodeError};
use crate::graph::{Graph, NodeId};
use crate::observability::{MetricsCollector, RunMonitor};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, mpsc, Semaphore};
use tokio::task::JoinSet;

/// Worker pool and notification settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Upper bound on nodes computing at the same time
    pub max_workers: usize,
    /// Buffered events per subscriber before slow subscribers lag
    pub event_capacity: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_workers: 4,
            event_capacity: 256,
        }
    }
}

#[derive(Debug, Clone)]
pub enum RunOutcome {
    Completed,
    Aborted { node: NodeId, error: NodeError },
}

/// Result of one `Scheduler::execute` call
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub outcome: RunOutcome,
    pub statuses: BTreeMap<NodeId, NodeStatus>,
    /// Results of reachable nodes with no consumers
    pub outputs: BTreeMap<NodeId, Arc<Frame>>,
    pub duration: Duration,
}

impl RunSummary {
    pub fn is_completed(&self) -> bool {
        matches!(self.outcome, RunOutcome::Completed)
    }
}

type TaskResult = (NodeId, Result<Frame, NodeError>, Duration);

/// Bookkeeping that lives for one run only
struct RunContext {
    pending: BTreeSet<NodeId>,
    tasks: JoinSet<TaskResult>,
    semaphore: Arc<Semaphore>,
    /// Workers announce a node here once they hold a permit
    started_tx: mpsc::UnboundedSender<NodeId>,
    started_rx: mpsc::UnboundedReceiver<NodeId>,
    /// Single input of each dispatched node, kept for its report
    dispatched: HashMap<NodeId, Option<Arc<Frame>>>,
    outputs: BTreeMap<NodeId, Arc<Frame>>,
}

/// Drives one graph run at a time: dispatches ready nodes to a bounded
/// worker pool and routes each result to the consumers' input slots.
///
/// All graph and run-state mutation happens on the task awaiting `execute`;
/// workers only ever see a detached `NodeJob`.
pub struct Scheduler {
    config: SchedulerConfig,
    state: RunState,
    statuses: BTreeMap<NodeId, NodeStatus>,
    events: broadcast::Sender<RunEvent>,
    metrics: MetricsCollector,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        Self {
            config,
            state: RunState::Idle,
            statuses: BTreeMap::new(),
            events,
            metrics: MetricsCollector::new(),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    pub fn status(&self, node: NodeId) -> Option<NodeStatus> {
        self.statuses.get(&node).copied()
    }

    pub fn statuses(&self) -> &BTreeMap<NodeId, NodeStatus> {
        &self.statuses
    }

    /// Status changes and run-level notifications from now on
    pub fn subscribe(&self) -> broadcast::Receiver<RunEvent> {
        self.events.subscribe()
    }

    pub fn get_monitor(&self) -> RunMonitor {
        RunMonitor::new(self.metrics.clone()).with_last_run(self.state.clone())
    }

    /// Forget all statuses and return to `Idle`, whatever the current state
    pub fn reset(&mut self) {
        self.statuses.clear();
        self.state = RunState::Idle;
    }

    fn transition_to(&mut self, new_state: RunState) {
        if !self.state.can_transition_to(&new_state) {
            warn!("Unexpected run state transition: {} -> {}", self.state.name(), new_state.name());
        }
        self.state = new_state;
    }

    fn emit(&self, event: RunEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn set_status(&mut self, node: NodeId, status: NodeStatus) {
        self.statuses.insert(node, status);
        self.emit(RunEvent::NodeStatus { node, status });
    }

    /// Validate the graph, then run every node reachable from the input nodes.
    ///
    /// Preflight problems are returned as `Err` before any node starts. A
    /// node failure aborts the whole run and is reported in the summary.
    pub async fn execute(&mut self, graph: &mut Graph) -> Result<RunSummary, ExecutionError> {
        match self.state {
            RunState::Running { .. } => return Err(ExecutionError::AlreadyRunning),
            RunState::Aborted { .. } => return Err(ExecutionError::ResetRequired),
            _ => {}
        }

        let reachable = Self::preflight(graph)?;
        let sources = graph.sources();

        // Leftovers from a run whose future was dropped
        for &id in &reachable {
            if let Some(node) = graph.node_mut(id) {
                node.clear_inputs();
            }
        }

        let start_time = Instant::now();
        self.statuses.clear();
        self.transition_to(RunState::Running {
            start_time: Some(start_time),
            reachable: reachable.len(),
        });
        info!("Run started: {} nodes from {} input nodes", reachable.len(), sources.len());
        self.emit(RunEvent::Started {
            reachable: reachable.iter().copied().collect(),
        });

        let (started_tx, started_rx) = mpsc::unbounded_channel();
        let mut run = RunContext {
            pending: reachable,
            tasks: JoinSet::new(),
            semaphore: Arc::new(Semaphore::new(self.config.max_workers.max(1))),
            started_tx,
            started_rx,
            dispatched: HashMap::new(),
            outputs: BTreeMap::new(),
        };

        for source in sources {
            if let Err(error) = self.start_node(graph, &mut run, source) {
                return Ok(self.abort(graph, run, source, error, start_time));
            }
        }

        loop {
            // A node's start notice is always queued before its result
            let joined = tokio::select! {
                biased;
                Some(id) = run.started_rx.recv() => {
                    self.set_status(id, NodeStatus::Progress);
                    continue;
                }
                joined = run.tasks.join_next() => joined,
            };
            let Some(joined) = joined else {
                break;
            };
            let (node, result, latency) = match joined {
                Ok(done) => done,
                Err(e) => {
                    // Task wrappers never panic; the pool was torn down
                    warn!("Worker task failed: {}", e);
                    continue;
                }
            };

            match result {
                Ok(frame) => {
                    if let Err((failed, error)) = self.on_success(graph, &mut run, node, frame, latency) {
                        return Ok(self.abort(graph, run, failed, error, start_time));
                    }
                    if run.pending.is_empty() {
                        return Ok(self.complete(run, start_time));
                    }
                }
                Err(error) => {
                    self.report_failure(graph, &mut run, node, &error, latency);
                    return Ok(self.abort(graph, run, node, error, start_time));
                }
            }
        }

        // Nothing left running but some nodes never became ready
        let stuck = run.pending.iter().next().copied().unwrap_or(NodeId(0));
        let error = NodeError::Compute(ComputeError::failed("node never received all of its inputs"));
        Ok(self.abort(graph, run, stuck, error, start_time))
    }

    /// Returns the reachable set, or the reason the run cannot start
    fn preflight(graph: &Graph) -> Result<BTreeSet<NodeId>, ExecutionError> {
        let sources = graph.sources();
        if sources.is_empty() {
            return Err(ExecutionError::NoInputNodes);
        }

        for &id in &sources {
            if !graph.node(id).map_or(false, |n| n.has_valid_options()) {
                return Err(ExecutionError::UnconfiguredNode(id));
            }
        }

        let mut reachable: BTreeSet<NodeId> = sources.iter().copied().collect();
        for &id in &sources {
            reachable.extend(graph.descendants(id));
        }

        for &id in &reachable {
            if !graph.node(id).map_or(false, |n| n.has_valid_options()) {
                return Err(ExecutionError::UnconfiguredNode(id));
            }
            if let Some(producer) = graph.predecessors(id).find(|p| !reachable.contains(p)) {
                return Err(ExecutionError::MissingInput { node: id, producer });
            }
        }

        Ok(reachable)
    }

    /// Detach the node's job and hand it to the pool
    fn start_node(&mut self, graph: &mut Graph, run: &mut RunContext, id: NodeId) -> Result<(), NodeError> {
        let node = graph
            .node_mut(id)
            .ok_or_else(|| ComputeError::failed(format!("node {} disappeared", id)))?;
        let job = node.take_job()?;

        let input = match job.inputs() {
            [only] => Some(only.clone()),
            _ => None,
        };
        run.dispatched.insert(id, input);

        debug!("Dispatching {} ({})", id, node.operation().kind());

        let semaphore = run.semaphore.clone();
        let started_tx = run.started_tx.clone();
        run.tasks.spawn(async move {
            let _permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    let error = NodeError::from(ComputeError::failed("worker pool closed"));
                    return (id, Err(error), Duration::ZERO);
                }
            };

            // The dispatcher outlives every worker of its run
            let _ = started_tx.send(id);
            let started = Instant::now();
            // Run on its own task so a panicking operation surfaces as an error
            let result = match tokio::spawn(job.run()).await {
                Ok(result) => result,
                Err(e) => Err(NodeError::from(ComputeError::Panicked(e.to_string()))),
            };
            (id, result, started.elapsed())
        });

        Ok(())
    }

    /// Record a result and start every consumer that now has all its inputs.
    /// A consumer that cannot start is returned as the run's failure.
    fn on_success(
        &mut self,
        graph: &mut Graph,
        run: &mut RunContext,
        id: NodeId,
        frame: Frame,
        latency: Duration,
    ) -> Result<(), (NodeId, NodeError)> {
        let frame = Arc::new(frame);
        let kind = graph
            .node(id)
            .map(|n| n.operation().kind())
            .unwrap_or_default();

        self.metrics.node(id, kind).record_success(latency);
        self.set_status(id, NodeStatus::Success);
        run.pending.remove(&id);

        let input = run.dispatched.remove(&id).flatten();
        let report = NodeReport::new(id, kind, input, latency).with_output(frame.clone());
        info!(
            "Node {} ({}) finished in {:?}: {} rows x {} columns",
            id,
            kind,
            latency,
            frame.num_rows(),
            frame.num_columns()
        );
        self.emit(RunEvent::NodeFinished(Arc::new(report)));

        if graph.out_degree(id) == 0 {
            run.outputs.insert(id, frame.clone());
        }
        if run.pending.is_empty() {
            return Ok(());
        }

        for child in graph.successors(id).collect::<Vec<_>>() {
            let expected = graph.in_degree(child);
            let Some(node) = graph.node_mut(child) else {
                continue;
            };
            if let Err(e) = node.supply_input(frame.clone(), id) {
                return Err((child, ComputeError::failed(e.to_string()).into()));
            }
            if node.pending_input_count() == expected {
                self.start_node(graph, run, child).map_err(|e| (child, e))?;
            }
        }

        Ok(())
    }

    fn report_failure(&mut self, graph: &Graph, run: &mut RunContext, id: NodeId, error: &NodeError, latency: Duration) {
        let kind = graph
            .node(id)
            .map(|n| n.operation().kind())
            .unwrap_or_default();
        self.metrics.node(id, kind).record_error(latency);

        let input = run.dispatched.remove(&id).flatten();
        let report = NodeReport::new(id, kind, input, latency).with_error(error);
        self.emit(RunEvent::NodeFinished(Arc::new(report)));
    }

    fn complete(&mut self, run: RunContext, start_time: Instant) -> RunSummary {
        let duration = start_time.elapsed();
        self.transition_to(RunState::Completed {
            duration: Some(duration),
            nodes_run: self.statuses.len(),
        });
        info!("Run completed in {:?}", duration);
        self.emit(RunEvent::Completed);

        RunSummary {
            outcome: RunOutcome::Completed,
            statuses: self.statuses.clone(),
            outputs: run.outputs,
            duration,
        }
    }

    /// Mark `failed` as errored, drop every pending input and stop the pool
    fn abort(
        &mut self,
        graph: &mut Graph,
        mut run: RunContext,
        failed: NodeId,
        error: NodeError,
        start_time: Instant,
    ) -> RunSummary {
        warn!("Node {} failed, aborting run: {}", failed, error);
        self.set_status(failed, NodeStatus::Error);
        run.pending.remove(&failed);

        if let Some(node) = graph.node_mut(failed) {
            node.clear_inputs();
        }
        for id in std::mem::take(&mut run.pending) {
            if let Some(node) = graph.node_mut(id) {
                node.clear_inputs();
            }
        }
        // Queued jobs never start; computations already running finish
        // detached and their results are dropped
        run.tasks.abort_all();

        self.transition_to(RunState::Aborted {
            node: failed,
            error_msg: error.to_string(),
        });
        self.emit(RunEvent::Aborted {
            node: failed,
            error: error.to_string(),
        });

        RunSummary {
            outcome: RunOutcome::Aborted { node: failed, error },
            statuses: self.statuses.clone(),
            outputs: BTreeMap::new(),
            duration: start_time.elapsed(),
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new(SchedulerConfig::default())
    }
}
