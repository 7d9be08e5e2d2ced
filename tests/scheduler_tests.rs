mod common;

use common::{float_shape, sample_frame, ConcurrencyTracker, TestOp};
use pipegraph::core::Arity;
use pipegraph::engine::{NodeStatus, RunEvent, RunOutcome, RunState, Scheduler, SchedulerConfig};
use pipegraph::error::{ComputeError, ExecutionError, NodeError};
use pipegraph::graph::{Graph, NodeId};
use std::collections::BTreeMap;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::sync::broadcast::Receiver;

fn drain(events: &mut Receiver<RunEvent>) -> Vec<RunEvent> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}

fn status_history(events: &[RunEvent]) -> BTreeMap<NodeId, Vec<NodeStatus>> {
    let mut history: BTreeMap<NodeId, Vec<NodeStatus>> = BTreeMap::new();
    for event in events {
        if let RunEvent::NodeStatus { node, status } = event {
            history.entry(*node).or_default().push(*status);
        }
    }
    history
}

fn with_workers(max_workers: usize) -> Scheduler {
    Scheduler::new(SchedulerConfig {
        max_workers,
        ..SchedulerConfig::default()
    })
}

/// A -> B -> C with the given middle node
fn chain_with(middle: TestOp) -> (Graph, NodeId, NodeId, NodeId) {
    let mut graph = Graph::new();
    let a = graph.insert(TestOp::source().boxed());
    let b = graph.insert(middle.boxed());
    let c = graph.insert(TestOp::unary().boxed());
    assert!(graph.add_connection(a, b, 0).unwrap());
    assert!(graph.add_connection(b, c, 0).unwrap());
    (graph, a, b, c)
}

#[tokio::test]
async fn test_chain_runs_to_completion() {
    let (mut graph, a, b, c) = chain_with(TestOp::unary());
    let mut scheduler = Scheduler::default();
    let mut events = scheduler.subscribe();

    let summary = scheduler.execute(&mut graph).await.unwrap();

    assert!(summary.is_completed());
    assert_eq!(scheduler.state().name(), "Completed");
    for id in [a, b, c] {
        assert_eq!(scheduler.status(id), Some(NodeStatus::Success));
    }

    let history = status_history(&drain(&mut events));
    for id in [a, b, c] {
        assert_eq!(history[&id], vec![NodeStatus::Progress, NodeStatus::Success]);
    }

    assert_eq!(summary.outputs.len(), 1);
    assert_eq!(summary.outputs[&c].as_ref(), &sample_frame());
}

#[tokio::test]
async fn test_run_event_order() {
    let (mut graph, a, b, c) = chain_with(TestOp::unary());
    let mut scheduler = Scheduler::default();
    let mut events = scheduler.subscribe();

    scheduler.execute(&mut graph).await.unwrap();
    let events = drain(&mut events);

    match events.first() {
        Some(RunEvent::Started { reachable }) => assert_eq!(reachable, &vec![a, b, c]),
        other => panic!("expected Started, got {:?}", other),
    }
    assert!(matches!(events.last(), Some(RunEvent::Completed)));

    let finished: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            RunEvent::NodeFinished(report) => Some(report.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(finished.iter().map(|r| r.node).collect::<Vec<_>>(), vec![a, b, c]);

    let report_b = &finished[1];
    assert!(report_b.succeeded());
    assert_eq!(report_b.kind, "test_op");
    assert_eq!(report_b.input_shape, Some(float_shape(&["x"])));
    assert_eq!(report_b.output_shape, Some(float_shape(&["x"])));
    assert!(report_b.shape_diff.as_ref().unwrap().is_empty());
    assert_eq!(report_b.output_summary.as_ref().unwrap().rows, 3);

    // Sources have no input to report
    assert!(finished[0].input.is_none());
}

#[tokio::test]
async fn test_failure_aborts_run() {
    let (mut graph, a, b, c) = chain_with(TestOp::unary().failing());
    let mut scheduler = Scheduler::default();
    let mut events = scheduler.subscribe();

    let summary = scheduler.execute(&mut graph).await.unwrap();

    match &summary.outcome {
        RunOutcome::Aborted { node, error } => {
            assert_eq!(*node, b);
            assert!(matches!(error, NodeError::Compute(ComputeError::Failed(_))));
        }
        RunOutcome::Completed => panic!("run should abort"),
    }
    assert!(summary.outputs.is_empty());
    assert_eq!(scheduler.status(a), Some(NodeStatus::Success));
    assert_eq!(scheduler.status(b), Some(NodeStatus::Error));
    assert_eq!(scheduler.status(c), None);
    assert!(matches!(scheduler.state(), RunState::Aborted { node, .. } if *node == b));

    let events = drain(&mut events);
    assert!(!status_history(&events).contains_key(&c));
    assert!(matches!(events.last(), Some(RunEvent::Aborted { node, .. }) if *node == b));
    assert!(events.iter().any(|e| matches!(e, RunEvent::NodeFinished(r) if r.node == b && !r.succeeded())));

    for id in [a, b, c] {
        assert_eq!(graph.node(id).unwrap().pending_input_count(), 0);
    }
}

#[tokio::test]
async fn test_abort_requires_reset() {
    let (mut graph, _, b, _) = chain_with(TestOp::unary().failing());
    let mut scheduler = Scheduler::default();

    scheduler.execute(&mut graph).await.unwrap();
    let result = scheduler.execute(&mut graph).await;
    assert!(matches!(result, Err(ExecutionError::ResetRequired)));
    assert_eq!(scheduler.status(b), Some(NodeStatus::Error));

    scheduler.reset();
    assert_eq!(scheduler.state(), &RunState::Idle);
    assert!(scheduler.statuses().is_empty());

    let summary = scheduler.execute(&mut graph).await.unwrap();
    assert!(!summary.is_completed());
}

#[tokio::test]
async fn test_panicking_operation_is_a_node_failure() {
    let (mut graph, _, b, _) = chain_with(TestOp::unary().panicking());
    let mut scheduler = Scheduler::default();

    let summary = scheduler.execute(&mut graph).await.unwrap();

    match summary.outcome {
        RunOutcome::Aborted { node, error } => {
            assert_eq!(node, b);
            assert!(matches!(error, NodeError::Compute(ComputeError::Panicked(_))));
        }
        RunOutcome::Completed => panic!("run should abort"),
    }
}

#[tokio::test]
async fn test_no_work_after_failure() {
    let mut graph = Graph::new();
    let a = graph.insert(TestOp::source().boxed());
    let bad = graph.insert(TestOp::unary().failing().boxed());
    let slow = graph.insert(TestOp::unary().slow(200).boxed());
    let after = TestOp::unary();
    let after_calls = after.calls();
    let tail = graph.insert(after.boxed());
    assert!(graph.add_connection(a, bad, 0).unwrap());
    assert!(graph.add_connection(a, slow, 0).unwrap());
    assert!(graph.add_connection(slow, tail, 0).unwrap());

    let mut scheduler = Scheduler::default();
    let summary = scheduler.execute(&mut graph).await.unwrap();
    assert!(matches!(summary.outcome, RunOutcome::Aborted { node, .. } if node == bad));

    // Give the detached slow computation time to finish
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(after_calls.load(Ordering::SeqCst), 0);
    assert_eq!(scheduler.status(tail), None);
    assert_ne!(scheduler.status(slow), Some(NodeStatus::Success));
    assert_eq!(graph.node(tail).unwrap().pending_input_count(), 0);
}

#[tokio::test]
async fn test_queued_node_is_not_in_progress() {
    let mut graph = Graph::new();
    let a = graph.insert(TestOp::source().boxed());
    let first = graph.insert(TestOp::unary().slow(300).boxed());
    let second = graph.insert(TestOp::unary().slow(300).boxed());
    assert!(graph.add_connection(a, first, 0).unwrap());
    assert!(graph.add_connection(a, second, 0).unwrap());

    let mut scheduler = with_workers(1);
    let abandoned = tokio::time::timeout(Duration::from_millis(100), scheduler.execute(&mut graph)).await;
    assert!(abandoned.is_err());

    assert_eq!(scheduler.status(a), Some(NodeStatus::Success));
    assert_eq!(scheduler.status(first), Some(NodeStatus::Progress));
    assert_eq!(scheduler.status(second), None);
}

#[tokio::test]
async fn test_no_input_nodes() {
    let mut scheduler = Scheduler::default();

    let mut empty = Graph::new();
    let result = scheduler.execute(&mut empty).await;
    assert!(matches!(result, Err(ExecutionError::NoInputNodes)));

    let mut graph = Graph::new();
    graph.insert(TestOp::unary().boxed());
    let result = scheduler.execute(&mut graph).await;
    assert!(matches!(result, Err(ExecutionError::NoInputNodes)));
    assert_eq!(scheduler.state(), &RunState::Idle);
}

#[tokio::test]
async fn test_unconfigured_source_fails_before_dispatch() {
    let mut graph = Graph::new();
    let source = TestOp::source().unconfigured();
    let calls = source.calls();
    let a = graph.insert(source.boxed());
    let b = graph.insert(TestOp::unary().boxed());
    assert!(graph.add_connection(a, b, 0).unwrap());

    let mut scheduler = Scheduler::default();
    let result = scheduler.execute(&mut graph).await;

    assert!(matches!(result, Err(ExecutionError::UnconfiguredNode(id)) if id == a));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(scheduler.statuses().is_empty());
}

#[tokio::test]
async fn test_unconfigured_descendant_fails_before_dispatch() {
    let mut graph = Graph::new();
    let source = TestOp::source();
    let calls = source.calls();
    let a = graph.insert(source.boxed());
    let b = graph.insert(TestOp::unary().unconfigured().boxed());
    // A second, fully configured branch does not run either
    let other = graph.insert(TestOp::source().boxed());
    assert!(graph.add_connection(a, b, 0).unwrap());

    let mut scheduler = Scheduler::default();
    let result = scheduler.execute(&mut graph).await;

    assert!(matches!(result, Err(ExecutionError::UnconfiguredNode(id)) if id == b));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(scheduler.status(other), None);
}

#[tokio::test]
async fn test_unreachable_producer_fails_before_dispatch() {
    let mut graph = Graph::new();
    let a = graph.insert(TestOp::source().boxed());
    let orphan = graph.insert(TestOp::unary().boxed());
    let join = graph.insert(TestOp::new(Arity::exactly(2), Arity::at_least(0)).boxed());
    assert!(graph.add_connection(a, join, 0).unwrap());
    assert!(graph.add_connection(orphan, join, 1).unwrap());

    let mut scheduler = Scheduler::default();
    let result = scheduler.execute(&mut graph).await;

    assert!(matches!(
        result,
        Err(ExecutionError::MissingInput { node, producer }) if node == join && producer == orphan
    ));
}

#[tokio::test]
async fn test_join_waits_for_all_producers() {
    let mut graph = Graph::new();
    let top = graph.insert(TestOp::source().boxed());
    let fast = graph.insert(TestOp::unary().boxed());
    let slow = graph.insert(TestOp::unary().slow(50).boxed());
    let join_op = TestOp::new(Arity::exactly(2), Arity::at_least(0));
    let join_calls = join_op.calls();
    let join = graph.insert(join_op.boxed());
    assert!(graph.add_connection(top, fast, 0).unwrap());
    assert!(graph.add_connection(top, slow, 0).unwrap());
    assert!(graph.add_connection(fast, join, 0).unwrap());
    assert!(graph.add_connection(slow, join, 1).unwrap());

    let mut scheduler = Scheduler::default();
    let summary = scheduler.execute(&mut graph).await.unwrap();

    assert!(summary.is_completed());
    assert_eq!(join_calls.load(Ordering::SeqCst), 1);
    assert_eq!(summary.outputs.keys().copied().collect::<Vec<_>>(), vec![join]);
    assert_eq!(summary.statuses.len(), 4);
}

#[tokio::test]
async fn test_worker_limit_bounds_concurrency() {
    let tracker = ConcurrencyTracker::new();
    let mut graph = Graph::new();
    for _ in 0..6 {
        graph.insert(TestOp::source().slow(30).tracked(tracker.clone()).boxed());
    }

    let mut scheduler = with_workers(2);
    let summary = scheduler.execute(&mut graph).await.unwrap();

    assert!(summary.is_completed());
    assert_eq!(summary.statuses.len(), 6);
    assert!(tracker.peak() <= 2, "peak concurrency was {}", tracker.peak());
}

#[tokio::test]
async fn test_independent_nodes_run_in_parallel() {
    let tracker = ConcurrencyTracker::new();
    let mut graph = Graph::new();
    for _ in 0..4 {
        graph.insert(TestOp::source().slow(100).tracked(tracker.clone()).boxed());
    }

    let mut scheduler = with_workers(4);
    scheduler.execute(&mut graph).await.unwrap();

    assert!(tracker.peak() >= 2, "peak concurrency was {}", tracker.peak());
}

#[tokio::test]
async fn test_zero_workers_still_runs() {
    let (mut graph, ..) = chain_with(TestOp::unary());
    let mut scheduler = with_workers(0);

    let summary = scheduler.execute(&mut graph).await.unwrap();
    assert!(summary.is_completed());
}

#[tokio::test]
async fn test_completed_run_can_repeat() {
    let middle = TestOp::unary();
    let calls = middle.calls();
    let (mut graph, ..) = chain_with(middle);
    let mut scheduler = Scheduler::default();

    assert!(scheduler.execute(&mut graph).await.unwrap().is_completed());
    assert!(scheduler.execute(&mut graph).await.unwrap().is_completed());
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_second_execute_while_running_is_rejected() {
    let mut graph = Graph::new();
    graph.insert(TestOp::source().slow(500).boxed());
    let mut scheduler = Scheduler::default();

    // Abandon a run midway; the scheduler still counts it as in flight
    let abandoned = tokio::time::timeout(Duration::from_millis(20), scheduler.execute(&mut graph)).await;
    assert!(abandoned.is_err());
    assert!(scheduler.state().is_running());

    let result = scheduler.execute(&mut graph).await;
    assert!(matches!(result, Err(ExecutionError::AlreadyRunning)));

    scheduler.reset();
    let summary = scheduler.execute(&mut graph).await.unwrap();
    assert!(summary.is_completed());
}

#[tokio::test]
async fn test_metrics_recorded_per_node() {
    let (mut graph, a, b, _) = chain_with(TestOp::unary().failing());
    let mut scheduler = Scheduler::default();
    scheduler.execute(&mut graph).await.unwrap();

    let monitor = scheduler.get_monitor();
    let snapshot = monitor.collector().snapshot();
    assert_eq!(snapshot[&a].runs, 1);
    assert_eq!(snapshot[&b].errors_count, 1);
    assert_eq!(snapshot.len(), 2);

    let report = monitor.generate_report();
    assert!(report.contains(&format!("Last run: aborted at {}: ", b)), "{}", report);
    assert!(report.contains("Totals: 1 run across 2 nodes, 1 error"), "{}", report);
}
