use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use sleuth_agent::{CapabilityRegistry, CollectorKind, Scheduler, Synthesizer, TaskGraph};
use sleuth_core::event::EventBus;
use sleuth_core::types::{EngineEvent, RunOutcome, SummaryPayload, Task, TaskId};
use sleuth_test_utils::{collector_task, ids, synthesis_task, MockCapability};

struct Harness {
    competitor: Arc<MockCapability>,
    trend: Arc<MockCapability>,
    paper: Arc<MockCapability>,
    synth: Arc<MockCapability>,
}

impl Harness {
    fn new() -> Self {
        Self {
            competitor: Arc::new(MockCapability::succeeding("CompetitorScout")),
            trend: Arc::new(MockCapability::succeeding("TrendScraper").with_evidence(2)),
            paper: Arc::new(MockCapability::succeeding("TechPaperMiner")),
            synth: Arc::new(MockCapability::succeeding("Synthesizer").with_evidence(0)),
        }
    }

    fn registry(&self) -> CapabilityRegistry {
        CapabilityRegistry::new()
            .with_collector(CollectorKind::Competitor, self.competitor.clone())
            .with_collector(CollectorKind::Trend, self.trend.clone())
            .with_collector(CollectorKind::Paper, self.paper.clone())
            .with_synthesizer(self.synth.clone())
    }

    fn scheduler(&self, tasks: Vec<Task>) -> Scheduler {
        Scheduler::new(TaskGraph::new(tasks).unwrap(), self.registry())
    }
}

fn id_set(raw: &[&str]) -> BTreeSet<TaskId> {
    ids(raw).into_iter().collect()
}

#[tokio::test]
async fn linear_chain_runs_in_order() {
    let h = Harness::new();
    let tasks = vec![
        collector_task("1", "CompetitorScout"),
        synthesis_task("2", "TrendScraper", &["1"]),
        synthesis_task("3", "TechPaperMiner", &["2"]),
    ];
    let result = h.scheduler(tasks).run("AI code review").await.unwrap();

    assert_eq!(result.report.outcome, RunOutcome::Completed);
    assert_eq!(result.report.steps, 3);
    let order: Vec<TaskId> = result.report.records.iter().map(|r| r.task_id.clone()).collect();
    assert_eq!(order, ids(&["1", "2", "3"]));
    assert_eq!(h.competitor.calls(), ids(&["1"]));
    assert_eq!(h.synth.calls(), ids(&["2", "3"]));
    assert!(h.trend.calls().is_empty());
}

#[tokio::test]
async fn fan_out_then_synthesis() {
    let h = Harness::new();
    let tasks = vec![
        collector_task("A", "CompetitorScout"),
        collector_task("B", "TrendScraper"),
        synthesis_task("C", "TrendScraper", &["A", "B"]),
    ];
    let result = h.scheduler(tasks).run("goal").await.unwrap();

    assert_eq!(result.state.completed(), &id_set(&["A", "B", "C"]));
    assert_eq!(h.synth.calls(), ids(&["C"]));

    // The synthesizer saw both collector summaries and all their evidence
    let seen = &h.synth.invocations()[0];
    assert_eq!(seen.summaries_seen, 2);
    assert_eq!(seen.evidence_seen, 3);
    assert_eq!(seen.goal, "goal");

    let last = result.state.summaries().last().unwrap();
    assert_eq!(last.capability_name, "Synthesizer");
}

#[tokio::test]
async fn unknown_capability_completes_with_error() {
    let h = Harness::new();
    let tasks = vec![
        collector_task("1", "Nonexistent"),
        collector_task("2", "TrendScraper"),
    ];
    let result = h.scheduler(tasks).run("goal").await.unwrap();

    assert_eq!(result.state.completed(), &id_set(&["1", "2"]));
    let first = &result.state.summaries()[0];
    assert_eq!(first.task_id, TaskId::new("1"));
    assert_eq!(first.capability_name, "Nonexistent");
    match &first.payload {
        SummaryPayload::Failed(failure) => assert_eq!(failure.kind, "unroutable"),
        other => panic!("expected failure, got {other:?}"),
    }
    assert_eq!(result.report.failed, 1);
    assert!(!result.report.records[0].succeeded);
}

#[tokio::test]
async fn ghost_dependency_is_never_reached() {
    let h = Harness::new();
    let tasks = vec![
        collector_task("A", "TrendScraper"),
        synthesis_task("B", "TrendScraper", &["ghost"]),
    ];
    let result = h.scheduler(tasks).run("goal").await.unwrap();

    assert_eq!(result.report.outcome, RunOutcome::Completed);
    assert_eq!(result.state.completed(), &id_set(&["A"]));
    assert_eq!(result.report.unreached, ids(&["B"]));
    assert_eq!(result.report.headline(), "1 of 2 tasks completed");
}

#[tokio::test]
async fn cycle_terminates_without_dispatch() {
    let h = Harness::new();
    let tasks = vec![
        synthesis_task("X", "TrendScraper", &["Y"]),
        synthesis_task("Y", "TrendScraper", &["X"]),
        collector_task("Z", "TrendScraper"),
    ];
    let result = h.scheduler(tasks).run("goal").await.unwrap();

    assert_eq!(result.report.steps, 1);
    assert_eq!(result.state.completed(), &id_set(&["Z"]));
    assert_eq!(result.report.unreached, ids(&["X", "Y"]));
    assert!(h.synth.calls().is_empty());
}

#[tokio::test]
async fn budget_exhaustion_returns_partial_state() {
    let h = Harness::new();
    let tasks = (1..=5)
        .map(|i| collector_task(&i.to_string(), "TrendScraper"))
        .collect();
    let result = h.scheduler(tasks).with_max_steps(3).run("goal").await.unwrap();

    assert_eq!(result.report.outcome, RunOutcome::BudgetExhausted);
    assert_eq!(result.report.steps, 3);
    assert_eq!(result.state.completed(), &id_set(&["1", "2", "3"]));
    assert_eq!(result.report.unreached, ids(&["4", "5"]));
}

#[tokio::test]
async fn budget_equal_to_plan_size_completes() {
    let h = Harness::new();
    let tasks = vec![
        collector_task("1", "TrendScraper"),
        collector_task("2", "TrendScraper"),
    ];
    let result = h.scheduler(tasks).with_max_steps(2).run("goal").await.unwrap();
    assert_eq!(result.report.outcome, RunOutcome::Completed);
    assert!(result.report.unreached.is_empty());
}

#[tokio::test]
async fn acyclic_plan_finishes_within_task_count_steps() {
    let h = Harness::new();
    let tasks = vec![
        collector_task("1", "CompetitorScout"),
        collector_task("2", "TechPaperMiner"),
        synthesis_task("3", "TrendScraper", &["1"]),
        synthesis_task("4", "TrendScraper", &["2", "3"]),
    ];
    let result = h.scheduler(tasks).with_max_steps(100).run("goal").await.unwrap();
    assert_eq!(result.report.steps, 4);
    assert_eq!(result.state.completed().len(), 4);
}

#[tokio::test(start_paused = true)]
async fn timeout_is_recorded_as_error_summary() {
    let slow = Arc::new(
        MockCapability::slow("CompetitorScout", Duration::from_secs(600)).with_timeout_secs(5),
    );
    let trend = Arc::new(MockCapability::succeeding("TrendScraper"));
    let registry = CapabilityRegistry::new()
        .with_collector(CollectorKind::Competitor, slow)
        .with_collector(CollectorKind::Trend, trend.clone());
    let graph = TaskGraph::new(vec![
        collector_task("1", "CompetitorScout"),
        collector_task("2", "TrendScraper"),
    ])
    .unwrap();

    let result = Scheduler::new(graph, registry).run("goal").await.unwrap();

    assert_eq!(result.state.completed(), &id_set(&["1", "2"]));
    match &result.state.summaries()[0].payload {
        SummaryPayload::Failed(failure) => {
            assert_eq!(failure.kind, "timeout");
            assert!(failure.message.contains("5s"));
        }
        other => panic!("expected timeout, got {other:?}"),
    }
    assert_eq!(trend.calls(), ids(&["2"]));
}

#[tokio::test]
async fn failing_collector_does_not_stop_the_run() {
    let failing = Arc::new(MockCapability::failing("CompetitorScout", "HTTP 500"));
    let trend = Arc::new(MockCapability::succeeding("TrendScraper"));
    let synth = Arc::new(Synthesizer::new(None));
    let registry = CapabilityRegistry::new()
        .with_collector(CollectorKind::Competitor, failing)
        .with_collector(CollectorKind::Trend, trend)
        .with_synthesizer(synth);
    let graph = TaskGraph::new(vec![
        collector_task("1", "CompetitorScout"),
        collector_task("2", "TrendScraper"),
        synthesis_task("3", "TrendScraper", &["1", "2"]),
    ])
    .unwrap();

    let result = Scheduler::new(graph, registry).run("goal").await.unwrap();

    assert_eq!(result.state.completed().len(), 3);
    let summaries = result.state.summaries();
    assert!(summaries[0].is_error());
    assert!(!summaries[1].is_error());
    // The roll-up still runs and reports the failed dependency
    let digest = summaries[2].result().unwrap().as_str().unwrap();
    assert!(digest.contains("CompetitorScout (failed, capability)"));
    // Only the trend collector produced evidence
    assert_eq!(result.state.evidence().len(), 1);
}

#[tokio::test]
async fn panicking_collector_does_not_stop_the_run() {
    let buggy = Arc::new(MockCapability::panicking("CompetitorScout", "collector bug"));
    let trend = Arc::new(MockCapability::succeeding("TrendScraper"));
    let registry = CapabilityRegistry::new()
        .with_collector(CollectorKind::Competitor, buggy.clone())
        .with_collector(CollectorKind::Trend, trend.clone());
    let graph = TaskGraph::new(vec![
        collector_task("1", "CompetitorScout"),
        collector_task("2", "TrendScraper"),
    ])
    .unwrap();

    let result = Scheduler::new(graph, registry).run("goal").await.unwrap();

    assert_eq!(result.report.outcome, RunOutcome::Completed);
    assert_eq!(result.state.completed(), &id_set(&["1", "2"]));
    assert_eq!(buggy.calls(), ids(&["1"]));
    assert_eq!(trend.calls(), ids(&["2"]));

    let summaries = result.state.summaries();
    match &summaries[0].payload {
        SummaryPayload::Failed(failure) => {
            assert_eq!(failure.kind, "capability");
            assert!(failure.message.contains("panicked: collector bug"));
        }
        other => panic!("expected failure, got {other:?}"),
    }
    assert!(!summaries[1].is_error());
    assert_eq!(result.report.failed, 1);
}

#[tokio::test]
async fn state_only_grows_across_steps() {
    let h = Harness::new();
    let scheduler = h.scheduler(vec![
        collector_task("1", "TrendScraper"),
        collector_task("2", "CompetitorScout"),
        synthesis_task("3", "TrendScraper", &["1", "2"]),
    ]);

    let mut state = sleuth_agent::ExecutionState::new();
    let mut step = 1;
    loop {
        let before = state.clone();
        let (next, record) = scheduler.step("goal", state, step).await.unwrap();
        assert!(before.completed().is_subset(next.completed()));
        assert!(next.evidence().starts_with(before.evidence()));
        assert!(next.summaries().starts_with(before.summaries()));
        state = next;
        if record.is_none() {
            break;
        }
        step += 1;
    }
    assert_eq!(state.completed().len(), 3);
}

#[tokio::test]
async fn dispatch_order_does_not_change_completed_or_evidence() {
    let forward = Harness::new();
    let a = forward
        .scheduler(vec![
            collector_task("A", "CompetitorScout"),
            collector_task("B", "TrendScraper"),
        ])
        .run("goal")
        .await
        .unwrap();

    let reverse = Harness::new();
    let b = reverse
        .scheduler(vec![
            collector_task("B", "TrendScraper"),
            collector_task("A", "CompetitorScout"),
        ])
        .run("goal")
        .await
        .unwrap();

    assert_eq!(a.state.completed(), b.state.completed());
    let sources = |s: &sleuth_agent::ExecutionState| {
        s.evidence()
            .iter()
            .filter_map(|e| e.source().map(str::to_string))
            .collect::<BTreeSet<_>>()
    };
    assert_eq!(sources(&a.state), sources(&b.state));
    assert_eq!(a.state.summaries()[0].task_id, TaskId::new("A"));
    assert_eq!(b.state.summaries()[0].task_id, TaskId::new("B"));
}

#[tokio::test]
async fn events_trace_the_run() {
    let h = Harness::new();
    let bus = Arc::new(EventBus::default());
    let mut rx = bus.subscribe();
    let scheduler = h
        .scheduler(vec![
            collector_task("1", "TrendScraper"),
            collector_task("2", "Nonexistent"),
        ])
        .with_event_bus(bus.clone());
    let run_id = scheduler.run_id().clone();
    scheduler.run("goal").await.unwrap();

    let mut kinds = Vec::new();
    while let Ok(event) = rx.try_recv() {
        assert_eq!(event.run_id(), &run_id);
        kinds.push(match event {
            EngineEvent::RunStarted { .. } => "started",
            EngineEvent::TaskDispatched { .. } => "dispatched",
            EngineEvent::TaskCompleted { .. } => "completed",
            EngineEvent::TaskFailed { .. } => "failed",
            EngineEvent::RunFinished { .. } => "finished",
        });
    }
    assert_eq!(
        kinds,
        vec!["started", "dispatched", "completed", "failed", "finished"]
    );
}
