use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use sleuth_core::error::Result;
use sleuth_core::event::EventBus;
use sleuth_core::types::{EngineEvent, RunId, RunOutcome, TaskId};

use super::state::{ExecutionState, StateDelta};
use super::task::TaskGraph;
use crate::router::{invoke, CapabilityRegistry};

/// Default step budget.
pub const DEFAULT_MAX_STEPS: usize = 15;

/// Record of one dispatch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepRecord {
    /// 1-based step number.
    pub step: usize,
    pub task_id: TaskId,
    /// Capability that handled the task (the assigned name when unroutable).
    pub capability: String,
    pub succeeded: bool,
    pub elapsed_ms: u64,
}

/// Run metadata returned next to the final state.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: RunId,
    pub goal: String,
    pub outcome: RunOutcome,
    pub steps: usize,
    pub max_steps: usize,
    pub total_tasks: usize,
    pub completed: usize,
    pub failed: usize,
    /// Per-step records in execution order.
    pub records: Vec<StepRecord>,
    /// Tasks never dispatched: blocked, cyclic, or cut off by the budget.
    pub unreached: Vec<TaskId>,
    pub total_elapsed_ms: u64,
}

impl RunReport {
    /// One-line human summary, e.g. "3 of 4 tasks completed".
    pub fn headline(&self) -> String {
        let mut line = format!("{} of {} tasks completed", self.completed, self.total_tasks);
        if self.failed > 0 {
            line.push_str(&format!(" ({} with errors)", self.failed));
        }
        if self.outcome == RunOutcome::BudgetExhausted {
            line.push_str(&format!("; step budget of {} exhausted", self.max_steps));
        }
        line
    }
}

#[derive(Debug, Clone)]
pub struct RunResult {
    pub state: ExecutionState,
    pub report: RunReport,
}

/// Dependency-ordered control loop.
///
/// Each step picks the first runnable task in plan order, dispatches it to
/// the capability the router resolves, and merges the outcome into the
/// state. Capability failures of any kind complete the task with an
/// error-flagged summary; only state faults abort the run.
pub struct Scheduler {
    graph: TaskGraph,
    registry: CapabilityRegistry,
    max_steps: usize,
    event_bus: Option<Arc<EventBus>>,
    run_id: RunId,
}

impl Scheduler {
    pub fn new(graph: TaskGraph, registry: CapabilityRegistry) -> Self {
        Self {
            graph,
            registry,
            max_steps: DEFAULT_MAX_STEPS,
            event_bus: None,
            run_id: RunId::new(),
        }
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(bus);
        self
    }

    pub fn with_run_id(mut self, run_id: RunId) -> Self {
        self.run_id = run_id;
        self
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    pub fn graph(&self) -> &TaskGraph {
        &self.graph
    }

    fn publish(&self, event: EngineEvent) {
        if let Some(bus) = &self.event_bus {
            bus.publish(event);
        }
    }

    /// Advance the run by one dispatch.
    ///
    /// Returns the new state and the step record, or `None` for the record
    /// when no task is runnable (the state comes back unchanged).
    pub async fn step(
        &self,
        goal: &str,
        mut state: ExecutionState,
        step: usize,
    ) -> Result<(ExecutionState, Option<StepRecord>)> {
        let Some(task) = self.graph.runnable(state.completed()).into_iter().next() else {
            return Ok((state, None));
        };

        let started = Instant::now();
        let (capability, result) = match self.registry.resolve(task) {
            Ok(cap) => {
                let name = cap.name().to_string();
                info!(step, task_id = %task.id, capability = %name, "Dispatching task");
                self.publish(EngineEvent::TaskDispatched {
                    run_id: self.run_id.clone(),
                    step,
                    task_id: task.id.clone(),
                    capability: name.clone(),
                });
                let result = invoke(cap.as_ref(), task, state.context(goal)).await;
                (name, result)
            }
            Err(e) => {
                warn!(step, task_id = %task.id, assigned = %task.assigned_capability, "Task is unroutable");
                (task.assigned_capability.clone(), Err(e))
            }
        };
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let (delta, succeeded) = match result {
            Ok(output) => {
                debug!(
                    task_id = %task.id,
                    evidence = output.evidence.len(),
                    elapsed_ms,
                    "Task completed"
                );
                self.publish(EngineEvent::TaskCompleted {
                    run_id: self.run_id.clone(),
                    task_id: task.id.clone(),
                    capability: capability.clone(),
                    evidence_count: output.evidence.len(),
                    elapsed_ms,
                });
                (StateDelta::success(task, &capability, output), true)
            }
            Err(e) => {
                error!(task_id = %task.id, capability = %capability, error = %e, "Task failed");
                self.publish(EngineEvent::TaskFailed {
                    run_id: self.run_id.clone(),
                    task_id: task.id.clone(),
                    capability: capability.clone(),
                    error: e.to_string(),
                });
                (StateDelta::failure(task, &capability, &e), false)
            }
        };

        let record = StepRecord {
            step,
            task_id: task.id.clone(),
            capability,
            succeeded,
            elapsed_ms,
        };
        state.apply(&self.graph, delta)?;
        Ok((state, Some(record)))
    }

    /// Run until no task is runnable or the step budget is spent.
    pub async fn run(&self, goal: &str) -> Result<RunResult> {
        let started = Instant::now();
        let total_tasks = self.graph.len();
        info!(run_id = %self.run_id, total_tasks, max_steps = self.max_steps, "Run started");
        self.publish(EngineEvent::RunStarted {
            run_id: self.run_id.clone(),
            goal: goal.to_string(),
            total_tasks,
        });

        let mut state = ExecutionState::new();
        let mut records = Vec::new();
        let mut outcome = RunOutcome::Completed;

        loop {
            if records.len() >= self.max_steps {
                if !self.graph.runnable(state.completed()).is_empty() {
                    warn!(max_steps = self.max_steps, "Step budget exhausted with tasks still runnable");
                    outcome = RunOutcome::BudgetExhausted;
                }
                break;
            }

            let (next, record) = self.step(goal, state, records.len() + 1).await?;
            state = next;
            match record {
                Some(record) => records.push(record),
                None => break,
            }
        }

        let unreached = self.graph.unreached(state.completed());
        if outcome == RunOutcome::Completed && !unreached.is_empty() {
            warn!(unreached = ?unreached, "Some tasks never became runnable");
        }

        let report = RunReport {
            run_id: self.run_id.clone(),
            goal: goal.to_string(),
            outcome,
            steps: records.len(),
            max_steps: self.max_steps,
            total_tasks,
            completed: state.completed().len(),
            failed: state.summaries().iter().filter(|s| s.is_error()).count(),
            records,
            unreached,
            total_elapsed_ms: started.elapsed().as_millis() as u64,
        };

        info!(
            run_id = %self.run_id,
            outcome = ?report.outcome,
            steps = report.steps,
            "{}",
            report.headline()
        );
        self.publish(EngineEvent::RunFinished {
            run_id: self.run_id.clone(),
            outcome: report.outcome,
            steps: report.steps,
            completed: report.completed,
            total_tasks,
        });

        Ok(RunResult { state, report })
    }
}

#[cfg(test)]
mod tests {
    use sleuth_test_utils::{collector_task, MockCapability};

    use super::*;
    use crate::router::CollectorKind;

    fn scheduler(tasks: Vec<sleuth_core::types::Task>) -> Scheduler {
        let registry = CapabilityRegistry::new().with_collector(
            CollectorKind::Trend,
            Arc::new(MockCapability::succeeding("TrendScraper")),
        );
        Scheduler::new(TaskGraph::new(tasks).unwrap(), registry)
    }

    #[tokio::test]
    async fn test_step_on_finished_graph_is_noop() {
        let s = scheduler(vec![]);
        let (state, record) = s.step("goal", ExecutionState::new(), 1).await.unwrap();
        assert!(record.is_none());
        assert_eq!(state, ExecutionState::new());
    }

    #[tokio::test]
    async fn test_step_threads_state() {
        let s = scheduler(vec![
            collector_task("1", "TrendScraper"),
            collector_task("2", "TrendScraper"),
        ]);
        let (state, first) = s.step("goal", ExecutionState::new(), 1).await.unwrap();
        assert_eq!(first.unwrap().task_id, TaskId::new("1"));
        let (state, second) = s.step("goal", state, 2).await.unwrap();
        let second = second.unwrap();
        assert_eq!(second.task_id, TaskId::new("2"));
        assert_eq!(second.step, 2);
        assert_eq!(state.completed().len(), 2);
    }

    #[tokio::test]
    async fn test_empty_plan_terminates_immediately() {
        let result = scheduler(vec![]).run("goal").await.unwrap();
        assert_eq!(result.report.outcome, RunOutcome::Completed);
        assert_eq!(result.report.steps, 0);
        assert_eq!(result.state, ExecutionState::new());
        assert_eq!(result.report.headline(), "0 of 0 tasks completed");
    }

    #[test]
    fn test_headline_mentions_budget() {
        let report = RunReport {
            run_id: RunId::from_str("r"),
            goal: "g".into(),
            outcome: RunOutcome::BudgetExhausted,
            steps: 2,
            max_steps: 2,
            total_tasks: 4,
            completed: 2,
            failed: 1,
            records: vec![],
            unreached: vec![TaskId::new("3"), TaskId::new("4")],
            total_elapsed_ms: 5,
        };
        assert_eq!(
            report.headline(),
            "2 of 4 tasks completed (1 with errors); step budget of 2 exhausted"
        );
    }
}
