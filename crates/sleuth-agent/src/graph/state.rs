use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use sleuth_core::error::{CapabilityError, Result, SleuthError};
use sleuth_core::types::{CapabilityOutput, Evidence, SharedContext, Summary, Task, TaskId};

use super::task::TaskGraph;

/// The accumulator a run threads through the scheduler.
///
/// `completed` only grows (set union); `evidence` and `summaries` are
/// append-only. Every completed id names a task of the graph the state was
/// built against.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionState {
    completed: BTreeSet<TaskId>,
    evidence: Vec<Evidence>,
    summaries: Vec<Summary>,
}

impl ExecutionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn completed(&self) -> &BTreeSet<TaskId> {
        &self.completed
    }

    pub fn evidence(&self) -> &[Evidence] {
        &self.evidence
    }

    pub fn summaries(&self) -> &[Summary] {
        &self.summaries
    }

    pub fn is_completed(&self, id: &TaskId) -> bool {
        self.completed.contains(id)
    }

    /// Read-only view handed to a capability.
    pub fn context<'a>(&'a self, goal: &'a str) -> SharedContext<'a> {
        SharedContext {
            goal,
            summaries: &self.summaries,
            evidence: &self.evidence,
        }
    }

    /// Merge a delta into the state.
    ///
    /// Fails with an engine fault when the delta names a task the graph does
    /// not contain; the state is left untouched in that case.
    pub fn apply(&mut self, graph: &TaskGraph, delta: StateDelta) -> Result<()> {
        if let Some(stray) = delta
            .completed
            .iter()
            .chain(delta.summaries.iter().map(|s| &s.task_id))
            .find(|id| !graph.contains(id))
        {
            return Err(SleuthError::EngineFault(format!(
                "task '{stray}' is not part of the plan"
            )));
        }

        self.completed.extend(delta.completed);
        self.evidence.extend(delta.evidence);
        self.summaries.extend(delta.summaries);
        Ok(())
    }

    pub fn into_parts(self) -> (BTreeSet<TaskId>, Vec<Evidence>, Vec<Summary>) {
        (self.completed, self.evidence, self.summaries)
    }
}

/// What one dispatch contributes to the state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateDelta {
    pub completed: BTreeSet<TaskId>,
    pub evidence: Vec<Evidence>,
    pub summaries: Vec<Summary>,
}

impl StateDelta {
    pub fn success(task: &Task, capability: &str, output: CapabilityOutput) -> Self {
        Self {
            completed: BTreeSet::from([task.id.clone()]),
            evidence: output.evidence,
            summaries: vec![Summary::success(
                task.id.clone(),
                capability,
                output.summary_payload,
            )],
        }
    }

    /// The task still completes; no evidence, one error-flagged summary.
    pub fn failure(task: &Task, capability: &str, error: &CapabilityError) -> Self {
        Self {
            completed: BTreeSet::from([task.id.clone()]),
            evidence: vec![],
            summaries: vec![Summary::failure(task.id.clone(), capability, error)],
        }
    }

    /// Associative merge: union of ids, `self`'s lists before `other`'s.
    pub fn combine(mut self, other: StateDelta) -> Self {
        self.completed.extend(other.completed);
        self.evidence.extend(other.evidence);
        self.summaries.extend(other.summaries);
        self
    }
}
