use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::BoxFuture;

use sleuth_core::error::CapabilityError;
use sleuth_core::traits::Capability;
use sleuth_core::types::*;

#[derive(Debug, Clone)]
enum Behavior {
    Succeed,
    Fail(String),
    Sleep(Duration),
    Panic(String),
}

/// What a mock capability observed on one invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub task_id: TaskId,
    pub goal: String,
    pub summaries_seen: usize,
    pub evidence_seen: usize,
}

/// Scripted capability that records every invocation.
///
/// Successful runs return `{"task": <id>, "by": <name>}` and
/// `evidence_per_task` evidence records.
pub struct MockCapability {
    name: String,
    behavior: Behavior,
    timeout_secs: u64,
    evidence_per_task: usize,
    invocations: Arc<Mutex<Vec<Invocation>>>,
}

impl MockCapability {
    fn with_behavior(name: &str, behavior: Behavior) -> Self {
        Self {
            name: name.to_string(),
            behavior,
            timeout_secs: 120,
            evidence_per_task: 1,
            invocations: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn succeeding(name: &str) -> Self {
        Self::with_behavior(name, Behavior::Succeed)
    }

    pub fn failing(name: &str, message: &str) -> Self {
        Self::with_behavior(name, Behavior::Fail(message.to_string()))
    }

    /// Sleeps for `delay` before succeeding.
    pub fn slow(name: &str, delay: Duration) -> Self {
        Self::with_behavior(name, Behavior::Sleep(delay))
    }

    /// Panics inside the returned future.
    pub fn panicking(name: &str, message: &str) -> Self {
        Self::with_behavior(name, Behavior::Panic(message.to_string()))
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn with_evidence(mut self, per_task: usize) -> Self {
        self.evidence_per_task = per_task;
        self
    }

    pub fn invocations(&self) -> Vec<Invocation> {
        self.invocations.lock().unwrap().clone()
    }

    /// Task ids in invocation order.
    pub fn calls(&self) -> Vec<TaskId> {
        self.invocations()
            .into_iter()
            .map(|i| i.task_id)
            .collect()
    }

    fn output(&self, task: &Task) -> CapabilityOutput {
        let evidence = (0..self.evidence_per_task)
            .map(|i| {
                Evidence::new(
                    format!("{} evidence for {}", self.name, task.id),
                    format!("mock://{}/{}/{}", self.name, task.id, i),
                    "mock",
                )
            })
            .collect();
        CapabilityOutput::new(
            serde_json::json!({ "task": task.id, "by": self.name }),
            evidence,
        )
    }
}

impl Capability for MockCapability {
    fn name(&self) -> &str {
        &self.name
    }

    fn timeout_secs(&self) -> u64 {
        self.timeout_secs
    }

    fn run<'a>(
        &'a self,
        task: &'a Task,
        ctx: SharedContext<'a>,
    ) -> BoxFuture<'a, Result<CapabilityOutput, CapabilityError>> {
        self.invocations.lock().unwrap().push(Invocation {
            task_id: task.id.clone(),
            goal: ctx.goal.to_string(),
            summaries_seen: ctx.summaries.len(),
            evidence_seen: ctx.evidence.len(),
        });

        Box::pin(async move {
            match &self.behavior {
                Behavior::Succeed => Ok(self.output(task)),
                Behavior::Fail(message) => Err(CapabilityError::failed(&self.name, message.clone())),
                Behavior::Sleep(delay) => {
                    tokio::time::sleep(*delay).await;
                    Ok(self.output(task))
                }
                Behavior::Panic(message) => panic!("{}", message),
            }
        })
    }
}
