use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::error::CapabilityError;

/// Unique run identifier.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct RunId(pub String);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_str(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque task identifier, unique within a plan.
///
/// Planners emit either numbers (`1`) or strings (`"T1"`); both deserialize
/// to the same string form.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct TaskId(pub String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for TaskId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Int(i64),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Text(s) => TaskId(s),
            Raw::Int(n) => TaskId(n.to_string()),
        })
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for TaskId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// One unit of planned work.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub id: TaskId,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Name of the capability that must run this task.
    #[serde(default, alias = "assigned_agent")]
    pub assigned_capability: String,
    /// Prerequisite task ids (set semantics; order is irrelevant).
    #[serde(default)]
    pub depends_on: Vec<TaskId>,
    /// Advisory priority from the planner, passed through untouched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<serde_json::Value>,
}

impl Task {
    pub fn new(id: impl Into<TaskId>, capability: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: String::new(),
            description: String::new(),
            assigned_capability: capability.into(),
            depends_on: vec![],
            priority: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_dependencies<I, T>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<TaskId>,
    {
        self.depends_on = deps.into_iter().map(Into::into).collect();
        self
    }

    /// Whether this task rolls up prior results instead of collecting new evidence.
    pub fn is_synthesis(&self) -> bool {
        !self.depends_on.is_empty()
    }
}

/// One retrieved unit of raw material (search hit, scraped page, abstract).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Evidence {
    pub content: String,
    /// Flat key/value map; always carries `source` and `origin`.
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl Evidence {
    pub fn new(
        content: impl Into<String>,
        source: impl Into<String>,
        origin: impl Into<String>,
    ) -> Self {
        let mut metadata = BTreeMap::new();
        metadata.insert("source".to_string(), serde_json::Value::String(source.into()));
        metadata.insert("origin".to_string(), serde_json::Value::String(origin.into()));
        Self {
            content: content.into(),
            metadata,
        }
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn source(&self) -> Option<&str> {
        self.metadata.get("source").and_then(|v| v.as_str())
    }

    pub fn origin(&self) -> Option<&str> {
        self.metadata.get("origin").and_then(|v| v.as_str())
    }
}

/// Why a task produced no result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskFailure {
    pub kind: String,
    pub message: String,
}

impl From<&CapabilityError> for TaskFailure {
    fn from(e: &CapabilityError) -> Self {
        Self {
            kind: e.kind().to_string(),
            message: e.to_string(),
        }
    }
}

/// Capability-specific result, or the failure recorded in its place.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", content = "data", rename_all = "snake_case")]
pub enum SummaryPayload {
    Ok(serde_json::Value),
    Failed(TaskFailure),
}

/// One capability's conclusion for one task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Summary {
    pub task_id: TaskId,
    pub capability_name: String,
    pub payload: SummaryPayload,
}

impl Summary {
    pub fn success(
        task_id: TaskId,
        capability_name: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            task_id,
            capability_name: capability_name.into(),
            payload: SummaryPayload::Ok(payload),
        }
    }

    pub fn failure(
        task_id: TaskId,
        capability_name: impl Into<String>,
        error: &CapabilityError,
    ) -> Self {
        Self {
            task_id,
            capability_name: capability_name.into(),
            payload: SummaryPayload::Failed(error.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.payload, SummaryPayload::Failed(_))
    }

    /// The successful payload, if any.
    pub fn result(&self) -> Option<&serde_json::Value> {
        match &self.payload {
            SummaryPayload::Ok(v) => Some(v),
            SummaryPayload::Failed(_) => None,
        }
    }
}

/// What a capability hands back from one invocation.
#[derive(Debug, Clone, Default)]
pub struct CapabilityOutput {
    pub summary_payload: serde_json::Value,
    pub evidence: Vec<Evidence>,
}

impl CapabilityOutput {
    pub fn new(summary_payload: serde_json::Value, evidence: Vec<Evidence>) -> Self {
        Self {
            summary_payload,
            evidence,
        }
    }
}

/// Read-only view of the run handed to every capability invocation.
#[derive(Debug, Clone, Copy)]
pub struct SharedContext<'a> {
    pub goal: &'a str,
    pub summaries: &'a [Summary],
    pub evidence: &'a [Evidence],
}

/// How a run ended.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// No task was runnable any more.
    Completed,
    /// The step budget ran out while tasks were still runnable.
    BudgetExhausted,
}

/// Role in an LLM conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A chat message sent to an LLM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl ChatMessage {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: text.into(),
            timestamp: Some(Utc::now()),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: text.into(),
            timestamp: Some(Utc::now()),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: text.into(),
            timestamp: Some(Utc::now()),
        }
    }
}

/// Stop reason from the LLM.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum StopReason {
    EndTurn,
    MaxTokens,
    StopSequence,
}

/// A streaming delta from the LLM.
#[derive(Debug, Clone)]
pub enum StreamDelta {
    /// A chunk of text content.
    TextDelta(String),

    /// The response is complete.
    Stop(StopReason),

    /// Usage information.
    Usage {
        input_tokens: u64,
        output_tokens: u64,
    },
}

/// Engine lifecycle event broadcast to all subscribers.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// Run started.
    RunStarted {
        run_id: RunId,
        goal: String,
        total_tasks: usize,
    },
    /// A task was handed to a capability.
    TaskDispatched {
        run_id: RunId,
        step: usize,
        task_id: TaskId,
        capability: String,
    },
    /// A task finished with a result.
    TaskCompleted {
        run_id: RunId,
        task_id: TaskId,
        capability: String,
        evidence_count: usize,
        elapsed_ms: u64,
    },
    /// A task finished with an error summary.
    TaskFailed {
        run_id: RunId,
        task_id: TaskId,
        capability: String,
        error: String,
    },
    /// Run reached a terminal state.
    RunFinished {
        run_id: RunId,
        outcome: RunOutcome,
        steps: usize,
        completed: usize,
        total_tasks: usize,
    },
}

impl EngineEvent {
    pub fn run_id(&self) -> &RunId {
        match self {
            Self::RunStarted { run_id, .. }
            | Self::TaskDispatched { run_id, .. }
            | Self::TaskCompleted { run_id, .. }
            | Self::TaskFailed { run_id, .. }
            | Self::RunFinished { run_id, .. } => run_id,
        }
    }
}
