use thiserror::Error;

#[derive(Debug, Error)]
pub enum SleuthError {
    // LLM errors
    #[error("LLM request failed: {0}")]
    LlmRequest(String),

    #[error("LLM streaming error: {0}")]
    LlmStream(String),

    #[error("LLM provider not supported: {0}")]
    UnsupportedProvider(String),

    #[error("LLM response parse error: {0}")]
    LlmParse(String),

    // Lookup errors (search, scrape, feeds)
    #[error("Lookup failed: {source_name}: {message}")]
    Lookup { source_name: String, message: String },

    // Plan errors
    #[error("Invalid plan: {0}")]
    InvalidPlan(String),

    #[error("Duplicate task id in plan: {0}")]
    DuplicateTaskId(String),

    #[error("Task '{0}' depends on itself")]
    SelfDependency(String),

    // Engine faults (unreachable under the state invariants)
    #[error("Engine fault: {0}")]
    EngineFault(String),

    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SleuthError>;

/// Failure of a single capability invocation.
///
/// Never aborts a run: the scheduler records it in an error-flagged summary
/// and marks the task complete.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CapabilityError {
    #[error("{capability} failed: {message}")]
    Failed { capability: String, message: String },

    #[error("{capability} timed out after {timeout_secs}s")]
    Timeout { capability: String, timeout_secs: u64 },

    #[error("no capability can run '{requested}'")]
    Unroutable { requested: String },
}

impl CapabilityError {
    pub fn failed(capability: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Failed {
            capability: capability.into(),
            message: message.into(),
        }
    }

    /// Short machine-readable tag recorded in failure summaries.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Failed { .. } => "capability",
            Self::Timeout { .. } => "timeout",
            Self::Unroutable { .. } => "unroutable",
        }
    }
}

impl From<SleuthError> for CapabilityError {
    fn from(e: SleuthError) -> Self {
        let capability = match &e {
            SleuthError::Lookup { source_name, .. } => source_name.clone(),
            SleuthError::LlmRequest(_)
            | SleuthError::LlmStream(_)
            | SleuthError::LlmParse(_)
            | SleuthError::UnsupportedProvider(_) => "llm".to_string(),
            _ => "capability".to_string(),
        };
        Self::Failed {
            capability,
            message: e.to_string(),
        }
    }
}
