use futures::future::BoxFuture;
use futures::stream::BoxStream;

use crate::config::ModelConfig;
use crate::error::{CapabilityError, Result};
use crate::types::*;

/// Multi-provider streaming LLM client.
pub trait LlmClient: Send + Sync + 'static {
    /// Send a chat request and receive a stream of deltas.
    fn chat_stream(
        &self,
        config: &ModelConfig,
        messages: Vec<ChatMessage>,
    ) -> BoxFuture<'_, Result<BoxStream<'_, Result<StreamDelta>>>>;
}

/// One uniformly-invoked unit of task execution.
///
/// Collectors and the synthesizer both implement this. Implementations get
/// a read-only view of prior results and hand everything they want recorded
/// back through the returned `CapabilityOutput`.
pub trait Capability: Send + Sync + 'static {
    /// Name recorded in summaries (e.g. "CompetitorScout").
    fn name(&self) -> &str;

    /// Run one task.
    fn run<'a>(
        &'a self,
        task: &'a Task,
        ctx: SharedContext<'a>,
    ) -> BoxFuture<'a, std::result::Result<CapabilityOutput, CapabilityError>>;

    /// Timeout in seconds for one invocation.
    fn timeout_secs(&self) -> u64 {
        120
    }
}
