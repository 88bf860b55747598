pub mod providers;
pub mod retry;
pub mod streaming;

use std::sync::Arc;

use futures::StreamExt;

use sleuth_core::config::{AppConfig, ModelConfig};
use sleuth_core::error::{Result, SleuthError};
use sleuth_core::traits::LlmClient;
use sleuth_core::types::{ChatMessage, StreamDelta};

pub use providers::gemini::GeminiClient;
pub use providers::openai::OpenAiClient;
pub use retry::RetryingClient;

/// Create an LLM client based on the provider name.
pub fn create_client(config: &ModelConfig) -> Box<dyn LlmClient> {
    match config.provider.as_str() {
        "gemini" | "google" => Box::new(GeminiClient::new()),
        // Everything else uses the OpenAI-compatible client
        _ => Box::new(OpenAiClient::new()),
    }
}

/// A configured client plus the model it talks to.
#[derive(Clone)]
pub struct LlmHandle {
    pub client: Arc<dyn LlmClient>,
    pub model: ModelConfig,
}

impl LlmHandle {
    pub fn new(client: Arc<dyn LlmClient>, model: ModelConfig) -> Self {
        Self { client, model }
    }

    /// One system + user exchange, returning the full answer text.
    pub async fn complete(&self, system: &str, prompt: String) -> Result<String> {
        let messages = vec![ChatMessage::system(system), ChatMessage::user(prompt)];
        collect_text(self.client.as_ref(), &self.model, messages).await
    }
}

/// Build the client used by collectors and the synthesizer, wrapped with
/// retry and fallback models. `None` when no model is configured.
pub fn client_from_config(config: &AppConfig) -> Option<LlmHandle> {
    let model = config.model.clone()?;
    let fallbacks = config
        .fallback_models
        .iter()
        .map(|fb| (fb.clone(), create_client(fb)))
        .collect();
    let client = RetryingClient::new(
        create_client(&model),
        fallbacks,
        model.retry.clone().unwrap_or_default(),
    );
    Some(LlmHandle::new(Arc::new(client), model))
}

/// Send one request and collect the full text answer.
pub async fn collect_text(
    client: &dyn LlmClient,
    config: &ModelConfig,
    messages: Vec<ChatMessage>,
) -> Result<String> {
    let mut stream = client.chat_stream(config, messages).await?;

    let mut text = String::new();
    while let Some(delta) = stream.next().await {
        match delta? {
            StreamDelta::TextDelta(chunk) => text.push_str(&chunk),
            StreamDelta::Stop(_) | StreamDelta::Usage { .. } => {}
        }
    }

    if text.trim().is_empty() {
        return Err(SleuthError::LlmParse(format!(
            "{} returned an empty answer",
            config.model_id
        )));
    }
    Ok(text)
}
