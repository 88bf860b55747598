use futures::future::BoxFuture;
use futures::stream::{BoxStream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::warn;

use sleuth_core::config::ModelConfig;
use sleuth_core::error::{Result, SleuthError};
use sleuth_core::traits::LlmClient;
use sleuth_core::types::*;

use crate::streaming::{SseEvent, SseStream};

const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";

/// OpenAI-compatible client. Works with OpenAI, Ollama, vLLM, Groq, OpenRouter, etc.
pub struct OpenAiClient {
    http: Client,
}

impl OpenAiClient {
    pub fn new() -> Self {
        Self {
            http: Client::new(),
        }
    }
}

impl Default for OpenAiClient {
    fn default() -> Self {
        Self::new()
    }
}

// Request types
#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<OaiMessage>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    stream: bool,
}

#[derive(Serialize, Debug, PartialEq)]
struct OaiMessage {
    role: &'static str,
    content: String,
}

// Response types
#[derive(Deserialize, Debug)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    usage: Option<StreamUsage>,
}

#[derive(Deserialize, Debug)]
struct StreamChoice {
    #[serde(default)]
    delta: Option<StreamDeltaContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
struct StreamDeltaContent {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize, Debug)]
struct StreamUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

fn convert_messages(messages: Vec<ChatMessage>) -> Vec<OaiMessage> {
    messages
        .into_iter()
        .map(|msg| OaiMessage {
            role: match msg.role {
                Role::System => "system",
                Role::User => "user",
                Role::Assistant => "assistant",
            },
            content: msg.content,
        })
        .collect()
}

fn parse_chunk(event: SseEvent) -> Vec<Result<StreamDelta>> {
    if event.data.trim() == "[DONE]" {
        return vec![];
    }

    let chunk: StreamChunk = match serde_json::from_str(&event.data) {
        Ok(chunk) => chunk,
        Err(e) => {
            warn!(data = %event.data, error = %e, "Failed to parse OpenAI SSE chunk");
            return vec![];
        }
    };

    let mut deltas = Vec::new();

    if let Some(choice) = chunk.choices.into_iter().next() {
        if let Some(text) = choice.delta.and_then(|d| d.content) {
            if !text.is_empty() {
                deltas.push(Ok(StreamDelta::TextDelta(text)));
            }
        }

        if let Some(reason) = choice.finish_reason {
            let stop = match reason.as_str() {
                "length" => StopReason::MaxTokens,
                "stop" => StopReason::EndTurn,
                _ => StopReason::StopSequence,
            };
            deltas.push(Ok(StreamDelta::Stop(stop)));
        }
    }

    if let Some(usage) = chunk.usage {
        deltas.push(Ok(StreamDelta::Usage {
            input_tokens: usage.prompt_tokens,
            output_tokens: usage.completion_tokens,
        }));
    }

    deltas
}

impl LlmClient for OpenAiClient {
    fn chat_stream(
        &self,
        config: &ModelConfig,
        messages: Vec<ChatMessage>,
    ) -> BoxFuture<'_, Result<BoxStream<'_, Result<StreamDelta>>>> {
        let config = config.clone();

        Box::pin(async move {
            let base_url = config.base_url.as_deref().unwrap_or(OPENAI_API_URL);

            let body = ChatRequest {
                model: config.model_id.clone(),
                messages: convert_messages(messages),
                max_tokens: config.max_tokens,
                temperature: if config.temperature > 0.0 {
                    Some(config.temperature)
                } else {
                    None
                },
                stream: true,
            };

            let mut req = self.http.post(base_url).json(&body);

            if let Some(api_key) = &config.api_key {
                req = req.header("Authorization", format!("Bearer {}", api_key));
            }

            let response = req
                .send()
                .await
                .map_err(|e| SleuthError::LlmRequest(e.to_string()))?;

            if !response.status().is_success() {
                let status = response.status();
                let body = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "unknown".to_string());
                return Err(SleuthError::LlmRequest(format!("HTTP {}: {}", status, body)));
            }

            let sse_stream = SseStream::new(response.bytes_stream());
            let delta_stream = sse_stream
                .map(|event| futures::stream::iter(parse_chunk(event)))
                .flatten();

            Ok(Box::pin(delta_stream) as BoxStream<'_, Result<StreamDelta>>)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(data: &str) -> SseEvent {
        SseEvent {
            event_type: None,
            data: data.to_string(),
        }
    }

    #[test]
    fn test_convert_roles() {
        let msgs = convert_messages(vec![ChatMessage::system("s"), ChatMessage::user("u")]);
        assert_eq!(
            msgs,
            vec![
                OaiMessage {
                    role: "system",
                    content: "s".into()
                },
                OaiMessage {
                    role: "user",
                    content: "u".into()
                },
            ]
        );
    }

    #[test]
    fn test_parse_text_then_stop() {
        let deltas = parse_chunk(event(r#"{"choices":[{"delta":{"content":"Hel"}}]}"#));
        assert!(matches!(&deltas[0], Ok(StreamDelta::TextDelta(t)) if t == "Hel"));

        let deltas = parse_chunk(event(r#"{"choices":[{"delta":{},"finish_reason":"length"}]}"#));
        assert_eq!(deltas.len(), 1);
        assert!(matches!(&deltas[0], Ok(StreamDelta::Stop(StopReason::MaxTokens))));
    }

    #[test]
    fn test_done_marker() {
        assert!(parse_chunk(event("[DONE]")).is_empty());
    }
}
