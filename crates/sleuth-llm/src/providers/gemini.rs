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

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Google Gemini native API client.
pub struct GeminiClient {
    http: Client,
}

impl GeminiClient {
    pub fn new() -> Self {
        Self {
            http: Client::new(),
        }
    }
}

impl Default for GeminiClient {
    fn default() -> Self {
        Self::new()
    }
}

// ── Request types ────────────────────────────────────────────────

#[derive(Serialize)]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Serialize, Deserialize, Debug)]
struct GeminiContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Serialize, Deserialize, Debug)]
struct GeminiPart {
    #[serde(default)]
    text: String,
}

#[derive(Serialize)]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

// ── Response types ───────────────────────────────────────────────

#[derive(Deserialize, Debug)]
struct GeminiStreamChunk {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(default, rename = "usageMetadata")]
    usage_metadata: Option<GeminiUsage>,
}

#[derive(Deserialize, Debug)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
    #[serde(default, rename = "finishReason")]
    finish_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
struct GeminiUsage {
    #[serde(default, rename = "promptTokenCount")]
    prompt_token_count: u64,
    #[serde(default, rename = "candidatesTokenCount")]
    candidates_token_count: u64,
}

// ── Conversion ───────────────────────────────────────────────────

fn convert_messages(messages: Vec<ChatMessage>) -> (Option<GeminiContent>, Vec<GeminiContent>) {
    let mut system: Option<GeminiContent> = None;
    let mut contents = Vec::new();

    for msg in messages {
        match msg.role {
            Role::System => {
                // Gemini takes a single system instruction; concatenate
                let parts = &mut system
                    .get_or_insert_with(|| GeminiContent {
                        role: None,
                        parts: vec![],
                    })
                    .parts;
                parts.push(GeminiPart { text: msg.content });
            }
            Role::User | Role::Assistant => {
                if msg.content.is_empty() {
                    continue;
                }
                let role = if msg.role == Role::User { "user" } else { "model" };
                contents.push(GeminiContent {
                    role: Some(role.to_string()),
                    parts: vec![GeminiPart { text: msg.content }],
                });
            }
        }
    }

    (system, contents)
}

/// Turn one streamed chunk into deltas. The final chunk usually carries the
/// last text, the finish reason and usage together.
fn parse_gemini_chunk(event: SseEvent) -> Vec<Result<StreamDelta>> {
    if event.data.trim() == "[DONE]" {
        return vec![];
    }

    let chunk: GeminiStreamChunk = match serde_json::from_str(&event.data) {
        Ok(chunk) => chunk,
        Err(e) => {
            warn!(data = %event.data, error = %e, "Failed to parse Gemini SSE chunk");
            return vec![];
        }
    };

    let mut deltas = Vec::new();

    if let Some(candidate) = chunk.candidates.into_iter().next() {
        if let Some(content) = candidate.content {
            for part in content.parts {
                if !part.text.is_empty() {
                    deltas.push(Ok(StreamDelta::TextDelta(part.text)));
                }
            }
        }

        if let Some(reason) = candidate.finish_reason {
            let stop = match reason.as_str() {
                "MAX_TOKENS" => StopReason::MaxTokens,
                _ => StopReason::EndTurn,
            };
            deltas.push(Ok(StreamDelta::Stop(stop)));
        }
    }

    if let Some(usage) = chunk.usage_metadata {
        deltas.push(Ok(StreamDelta::Usage {
            input_tokens: usage.prompt_token_count,
            output_tokens: usage.candidates_token_count,
        }));
    }

    deltas
}

impl LlmClient for GeminiClient {
    fn chat_stream(
        &self,
        config: &ModelConfig,
        messages: Vec<ChatMessage>,
    ) -> BoxFuture<'_, Result<BoxStream<'_, Result<StreamDelta>>>> {
        let config = config.clone();

        Box::pin(async move {
            let api_key = config
                .api_key
                .as_deref()
                .ok_or_else(|| SleuthError::Config("Gemini: api_key is required".into()))?;

            let base = config
                .base_url
                .as_deref()
                .unwrap_or(GEMINI_API_BASE)
                .trim_end_matches('/');
            let url = format!(
                "{}/models/{}:streamGenerateContent?alt=sse&key={}",
                base, config.model_id, api_key
            );

            let (system_instruction, contents) = convert_messages(messages);

            let body = GeminiRequest {
                contents,
                system_instruction,
                generation_config: Some(GenerationConfig {
                    max_output_tokens: Some(config.max_tokens),
                    temperature: if config.temperature > 0.0 {
                        Some(config.temperature)
                    } else {
                        None
                    },
                }),
            };

            let response = self
                .http
                .post(&url)
                .header("content-type", "application/json")
                .json(&body)
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
                .map(|event| futures::stream::iter(parse_gemini_chunk(event)))
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
    fn test_system_messages_become_instruction() {
        let (system, contents) = convert_messages(vec![
            ChatMessage::system("be terse"),
            ChatMessage::user("hello"),
            ChatMessage::assistant("hi"),
        ]);
        let system = system.unwrap();
        assert_eq!(system.parts[0].text, "be terse");
        assert_eq!(contents.len(), 2);
        assert_eq!(contents[0].role.as_deref(), Some("user"));
        assert_eq!(contents[1].role.as_deref(), Some("model"));
    }

    #[test]
    fn test_final_chunk_keeps_text() {
        let deltas = parse_gemini_chunk(event(
            r#"{"candidates":[{"content":{"parts":[{"text":"done."}],"role":"model"},"finishReason":"STOP"}],
               "usageMetadata":{"promptTokenCount":10,"candidatesTokenCount":3}}"#,
        ));
        assert_eq!(deltas.len(), 3);
        assert!(matches!(&deltas[0], Ok(StreamDelta::TextDelta(t)) if t == "done."));
        assert!(matches!(&deltas[1], Ok(StreamDelta::Stop(StopReason::EndTurn))));
        assert!(matches!(
            &deltas[2],
            Ok(StreamDelta::Usage {
                input_tokens: 10,
                output_tokens: 3
            })
        ));
    }

    #[test]
    fn test_malformed_chunk_is_skipped() {
        assert!(parse_gemini_chunk(event("{not json")).is_empty());
    }
}
