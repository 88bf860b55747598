use std::collections::VecDeque;
use std::sync::Mutex;

use futures::future::BoxFuture;
use futures::stream::BoxStream;

use sleuth_core::config::ModelConfig;
use sleuth_core::error::{Result, SleuthError};
use sleuth_core::traits::LlmClient;
use sleuth_core::types::*;

enum Scripted {
    Text(String),
    Error(String),
}

/// Scripted LLM. Answers are consumed in order; once the script runs out
/// the fallback answer (if any) is repeated.
#[derive(Default)]
pub struct MockLlm {
    script: Mutex<VecDeque<Scripted>>,
    fallback: Option<String>,
    requests: Mutex<Vec<Vec<ChatMessage>>>,
}

impl MockLlm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Always answers with `text`.
    pub fn always(text: &str) -> Self {
        Self {
            fallback: Some(text.to_string()),
            ..Self::default()
        }
    }

    pub fn with_text(self, text: &str) -> Self {
        self.script
            .lock()
            .unwrap()
            .push_back(Scripted::Text(text.to_string()));
        self
    }

    pub fn with_error(self, message: &str) -> Self {
        self.script
            .lock()
            .unwrap()
            .push_back(Scripted::Error(message.to_string()));
        self
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// Concatenated user content of the most recent request.
    pub fn last_prompt(&self) -> Option<String> {
        let requests = self.requests.lock().unwrap();
        requests.last().map(|messages| {
            messages
                .iter()
                .filter(|m| m.role == Role::User)
                .map(|m| m.content.as_str())
                .collect::<Vec<_>>()
                .join("\n")
        })
    }
}

impl LlmClient for MockLlm {
    fn chat_stream(
        &self,
        _config: &ModelConfig,
        messages: Vec<ChatMessage>,
    ) -> BoxFuture<'_, Result<BoxStream<'_, Result<StreamDelta>>>> {
        self.requests.lock().unwrap().push(messages);
        let next = self.script.lock().unwrap().pop_front();

        Box::pin(async move {
            let text = match next {
                Some(Scripted::Text(text)) => text,
                Some(Scripted::Error(message)) => return Err(SleuthError::LlmRequest(message)),
                None => self
                    .fallback
                    .clone()
                    .ok_or_else(|| SleuthError::LlmRequest("no scripted response".into()))?,
            };

            // Stream word by word so callers exercise delta accumulation
            let mut deltas: Vec<Result<StreamDelta>> = text
                .split_inclusive(' ')
                .map(|w| Ok(StreamDelta::TextDelta(w.to_string())))
                .collect();
            deltas.push(Ok(StreamDelta::Stop(StopReason::EndTurn)));

            Ok(Box::pin(futures::stream::iter(deltas)) as BoxStream<'_, Result<StreamDelta>>)
        })
    }
}
