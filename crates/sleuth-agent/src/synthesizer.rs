use futures::future::BoxFuture;
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use sleuth_core::error::CapabilityError;
use sleuth_core::traits::Capability;
use sleuth_core::types::*;
use sleuth_llm::LlmHandle;

pub const NAME: &str = "Synthesizer";

const SYSTEM_PROMPT: &str = "You are a research analyst. You write concise, well-structured \
reports that only use the research material you are given.";

/// Rolls up prior summaries and evidence into a narrative for a task that
/// depends on other tasks. Performs no lookups and produces no evidence.
pub struct Synthesizer {
    llm: Option<LlmHandle>,
    snippet_chars: usize,
    timeout_secs: u64,
}

impl Synthesizer {
    pub fn new(llm: Option<LlmHandle>) -> Self {
        Self {
            llm,
            snippet_chars: 200,
            timeout_secs: 120,
        }
    }

    pub fn with_snippet_chars(mut self, chars: usize) -> Self {
        self.snippet_chars = chars;
        self
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn build_prompt(&self, task: &Task, ctx: &SharedContext<'_>) -> String {
        let snippets: Vec<String> = ctx
            .evidence
            .iter()
            .map(|e| e.content.chars().take(self.snippet_chars).collect())
            .collect();

        format!(
            "Your task is to synthesize all the research collected so far to answer the \
objective in this task:\n{task}\n\n\
Research goal: {goal}\n\n\
Here are the summaries from the previous collection tasks:\n{summaries}\n\n\
Here are snippets from the raw documents:\n{snippets}\n\n\
Please generate the final report for this task now.",
            task = pretty_json(task),
            goal = ctx.goal,
            summaries = pretty_json(ctx.summaries),
            snippets = pretty_json(&snippets),
        )
    }
}

fn pretty_json<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "null".to_string())
}

/// Deterministic roll-up used without an LLM: one section per dependency
/// with its summary status and payload.
pub fn digest(task: &Task, ctx: &SharedContext<'_>) -> String {
    let heading = if task.title.is_empty() {
        task.id.as_str()
    } else {
        task.title.as_str()
    };
    let mut out = format!("# {heading}\n");
    if !task.description.is_empty() {
        out.push_str(&format!("\n{}\n", task.description));
    }

    for dep in &task.depends_on {
        out.push_str(&format!("\n## Task {dep}\n"));
        let found: Vec<&Summary> = ctx.summaries.iter().filter(|s| &s.task_id == dep).collect();
        if found.is_empty() {
            out.push_str("No summary recorded.\n");
        }
        for summary in found {
            match &summary.payload {
                SummaryPayload::Ok(payload) => {
                    let body = match payload {
                        Value::String(s) => s.clone(),
                        other => serde_json::to_string_pretty(other).unwrap_or_default(),
                    };
                    out.push_str(&format!("{} (ok):\n{}\n", summary.capability_name, body));
                }
                SummaryPayload::Failed(failure) => out.push_str(&format!(
                    "{} (failed, {}): {}\n",
                    summary.capability_name, failure.kind, failure.message
                )),
            }
        }
    }

    out.push_str(&format!("\n{} evidence records collected.\n", ctx.evidence.len()));
    out
}

impl Capability for Synthesizer {
    fn name(&self) -> &str {
        NAME
    }

    fn timeout_secs(&self) -> u64 {
        self.timeout_secs
    }

    fn run<'a>(
        &'a self,
        task: &'a Task,
        ctx: SharedContext<'a>,
    ) -> BoxFuture<'a, Result<CapabilityOutput, CapabilityError>> {
        Box::pin(async move {
            info!(
                task_id = %task.id,
                summaries = ctx.summaries.len(),
                evidence = ctx.evidence.len(),
                "Synthesizing"
            );

            let narrative = match &self.llm {
                Some(llm) => llm
                    .complete(SYSTEM_PROMPT, self.build_prompt(task, &ctx))
                    .await
                    .map_err(|e| CapabilityError::failed(NAME, e.to_string()))?,
                None => {
                    warn!(task_id = %task.id, "No LLM configured; writing deterministic digest");
                    digest(task, &ctx)
                }
            };

            Ok(CapabilityOutput::new(Value::String(narrative), vec![]))
        })
    }
}
