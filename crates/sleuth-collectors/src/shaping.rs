//! Turning collected evidence into a structured summary payload.

use std::sync::Arc;

use futures::future::join_all;
use serde_json::Value;
use tracing::warn;

use sleuth_core::error::{CapabilityError, Result};
use sleuth_core::types::{Evidence, SharedContext, Task};
use sleuth_llm::LlmHandle;

use crate::fetch::truncate_chars;
use crate::sources::FeedSource;

/// Characters of each evidence record included in a shaping prompt.
const DIGEST_CHARS: usize = 600;

/// The text a collector researches: the task description, or the run goal
/// when the planner left the description empty.
pub fn research_topic<'a>(
    capability: &str,
    task: &'a Task,
    ctx: &SharedContext<'a>,
) -> std::result::Result<&'a str, CapabilityError> {
    [task.description.trim(), ctx.goal.trim()]
        .into_iter()
        .find(|s| !s.is_empty())
        .ok_or_else(|| {
            CapabilityError::failed(capability, format!("task {} has no description", task.id))
        })
}

/// Query every feed concurrently. Failed feeds are logged and skipped.
pub async fn gather_feeds(feeds: &[Arc<dyn FeedSource>], query: &str) -> Vec<Evidence> {
    let results = join_all(feeds.iter().map(|feed| feed.fetch(query))).await;

    let mut evidence = Vec::new();
    for (feed, result) in feeds.iter().zip(results) {
        match result {
            Ok(records) => evidence.extend(records),
            Err(e) => warn!(origin = feed.origin(), error = %e, "Feed lookup failed"),
        }
    }
    evidence
}

/// Compact numbered listing of evidence for a prompt.
pub fn evidence_digest(evidence: &[Evidence]) -> String {
    if evidence.is_empty() {
        return "(no evidence was collected)".to_string();
    }
    evidence
        .iter()
        .enumerate()
        .map(|(i, ev)| {
            let title = ev
                .metadata
                .get("title")
                .and_then(|v| v.as_str())
                .unwrap_or("");
            format!(
                "[{}] ({}) {} <{}>\n{}",
                i + 1,
                ev.origin().unwrap_or("unknown"),
                title,
                ev.source().unwrap_or(""),
                truncate_chars(&ev.content, DIGEST_CHARS)
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Strip Markdown fences and pull the outermost JSON array or object out of
/// free text.
pub fn extract_json(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    let unfenced = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .map(|rest| rest.trim_end().trim_end_matches("```"))
        .unwrap_or(trimmed);

    if let Ok(v) = serde_json::from_str(unfenced.trim()) {
        return Some(v);
    }

    // Whichever bracket opens first is the outermost value
    let mut candidates: Vec<(usize, &str)> = [('{', '}'), ('[', ']')]
        .into_iter()
        .filter_map(|(open, close)| {
            let start = unfenced.find(open)?;
            let end = unfenced.rfind(close)?;
            (end > start).then(|| (start, &unfenced[start..=end]))
        })
        .collect();
    candidates.sort_by_key(|(start, _)| *start);
    candidates
        .into_iter()
        .find_map(|(_, candidate)| serde_json::from_str(candidate).ok())
}

/// Pull a list of records out of a model answer: either a bare array or an
/// object holding the array under `list_key`. Items lacking `required` are
/// dropped and `score_key`, if given, is clamped to 0-100. `None` when
/// nothing usable remains.
pub fn parse_records(
    text: &str,
    list_key: &str,
    required: &str,
    score_key: Option<&str>,
) -> Option<Vec<Value>> {
    let items = match extract_json(text)? {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove(list_key) {
            Some(Value::Array(items)) => items,
            _ => return None,
        },
        _ => return None,
    };

    let records: Vec<Value> = items
        .into_iter()
        .filter(|item| {
            item.get(required)
                .and_then(|v| v.as_str())
                .is_some_and(|s| !s.trim().is_empty())
        })
        .map(|mut item| {
            if let Some(key) = score_key {
                if let Some(score) = item.get(key).and_then(|v| v.as_f64()) {
                    item[key] = Value::from(score.round().clamp(0.0, 100.0) as i64);
                }
            }
            item
        })
        .collect();

    (!records.is_empty()).then_some(records)
}

/// Ask the model for a record list. `Ok(None)` when the answer is unusable;
/// an error only when the LLM call itself fails.
pub async fn shape_records(
    llm: &LlmHandle,
    system: &str,
    prompt: String,
    list_key: &str,
    required: &str,
    score_key: Option<&str>,
) -> Result<Option<Vec<Value>>> {
    let answer = llm.complete(system, prompt).await?;
    let records = parse_records(&answer, list_key, required, score_key);
    if records.is_none() {
        warn!(
            list_key,
            answer_len = answer.len(),
            "Model answer had no usable records"
        );
    }
    Ok(records)
}
