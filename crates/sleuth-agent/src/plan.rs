use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, info};

use sleuth_core::error::{Result, SleuthError};
use sleuth_core::types::Task;

use crate::graph::TaskGraph;
use crate::router::CollectorKind;

/// A research plan as produced by a planner.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    #[serde(default)]
    pub research_goal: String,
    #[serde(default)]
    pub suggested_agents: Vec<String>,
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub expected_outputs: Vec<String>,
    #[serde(default)]
    pub reasoning_notes: String,
}

impl Plan {
    /// Parse planner output: Markdown fences and surrounding prose are
    /// dropped, then the outermost `{...}` object is decoded.
    pub fn parse_lenient(text: &str) -> Result<Self> {
        let body = outermost_object(text)
            .ok_or_else(|| SleuthError::InvalidPlan("no JSON object in planner output".into()))?;
        let plan: Plan = serde_json::from_str(body)
            .map_err(|e| SleuthError::InvalidPlan(e.to_string()))?;
        debug!(tasks = plan.tasks.len(), "Parsed plan");
        Ok(plan)
    }

    /// Validate the tasks into a graph.
    pub fn graph(&self) -> Result<TaskGraph> {
        TaskGraph::new(self.tasks.clone())
    }
}

fn outermost_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// Parsed user intent, the input of the deterministic planner.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResearchIntent {
    #[serde(default)]
    pub idea: String,
    #[serde(default, deserialize_with = "keyword_list")]
    pub tech_keywords: Vec<String>,
    #[serde(default)]
    pub raw_query: String,
}

impl ResearchIntent {
    /// Intent built straight from a free-text goal.
    pub fn from_goal(goal: &str, keywords: &[String]) -> Self {
        Self {
            idea: goal.trim().to_string(),
            tech_keywords: keywords.to_vec(),
            raw_query: goal.to_string(),
        }
    }
}

/// Accepts `["AI", "NLP"]` or `"AI, NLP"`.
fn keyword_list<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Vec<String>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        List(Vec<String>),
        Csv(String),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::List(list) => list,
        Raw::Csv(csv) => split_keywords(&csv),
    })
}

pub fn split_keywords(csv: &str) -> Vec<String> {
    csv.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

const PAPER_KEYWORDS: [&str; 4] = ["ai", "machine learning", "nlp", "llm"];

/// Deterministic plan used when no planner model is available.
///
/// Papers are mined only for AI-flavoured ideas and competitors only when
/// the query asks for them; trends are always collected. Every task stands
/// alone, so nothing is routed to the synthesizer.
pub fn fallback_plan(intent: &ResearchIntent) -> Plan {
    let mut kinds = Vec::new();
    if intent.tech_keywords.iter().any(|k| {
        let k = k.trim().to_lowercase();
        PAPER_KEYWORDS.iter().any(|p| *p == k)
    }) {
        kinds.push(CollectorKind::Paper);
    }
    if intent.raw_query.to_lowercase().contains("competitor") {
        kinds.push(CollectorKind::Competitor);
    }
    kinds.push(CollectorKind::Trend);

    let topic = if intent.idea.trim().is_empty() {
        intent.raw_query.trim()
    } else {
        intent.idea.trim()
    };

    let tasks = kinds
        .iter()
        .enumerate()
        .map(|(i, kind)| {
            let mut task = Task::new((i + 1).to_string(), kind.canonical_name())
                .with_title(format!("{} Task", kind.canonical_name()))
                .with_description(topic);
            task.priority = Some(serde_json::Value::from(i + 1));
            task
        })
        .collect();

    let suggested_agents: Vec<String> = kinds.iter().map(|k| k.canonical_name().to_string()).collect();
    info!(agents = ?suggested_agents, "Built fallback plan");

    Plan {
        research_goal: "Generate initial market, competitor, and tech insights.".to_string(),
        suggested_agents,
        tasks,
        expected_outputs: vec![
            "raw_docs".to_string(),
            "summaries".to_string(),
            "trend_data".to_string(),
        ],
        reasoning_notes: "Fallback deterministic plan.".to_string(),
    }
}
