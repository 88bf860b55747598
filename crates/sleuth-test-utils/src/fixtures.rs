use sleuth_core::config::ModelConfig;
use sleuth_core::types::{Task, TaskId};

/// A collector task with no dependencies.
pub fn collector_task(id: &str, capability: &str) -> Task {
    Task::new(id, capability)
        .with_title(format!("Task {id}"))
        .with_description(format!("Research step {id}"))
}

/// A task that depends on `deps` and therefore routes to the synthesizer.
pub fn synthesis_task(id: &str, capability: &str, deps: &[&str]) -> Task {
    collector_task(id, capability).with_dependencies(deps.iter().copied())
}

pub fn ids(raw: &[&str]) -> Vec<TaskId> {
    raw.iter().map(|s| TaskId::new(*s)).collect()
}

pub fn test_model() -> ModelConfig {
    ModelConfig {
        provider: "mock".to_string(),
        model_id: "mock-model".to_string(),
        api_key: None,
        base_url: None,
        max_tokens: 256,
        temperature: 0.0,
        retry: None,
    }
}

/// A planner answer as it usually arrives: fenced and surrounded by prose.
pub const FENCED_PLAN: &str = r#"Here is the plan you asked for:
```json
{
  "research_goal": "Assess an AI code review assistant",
  "suggested_agents": ["CompetitorScout", "TrendScraper"],
  "tasks": [
    {"id": 1, "title": "Competitors", "description": "Find code review tools", "priority": "High", "depends_on": [], "assigned_agent": "CompetitorScout"},
    {"id": 2, "title": "Trends", "description": "Developer pain points in review", "priority": 2, "depends_on": [], "assigned_agent": "TrendScraper"},
    {"id": 3, "title": "Synthesis", "description": "Combine findings", "depends_on": [1, 2], "assigned_agent": "TrendScraper"}
  ],
  "expected_outputs": ["summaries"],
  "reasoning_notes": "Two collectors, then a roll-up."
}
```
Let me know if you need changes."#;

/// Fresh scratch directory for artifact and log tests.
pub fn scratch_dir() -> tempfile::TempDir {
    tempfile::tempdir().unwrap()
}
