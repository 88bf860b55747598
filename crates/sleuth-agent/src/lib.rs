pub mod artifacts;
pub mod graph;
pub mod plan;
pub mod router;
pub mod run_log;
pub mod synthesizer;

pub use artifacts::{write_artifacts, ArtifactPaths};
pub use graph::{ExecutionState, RunReport, RunResult, Scheduler, StateDelta, StepRecord, TaskGraph};
pub use plan::{fallback_plan, Plan, ResearchIntent};
pub use router::{route, CapabilityKind, CapabilityRegistry, CollectorKind};
pub use run_log::RunLogger;
pub use synthesizer::Synthesizer;

use std::sync::Arc;

use sleuth_collectors::CollectorSet;
use sleuth_core::config::AppConfig;
use sleuth_llm::LlmHandle;

/// Registry wired with the live collectors and the synthesizer.
pub fn registry_from_config(config: &AppConfig, llm: Option<LlmHandle>) -> CapabilityRegistry {
    let collectors = CollectorSet::from_config(config, llm.clone());
    let synthesizer = Synthesizer::new(llm)
        .with_snippet_chars(config.engine.snippet_chars)
        .with_timeout_secs(config.timeout_for(synthesizer::NAME));

    CapabilityRegistry::new()
        .with_collector(CollectorKind::Competitor, Arc::new(collectors.competitor))
        .with_collector(CollectorKind::Trend, Arc::new(collectors.trend))
        .with_collector(CollectorKind::Paper, Arc::new(collectors.paper))
        .with_synthesizer(Arc::new(synthesizer))
}
