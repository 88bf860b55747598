use std::collections::HashMap;
use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tracing::{debug, error, warn};

use sleuth_core::error::CapabilityError;
use sleuth_core::traits::Capability;
use sleuth_core::types::{CapabilityOutput, SharedContext, Task};

/// The three evidence collectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollectorKind {
    Competitor,
    Trend,
    Paper,
}

impl CollectorKind {
    pub const ALL: [CollectorKind; 3] = [Self::Competitor, Self::Trend, Self::Paper];

    /// Name planners use for this collector.
    pub fn canonical_name(self) -> &'static str {
        match self {
            Self::Competitor => "CompetitorScout",
            Self::Trend => "TrendScraper",
            Self::Paper => "TechPaperMiner",
        }
    }
}

impl fmt::Display for CollectorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.canonical_name())
    }
}

impl FromStr for CollectorKind {
    type Err = CapabilityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "competitorscout" | "competitor" => Ok(Self::Competitor),
            "trendscraper" | "trendsscraper" | "trend" => Ok(Self::Trend),
            "techpaperminer" | "paper" => Ok(Self::Paper),
            _ => Err(CapabilityError::Unroutable {
                requested: s.to_string(),
            }),
        }
    }
}

/// Which capability variant runs a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapabilityKind {
    Collector(CollectorKind),
    Synthesizer,
}

/// Synthesis routing rule: a task with prerequisites rolls up prior results
/// and goes to the synthesizer whatever its assigned capability says. A task
/// without prerequisites goes to the collector it names.
pub fn route(task: &Task) -> Result<CapabilityKind, CapabilityError> {
    if task.is_synthesis() {
        return Ok(CapabilityKind::Synthesizer);
    }
    task.assigned_capability
        .parse()
        .map(CapabilityKind::Collector)
}

/// Implementations behind each capability variant.
#[derive(Default, Clone)]
pub struct CapabilityRegistry {
    collectors: HashMap<CollectorKind, Arc<dyn Capability>>,
    synthesizer: Option<Arc<dyn Capability>>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_collector(mut self, kind: CollectorKind, capability: Arc<dyn Capability>) -> Self {
        self.collectors.insert(kind, capability);
        self
    }

    pub fn with_synthesizer(mut self, capability: Arc<dyn Capability>) -> Self {
        self.synthesizer = Some(capability);
        self
    }

    /// Registered collector kinds, in canonical order.
    pub fn collector_kinds(&self) -> Vec<CollectorKind> {
        CollectorKind::ALL
            .into_iter()
            .filter(|k| self.collectors.contains_key(k))
            .collect()
    }

    pub fn has_synthesizer(&self) -> bool {
        self.synthesizer.is_some()
    }

    /// Resolve the capability for a task. Unknown names and variants without
    /// a registered implementation are `Unroutable`.
    pub fn resolve(&self, task: &Task) -> Result<Arc<dyn Capability>, CapabilityError> {
        let kind = route(task)?;
        let found = match kind {
            CapabilityKind::Synthesizer => self.synthesizer.clone(),
            CapabilityKind::Collector(c) => self.collectors.get(&c).cloned(),
        };
        found.ok_or_else(|| {
            let requested = match kind {
                CapabilityKind::Synthesizer => "synthesizer".to_string(),
                CapabilityKind::Collector(c) => c.canonical_name().to_string(),
            };
            CapabilityError::Unroutable { requested }
        })
    }
}

/// Run one capability under its own timeout. A timeout becomes a
/// `CapabilityError::Timeout` and a panic a `CapabilityError::Failed`.
pub async fn invoke(
    capability: &dyn Capability,
    task: &Task,
    ctx: SharedContext<'_>,
) -> Result<CapabilityOutput, CapabilityError> {
    let timeout_secs = capability.timeout_secs();
    debug!(task_id = %task.id, capability = capability.name(), timeout_secs, "Invoking capability");

    let guarded = AssertUnwindSafe(async move { capability.run(task, ctx).await }).catch_unwind();

    match tokio::time::timeout(Duration::from_secs(timeout_secs), guarded).await {
        Ok(Ok(result)) => result,
        Ok(Err(payload)) => {
            let message = panic_message(payload.as_ref());
            error!(task_id = %task.id, capability = capability.name(), panic = %message, "Capability panicked");
            Err(CapabilityError::failed(
                capability.name(),
                format!("panicked: {message}"),
            ))
        }
        Err(_) => {
            warn!(task_id = %task.id, capability = capability.name(), timeout_secs, "Capability timed out");
            Err(CapabilityError::Timeout {
                capability: capability.name().to_string(),
                timeout_secs,
            })
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use sleuth_test_utils::{collector_task, synthesis_task, MockCapability};

    use super::*;

    #[test]
    fn test_names_and_aliases() {
        for (raw, kind) in [
            ("CompetitorScout", CollectorKind::Competitor),
            ("competitor", CollectorKind::Competitor),
            ("TrendScraper", CollectorKind::Trend),
            ("TrendsScraper", CollectorKind::Trend),
            (" trendscraper ", CollectorKind::Trend),
            ("TECHPAPERMINER", CollectorKind::Paper),
            ("paper", CollectorKind::Paper),
        ] {
            assert_eq!(raw.parse::<CollectorKind>().unwrap(), kind, "{raw}");
        }
        let err = "Nonexistent".parse::<CollectorKind>().unwrap_err();
        assert_eq!(err.kind(), "unroutable");
    }

    #[test]
    fn test_dependencies_route_to_synthesizer() {
        let task = synthesis_task("3", "CompetitorScout", &["1"]);
        assert_eq!(route(&task).unwrap(), CapabilityKind::Synthesizer);

        // Even an unknown name is irrelevant once the task has prerequisites
        let task = synthesis_task("4", "Nonexistent", &["1"]);
        assert_eq!(route(&task).unwrap(), CapabilityKind::Synthesizer);

        let task = collector_task("1", "TechPaperMiner");
        assert_eq!(
            route(&task).unwrap(),
            CapabilityKind::Collector(CollectorKind::Paper)
        );
    }

    #[test]
    fn test_resolve_missing_implementation() {
        let registry = CapabilityRegistry::new().with_collector(
            CollectorKind::Trend,
            Arc::new(MockCapability::succeeding("TrendScraper")),
        );
        assert_eq!(registry.collector_kinds(), vec![CollectorKind::Trend]);

        assert!(registry.resolve(&collector_task("1", "trend")).is_ok());

        let err = registry.resolve(&collector_task("2", "paper")).err().unwrap();
        assert_eq!(
            err,
            CapabilityError::Unroutable {
                requested: "TechPaperMiner".into()
            }
        );

        let err = registry
            .resolve(&synthesis_task("3", "TrendScraper", &["1"]))
            .err()
            .unwrap();
        assert_eq!(
            err,
            CapabilityError::Unroutable {
                requested: "synthesizer".into()
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_invoke_times_out() {
        let slow = MockCapability::slow("TrendScraper", Duration::from_secs(30)).with_timeout_secs(2);
        let task = collector_task("1", "TrendScraper");
        let ctx = SharedContext {
            goal: "g",
            summaries: &[],
            evidence: &[],
        };
        let err = invoke(&slow, &task, ctx).await.unwrap_err();
        assert_eq!(
            err,
            CapabilityError::Timeout {
                capability: "TrendScraper".into(),
                timeout_secs: 2
            }
        );
    }

    #[tokio::test]
    async fn test_invoke_turns_panic_into_failure() {
        let buggy = MockCapability::panicking("CompetitorScout", "collector bug");
        let task = collector_task("1", "CompetitorScout");
        let ctx = SharedContext {
            goal: "g",
            summaries: &[],
            evidence: &[],
        };
        let err = invoke(&buggy, &task, ctx).await.unwrap_err();
        assert_eq!(err.kind(), "capability");
        assert_eq!(
            err,
            CapabilityError::failed("CompetitorScout", "panicked: collector bug")
        );
    }
}
