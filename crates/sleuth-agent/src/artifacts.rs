use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::info;

use sleuth_core::error::Result;

use crate::graph::RunResult;

/// Files written for one run.
#[derive(Debug, Clone)]
pub struct ArtifactPaths {
    pub dir: PathBuf,
    pub summaries: PathBuf,
    pub evidence: PathBuf,
    pub run: PathBuf,
}

/// Write `summaries.json`, `evidence.json` and `run.json` into
/// `{output_dir}/{run_id}/`, creating directories as needed.
pub async fn write_artifacts(output_dir: &Path, result: &RunResult) -> Result<ArtifactPaths> {
    let dir = output_dir.join(&result.report.run_id.0);
    tokio::fs::create_dir_all(&dir).await?;

    let paths = ArtifactPaths {
        summaries: dir.join("summaries.json"),
        evidence: dir.join("evidence.json"),
        run: dir.join("run.json"),
        dir,
    };

    write_json(&paths.summaries, result.state.summaries()).await?;
    write_json(&paths.evidence, result.state.evidence()).await?;
    write_json(&paths.run, &result.report).await?;

    info!(
        dir = %paths.dir.display(),
        summaries = result.state.summaries().len(),
        evidence = result.state.evidence().len(),
        "Run artifacts written"
    );
    Ok(paths)
}

async fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    tokio::fs::write(path, json).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use sleuth_core::types::{Evidence, RunId, Summary};
    use sleuth_test_utils::{collector_task, scratch_dir, MockCapability};

    use super::*;
    use crate::graph::{Scheduler, TaskGraph};
    use crate::router::{CapabilityRegistry, CollectorKind};

    #[tokio::test]
    async fn test_writes_three_files() {
        let graph = TaskGraph::new(vec![collector_task("1", "TrendScraper")]).unwrap();
        let registry = CapabilityRegistry::new().with_collector(
            CollectorKind::Trend,
            Arc::new(MockCapability::succeeding("TrendScraper").with_evidence(2)),
        );
        let result = Scheduler::new(graph, registry)
            .with_run_id(RunId::from_str("run-7"))
            .run("goal")
            .await
            .unwrap();

        let out = scratch_dir();
        let nested = out.path().join("data");
        let paths = write_artifacts(&nested, &result).await.unwrap();
        assert_eq!(paths.dir, nested.join("run-7"));

        let summaries: Vec<Summary> =
            serde_json::from_str(&std::fs::read_to_string(&paths.summaries).unwrap()).unwrap();
        assert_eq!(summaries.len(), 1);

        let evidence: Vec<Evidence> =
            serde_json::from_str(&std::fs::read_to_string(&paths.evidence).unwrap()).unwrap();
        assert_eq!(evidence.len(), 2);

        let run: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&paths.run).unwrap()).unwrap();
        assert_eq!(run["outcome"], "completed");
        assert_eq!(run["completed"], 1);
    }
}
