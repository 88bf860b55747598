use std::path::PathBuf;

use chrono::Utc;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use sleuth_core::event::EventBus;
use sleuth_core::types::{EngineEvent, RunId};

/// JSONL run logger.
///
/// Subscribes to the EventBus and appends one JSON object per engine event
/// to `{log_dir}/{run_id}/{timestamp}.jsonl`. Lines are flushed as they are
/// written, so a crashed run still leaves a readable log.
pub struct RunLogger {
    log_dir: PathBuf,
}

#[derive(Debug, Serialize)]
struct LogEntry {
    timestamp: String,
    run_id: String,
    event_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    task_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<serde_json::Value>,
}

impl RunLogger {
    pub fn new(log_dir: PathBuf) -> Self {
        Self { log_dir }
    }

    /// Start the logger as a background task.
    ///
    /// The subscription is taken before this returns, so events published
    /// right after are not missed. The task writes until the run finishes,
    /// the bus closes, or `cancel` fires, and yields the log file path.
    pub fn spawn(
        self,
        event_bus: &EventBus,
        run_id: RunId,
        cancel: CancellationToken,
    ) -> JoinHandle<Option<PathBuf>> {
        let rx = event_bus.subscribe();
        tokio::spawn(self.write_events(rx, run_id, cancel))
    }

    async fn write_events(
        self,
        mut rx: broadcast::Receiver<EngineEvent>,
        run_id: RunId,
        cancel: CancellationToken,
    ) -> Option<PathBuf> {
        let run_dir = self.log_dir.join(&run_id.0);
        if let Err(e) = tokio::fs::create_dir_all(&run_dir).await {
            error!(error = %e, "Failed to create log directory");
            return None;
        }

        let timestamp = Utc::now().format("%Y%m%d_%H%M%S").to_string();
        let log_path = run_dir.join(format!("{timestamp}.jsonl"));

        let file = match tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .await
        {
            Ok(f) => f,
            Err(e) => {
                error!(error = %e, path = %log_path.display(), "Failed to open log file");
                return None;
            }
        };

        info!(path = %log_path.display(), "RunLogger started");
        let mut writer = tokio::io::BufWriter::new(file);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("RunLogger cancelled");
                    break;
                }
                result = rx.recv() => {
                    match result {
                        Ok(event) => {
                            if event.run_id() != &run_id {
                                continue;
                            }
                            let entry = event_to_entry(&event);
                            if let Ok(json) = serde_json::to_string(&entry) {
                                let line = format!("{json}\n");
                                if let Err(e) = writer.write_all(line.as_bytes()).await {
                                    error!(error = %e, "Failed to write log entry");
                                    break;
                                }
                                if let Err(e) = writer.flush().await {
                                    error!(error = %e, "Failed to flush log");
                                }
                            }

                            if matches!(event, EngineEvent::RunFinished { .. }) {
                                break;
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            debug!(skipped = n, "RunLogger lagged, skipped events");
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            debug!("EventBus closed, RunLogger stopping");
                            break;
                        }
                    }
                }
            }
        }

        writer.flush().await.ok();
        debug!(path = %log_path.display(), "RunLogger finished");
        Some(log_path)
    }
}

fn event_to_entry(event: &EngineEvent) -> LogEntry {
    let entry = |event_type, task_id: Option<String>, detail| LogEntry {
        timestamp: Utc::now().to_rfc3339(),
        run_id: event.run_id().to_string(),
        event_type,
        task_id,
        detail,
    };

    match event {
        EngineEvent::RunStarted {
            goal, total_tasks, ..
        } => entry(
            "run_started",
            None,
            Some(serde_json::json!({ "goal": truncate_str(goal, 200), "total_tasks": total_tasks })),
        ),
        EngineEvent::TaskDispatched {
            step,
            task_id,
            capability,
            ..
        } => entry(
            "task_dispatched",
            Some(task_id.to_string()),
            Some(serde_json::json!({ "step": step, "capability": capability })),
        ),
        EngineEvent::TaskCompleted {
            task_id,
            capability,
            evidence_count,
            elapsed_ms,
            ..
        } => entry(
            "task_completed",
            Some(task_id.to_string()),
            Some(serde_json::json!({
                "capability": capability,
                "evidence_count": evidence_count,
                "elapsed_ms": elapsed_ms,
            })),
        ),
        EngineEvent::TaskFailed {
            task_id,
            capability,
            error,
            ..
        } => entry(
            "task_failed",
            Some(task_id.to_string()),
            Some(serde_json::json!({ "capability": capability, "error": error })),
        ),
        EngineEvent::RunFinished {
            outcome,
            steps,
            completed,
            total_tasks,
            ..
        } => entry(
            "run_finished",
            None,
            Some(serde_json::json!({
                "outcome": outcome,
                "steps": steps,
                "completed": completed,
                "total_tasks": total_tasks,
            })),
        ),
    }
}

/// Truncate on a char boundary.
fn truncate_str(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use sleuth_core::types::{RunOutcome, TaskId};
    use sleuth_test_utils::scratch_dir;

    use super::*;

    #[test]
    fn test_entry_shape() {
        let event = EngineEvent::TaskFailed {
            run_id: RunId::from_str("r1"),
            task_id: TaskId::new("2"),
            capability: "TrendScraper".into(),
            error: "TrendScraper timed out after 5s".into(),
        };
        let json = serde_json::to_string(&event_to_entry(&event)).unwrap();
        assert!(json.contains("\"event_type\":\"task_failed\""));
        assert!(json.contains("\"task_id\":\"2\""));
        assert!(json.contains("timed out"));
    }

    #[test]
    fn test_run_events_skip_task_id() {
        let event = EngineEvent::RunStarted {
            run_id: RunId::from_str("r1"),
            goal: "g".into(),
            total_tasks: 0,
        };
        let json = serde_json::to_string(&event_to_entry(&event)).unwrap();
        assert!(!json.contains("task_id"));
    }

    #[tokio::test]
    async fn test_writes_jsonl_until_run_finished() {
        let dir = scratch_dir();
        let bus = EventBus::default();
        let run_id = RunId::from_str("run-1");

        let handle = RunLogger::new(dir.path().to_path_buf()).spawn(
            &bus,
            run_id.clone(),
            CancellationToken::new(),
        );

        bus.publish(EngineEvent::RunStarted {
            run_id: run_id.clone(),
            goal: "g".into(),
            total_tasks: 1,
        });
        // Other runs are ignored
        bus.publish(EngineEvent::RunStarted {
            run_id: RunId::from_str("other"),
            goal: "g".into(),
            total_tasks: 1,
        });
        bus.publish(EngineEvent::RunFinished {
            run_id: run_id.clone(),
            outcome: RunOutcome::Completed,
            steps: 1,
            completed: 1,
            total_tasks: 1,
        });

        let path = handle.await.unwrap().unwrap();
        let text = tokio::fs::read_to_string(&path).await.unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("run_started"));
        assert!(lines[1].contains("\"outcome\":\"completed\""));
    }

    #[tokio::test]
    async fn test_cancellation_stops_logger() {
        let dir = scratch_dir();
        let bus = EventBus::default();
        let cancel = CancellationToken::new();
        let handle =
            RunLogger::new(dir.path().to_path_buf()).spawn(&bus, RunId::from_str("r"), cancel.clone());

        cancel.cancel();
        assert!(handle.await.unwrap().is_some());
    }
}
