//! Task executor
//!
//! Runs one capture task to completion under a hard deadline and normalizes
//! every possible outcome into a [`TaskResult`]. Nothing escapes this
//! boundary: tool failures, timeouts and persistence problems all end up as
//! data or log lines, never as errors propagating into the batch loop.

use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

use super::CaptureTool;
use crate::config::RecordingConfig;
use crate::database::Database;
use crate::models::{RecordingTask, TaskResult, TaskStatus};
use crate::stats::Statistics;

pub struct TaskExecutor {
    capture: Arc<dyn CaptureTool>,
    database: Database,
    stats: Arc<Statistics>,
    /// Grace period on top of the requested duration before the task is
    /// declared timed out; the capture tool needs time to finalize output.
    capture_overhead: Duration,
    max_error_length: usize,
}

impl TaskExecutor {
    pub fn new(
        capture: Arc<dyn CaptureTool>,
        database: Database,
        stats: Arc<Statistics>,
        config: &RecordingConfig,
    ) -> Self {
        Self {
            capture,
            database,
            stats,
            capture_overhead: Duration::from_secs(config.capture_overhead_secs),
            max_error_length: config.max_error_length,
        }
    }

    /// Execute one task and report its outcome.
    ///
    /// Bounded by `task.duration + capture_overhead`. The returned result is
    /// the only channel for failures; statistics and the durable log are
    /// updated as side effects before returning.
    pub async fn execute(&self, task: &RecordingTask) -> TaskResult {
        let deadline =
            Duration::from_secs(u64::from(task.duration_secs)) + self.capture_overhead;
        let started = Instant::now();

        let outcome = tokio::time::timeout(deadline, self.capture.capture(task)).await;

        let (status, file_size, error) = match outcome {
            Ok(Ok(output)) => (TaskStatus::Success, output.file_size, None),
            Ok(Err(e)) => (
                TaskStatus::Failed,
                0,
                Some(self.truncate_error(&e.to_string())),
            ),
            Err(_) => (
                TaskStatus::Timeout,
                0,
                Some(format!(
                    "capture exceeded the {}s execution deadline",
                    deadline.as_secs()
                )),
            ),
        };

        let result = TaskResult {
            task_id: task.id,
            station_name: task.station.name.clone(),
            status,
            file_size,
            error,
            elapsed_secs: started.elapsed().as_secs_f64(),
            finished_at: Utc::now(),
        };

        match status {
            TaskStatus::Success => info!(
                "Recorded '{}' ({} bytes in {:.1}s)",
                task.station.name, result.file_size, result.elapsed_secs
            ),
            TaskStatus::Timeout => warn!(
                "Recording of '{}' timed out after {:.1}s",
                task.station.name, result.elapsed_secs
            ),
            TaskStatus::Failed => warn!(
                "Recording of '{}' failed: {}",
                task.station.name,
                result.error.as_deref().unwrap_or("unknown error")
            ),
        }

        self.stats.record(status, task.duration_secs);

        // Losing the history row is acceptable, failing the capture is not
        if let Err(e) = self.database.record_recording(task, &result).await {
            error!(
                "Failed to persist recording result for '{}': {}",
                task.station.name, e
            );
        }

        result
    }

    fn truncate_error(&self, message: &str) -> String {
        if message.len() <= self.max_error_length {
            message.to_string()
        } else {
            let mut end = self.max_error_length;
            while !message.is_char_boundary(end) {
                end -= 1;
            }
            message[..end].to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, DatabaseConfig};
    use crate::errors::CaptureError;
    use crate::models::Station;
    use crate::recorder::CaptureOutput;
    use async_trait::async_trait;
    use std::path::PathBuf;
    use uuid::Uuid;

    /// Capture double: sleeps for the task's duration, then succeeds or
    /// fails according to the configured behavior.
    pub(crate) struct FakeCapture {
        pub delay: Duration,
        pub behavior: FakeBehavior,
    }

    pub(crate) enum FakeBehavior {
        Succeed { file_size: u64 },
        Fail { stderr: String },
    }

    #[async_trait]
    impl CaptureTool for FakeCapture {
        async fn capture(&self, _task: &RecordingTask) -> Result<CaptureOutput, CaptureError> {
            tokio::time::sleep(self.delay).await;
            match &self.behavior {
                FakeBehavior::Succeed { file_size } => Ok(CaptureOutput {
                    file_size: *file_size,
                }),
                FakeBehavior::Fail { stderr } => Err(CaptureError::ToolFailed {
                    status: 1,
                    stderr: stderr.clone(),
                }),
            }
        }
    }

    async fn memory_database() -> Database {
        let database = Database::new(&DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: Some(1),
        })
        .await
        .unwrap();
        database.migrate().await.unwrap();
        database
    }

    fn task(duration_secs: u32) -> RecordingTask {
        RecordingTask {
            id: Uuid::new_v4(),
            job_id: None,
            station: Station {
                name: "Radio Cairo".to_string(),
                url: "http://streams.example.com/cairo".to_string(),
                country: "Egypt".to_string(),
                city: "Cairo".to_string(),
                bitrate: None,
                language: None,
            },
            duration_secs,
            output_path: PathBuf::from("recordings/Egypt/Cairo/test.mp3"),
            created_at: Utc::now(),
        }
    }

    fn executor_with(capture: Arc<dyn CaptureTool>, database: Database) -> TaskExecutor {
        let mut recording = Config::default().recording;
        // Tight deadline so timeout paths stay fast in tests
        recording.capture_overhead_secs = 1;
        TaskExecutor::new(capture, database, Arc::new(Statistics::new()), &recording)
    }

    #[tokio::test]
    async fn test_successful_capture_reports_size() {
        let capture = Arc::new(FakeCapture {
            delay: Duration::from_millis(10),
            behavior: FakeBehavior::Succeed { file_size: 48_000 },
        });
        let executor = executor_with(capture, memory_database().await);

        let result = executor.execute(&task(0)).await;
        assert_eq!(result.status, TaskStatus::Success);
        assert_eq!(result.file_size, 48_000);
        assert!(result.error.is_none());
    }

    #[tokio::test]
    async fn test_tool_failure_is_a_failed_result() {
        let capture = Arc::new(FakeCapture {
            delay: Duration::from_millis(10),
            behavior: FakeBehavior::Fail {
                stderr: "Connection refused".to_string(),
            },
        });
        let executor = executor_with(capture, memory_database().await);

        let result = executor.execute(&task(0)).await;
        assert_eq!(result.status, TaskStatus::Failed);
        assert_eq!(result.file_size, 0);
        assert!(result.error.as_deref().unwrap().contains("Connection refused"));
    }

    #[tokio::test]
    async fn test_deadline_exceeded_is_timeout_not_failed() {
        let capture = Arc::new(FakeCapture {
            delay: Duration::from_secs(5),
            behavior: FakeBehavior::Succeed { file_size: 1 },
        });
        let executor = executor_with(capture, memory_database().await);

        // duration 0 + 1s overhead: the 5s capture overruns the deadline
        let result = executor.execute(&task(0)).await;
        assert_eq!(result.status, TaskStatus::Timeout);
        assert!(result.error.is_some());
    }

    #[tokio::test]
    async fn test_error_detail_is_truncated() {
        let capture = Arc::new(FakeCapture {
            delay: Duration::from_millis(1),
            behavior: FakeBehavior::Fail {
                stderr: "x".repeat(5000),
            },
        });
        let executor = executor_with(capture, memory_database().await);

        let result = executor.execute(&task(0)).await;
        assert!(result.error.unwrap().len() <= Config::default().recording.max_error_length);
    }

    #[tokio::test]
    async fn test_outcome_lands_in_statistics_and_store() {
        let database = memory_database().await;
        let stats = Arc::new(Statistics::new());
        let capture = Arc::new(FakeCapture {
            delay: Duration::from_millis(1),
            behavior: FakeBehavior::Succeed { file_size: 100 },
        });
        let executor = TaskExecutor::new(
            capture,
            database.clone(),
            stats.clone(),
            &Config::default().recording,
        );

        executor.execute(&task(0)).await;

        assert_eq!(stats.snapshot().successful_recordings, 1);
        assert_eq!(database.recent_recordings(10).await.unwrap().len(), 1);
    }
}
