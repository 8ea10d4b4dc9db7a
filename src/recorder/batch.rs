//! Worker pool / batch runner
//!
//! Executes many capture tasks under a bounded concurrency limit. Tasks are
//! partitioned into groups of `max_concurrent`; a group must finish before
//! the next one starts, which keeps peak concurrency at or below the cap at
//! all times. Every submitted task yields exactly one result: a task whose
//! spawned execution aborts is converted into a failed result rather than
//! dropped.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::TaskExecutor;
use crate::models::{RecordingTask, TaskResult, TaskStatus};

#[derive(Clone)]
pub struct BatchRunner {
    executor: Arc<TaskExecutor>,
}

impl BatchRunner {
    pub fn new(executor: Arc<TaskExecutor>) -> Self {
        Self { executor }
    }

    pub fn executor(&self) -> Arc<TaskExecutor> {
        self.executor.clone()
    }

    /// Run a batch of tasks in sequential groups of `max_concurrent`,
    /// sleeping `stagger_seconds` between groups when staggering is
    /// requested.
    pub async fn run_batch(
        &self,
        tasks: Vec<RecordingTask>,
        max_concurrent: usize,
        stagger_seconds: u64,
    ) -> Vec<TaskResult> {
        if tasks.is_empty() {
            return Vec::new();
        }

        let max_concurrent = max_concurrent.max(1);
        let total_groups = tasks.len().div_ceil(max_concurrent);
        let mut results = Vec::with_capacity(tasks.len());

        for (group_index, group) in tasks.chunks(max_concurrent).enumerate() {
            debug!(
                "Dispatching group {}/{} ({} tasks)",
                group_index + 1,
                total_groups,
                group.len()
            );

            let handles: Vec<(RecordingTask, tokio::task::JoinHandle<TaskResult>)> = group
                .iter()
                .map(|task| {
                    let executor = self.executor.clone();
                    let spawned = task.clone();
                    let handle = tokio::spawn(async move { executor.execute(&spawned).await });
                    (task.clone(), handle)
                })
                .collect();

            for (task, handle) in handles {
                match handle.await {
                    Ok(result) => results.push(result),
                    // A panicked or aborted execution still owes a result
                    Err(e) => results.push(aborted_result(&task, &e.to_string())),
                }
            }

            if stagger_seconds > 0 && group_index + 1 < total_groups {
                debug!("Staggering {}s before next group", stagger_seconds);
                tokio::time::sleep(Duration::from_secs(stagger_seconds)).await;
            }
        }

        let successful = results.iter().filter(|r| r.is_success()).count();
        info!(
            "Batch complete: {}/{} tasks successful",
            successful,
            results.len()
        );

        results
    }
}

fn aborted_result(task: &RecordingTask, detail: &str) -> TaskResult {
    TaskResult {
        task_id: task.id,
        station_name: task.station.name.clone(),
        status: TaskStatus::Failed,
        file_size: 0,
        error: Some(format!("task aborted: {}", detail)),
        elapsed_secs: 0.0,
        finished_at: Utc::now(),
    }
}
