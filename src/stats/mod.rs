//! Running recording statistics
//!
//! Counters are monotonically increased from task executor completions, which
//! may happen concurrently across groups and jobs, so every update is a plain
//! atomic increment. Readers take point-in-time snapshots.

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use crate::models::{StatisticsSnapshot, TaskStatus};

#[derive(Debug, Default)]
pub struct Statistics {
    total_recordings: AtomicU64,
    successful_recordings: AtomicU64,
    failed_recordings: AtomicU64,
    total_duration_secs: AtomicU64,
    last_recording: RwLock<Option<DateTime<Utc>>>,
}

impl Statistics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed counters from persisted history. Called once at startup, before
    /// any executor can complete; afterwards the in-memory state is
    /// authoritative.
    pub fn seed(&self, snapshot: &StatisticsSnapshot) {
        self.total_recordings
            .store(snapshot.total_recordings, Ordering::Relaxed);
        self.successful_recordings
            .store(snapshot.successful_recordings, Ordering::Relaxed);
        self.failed_recordings
            .store(snapshot.failed_recordings, Ordering::Relaxed);
        self.total_duration_secs
            .store(snapshot.total_duration_secs, Ordering::Relaxed);
        if let Ok(mut last) = self.last_recording.write() {
            *last = snapshot.last_recording;
        }
    }

    /// Record one completed task. Timeouts count as failures here; the
    /// distinct status only matters for logs and the persisted record.
    pub fn record(&self, status: TaskStatus, duration_secs: u32) {
        self.total_recordings.fetch_add(1, Ordering::Relaxed);
        match status {
            TaskStatus::Success => {
                self.successful_recordings.fetch_add(1, Ordering::Relaxed);
                self.total_duration_secs
                    .fetch_add(u64::from(duration_secs), Ordering::Relaxed);
            }
            TaskStatus::Failed | TaskStatus::Timeout => {
                self.failed_recordings.fetch_add(1, Ordering::Relaxed);
            }
        }
        if let Ok(mut last) = self.last_recording.write() {
            *last = Some(Utc::now());
        }
    }

    pub fn snapshot(&self) -> StatisticsSnapshot {
        StatisticsSnapshot {
            total_recordings: self.total_recordings.load(Ordering::Relaxed),
            successful_recordings: self.successful_recordings.load(Ordering::Relaxed),
            failed_recordings: self.failed_recordings.load(Ordering::Relaxed),
            total_duration_secs: self.total_duration_secs.load(Ordering::Relaxed),
            last_recording: self.last_recording.read().ok().and_then(|last| *last),
        }
    }
}
