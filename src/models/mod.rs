use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use uuid::Uuid;

/// A named stream source from the station catalog.
///
/// Stations are immutable once loaded; the core only ever reads them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Station {
    pub name: String,
    pub url: String,
    pub country: String,
    pub city: String,
    pub bitrate: Option<u32>,
    pub language: Option<String>,
}

/// Outcome classification for one capture attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Success,
    Failed,
    Timeout,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Success => "success",
            TaskStatus::Failed => "failed",
            TaskStatus::Timeout => "timeout",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "success" => Some(TaskStatus::Success),
            "failed" => Some(TaskStatus::Failed),
            "timeout" => Some(TaskStatus::Timeout),
            _ => None,
        }
    }
}

/// One capture attempt against one station for a bounded duration.
///
/// Created when a job fires (or a manual trigger occurs) and destroyed after
/// its result has been recorded; a task never outlives one execution attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingTask {
    pub id: Uuid,
    pub job_id: Option<Uuid>,
    pub station: Station,
    pub duration_secs: u32,
    pub output_path: PathBuf,
    pub created_at: DateTime<Utc>,
}

/// The outcome of exactly one [`RecordingTask`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_id: Uuid,
    pub station_name: String,
    pub status: TaskStatus,
    pub file_size: u64,
    /// Present iff status is not `Success`; truncated to a bounded length.
    pub error: Option<String>,
    pub elapsed_secs: f64,
    pub finished_at: DateTime<Utc>,
}

impl TaskResult {
    pub fn is_success(&self) -> bool {
        self.status == TaskStatus::Success
    }
}

/// Repeat rule for a schedulable job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RepeatRule {
    /// Fire once at `start_at` (or at the next tick when unset), then complete.
    Once { start_at: Option<DateTime<Utc>> },
    /// Fire on an interval expressed in minutes.
    ///
    /// Intervals of 60 minutes or more are matched on an hourly cadence
    /// (truncating to whole hours), shorter intervals on a minute cadence.
    /// Firings align to wall-clock buckets, not exact elapsed time.
    Interval { minutes: u32 },
}

impl RepeatRule {
    /// Cron expression implementing the bucketed cadence, `None` for one-shots.
    pub fn cron_expression(&self) -> Option<String> {
        match self {
            RepeatRule::Once { .. } => None,
            RepeatRule::Interval { minutes } => {
                if *minutes >= 60 {
                    let hours = minutes / 60;
                    if hours == 1 {
                        Some("0 0 * * * *".to_string())
                    } else {
                        Some(format!("0 0 */{} * * *", hours))
                    }
                } else if *minutes == 1 {
                    Some("0 * * * * *".to_string())
                } else {
                    Some(format!("0 */{} * * * *", minutes))
                }
            }
        }
    }

    pub fn describe(&self) -> String {
        match self {
            RepeatRule::Once { start_at: Some(at) } => {
                format!("once at {}", at.format("%Y-%m-%d %H:%M:%S UTC"))
            }
            RepeatRule::Once { start_at: None } => "once".to_string(),
            RepeatRule::Interval { minutes } => format!("every {} min", minutes),
        }
    }
}

/// What a job expands to when it fires.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobKind {
    /// One station, fixed duration.
    SingleStation { station: Station },
    /// A filtered slice of the catalog recorded as a concurrency-bounded batch.
    BulkSet {
        /// Restrict to one country; `None` records every catalogued station.
        country_filter: Option<String>,
        max_stations: Option<usize>,
        max_concurrent: usize,
        stagger_seconds: u64,
    },
}

impl JobKind {
    pub fn describe(&self) -> String {
        match self {
            JobKind::SingleStation { station } => station.name.clone(),
            JobKind::BulkSet { country_filter, .. } => match country_filter {
                Some(country) => format!("bulk:{}", country),
                None => "bulk:all".to_string(),
            },
        }
    }
}

/// A schedulable unit owned by the scheduler.
///
/// Mutated only through scheduler operations; once the active flag is
/// cleared (cancellation or one-shot completion) it never becomes true again.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingJob {
    pub id: Uuid,
    pub kind: JobKind,
    pub repeat: RepeatRule,
    pub duration_secs: u32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub last_fired_at: Option<DateTime<Utc>>,
}

/// Cached health state of a station from its most recent probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Online,
    Offline,
    Untested,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Online => "online",
            ConnectionState::Offline => "offline",
            ConnectionState::Untested => "untested",
        }
    }
}

/// One live entry per station name, overwritten on each probe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionStatus {
    pub station_name: String,
    pub station_url: String,
    pub country: String,
    pub city: String,
    pub state: ConnectionState,
    pub last_check: DateTime<Utc>,
    pub latency_secs: f64,
}

/// Per-country rollup used by the station overview.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CountryStatusSummary {
    pub total: usize,
    pub online: usize,
    pub offline: usize,
    pub untested: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StationStatusRow {
    pub name: String,
    pub country: String,
    pub city: String,
    pub url: String,
    pub state: ConnectionState,
    pub last_check: Option<DateTime<Utc>>,
}

/// Snapshot of catalog-wide connection health, computed read-only from the
/// catalog and the monitor's status table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StationOverview {
    pub total_stations: usize,
    pub online_stations: usize,
    pub offline_stations: usize,
    pub untested_stations: usize,
    pub by_country: HashMap<String, CountryStatusSummary>,
    pub detailed_status: Vec<StationStatusRow>,
}

/// Point-in-time copy of the running statistics counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatisticsSnapshot {
    pub total_recordings: u64,
    pub successful_recordings: u64,
    pub failed_recordings: u64,
    pub total_duration_secs: u64,
    pub last_recording: Option<DateTime<Utc>>,
}

/// A persisted recording row, as read back for display surfaces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingRecord {
    pub id: i64,
    pub station_name: String,
    pub station_url: String,
    pub country: Option<String>,
    pub city: Option<String>,
    pub duration_secs: u32,
    pub file_path: Option<String>,
    pub status: TaskStatus,
    pub timestamp: DateTime<Utc>,
    pub file_size: u64,
    pub error_message: Option<String>,
}

/// Result of an on-demand probe sweep over the whole catalog.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProbeSweepSummary {
    pub tested: usize,
    pub online: usize,
    pub offline: usize,
}
