//! Recording scheduler
//!
//! Owns the job registry and fires jobs according to their repeat rules.
//! Register and cancel serialize against the tick scan through the registry
//! lock; due jobs are cloned out and fired with the lock released, so a slow
//! batch never blocks registration. Interval cadence is matched with cron
//! schedules on minute or hour buckets, which aligns firings to wall-clock
//! boundaries rather than exact elapsed time.

use chrono::{DateTime, Utc};
use cron::Schedule;
use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::{interval, Duration};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::catalog::StationCatalog;
use crate::config::SchedulerConfig;
use crate::database::Database;
use crate::errors::AppError;
use crate::models::{JobKind, RecordingJob, RecordingTask, RepeatRule};
use crate::recorder::capture::output_path_for;
use crate::recorder::BatchRunner;

/// Decide whether a job's timer condition is satisfied at `now`.
fn job_is_due(job: &RecordingJob, now: DateTime<Utc>) -> bool {
    if !job.is_active {
        return false;
    }
    match &job.repeat {
        RepeatRule::Once { start_at } => {
            job.last_fired_at.is_none() && now >= start_at.unwrap_or(job.created_at)
        }
        RepeatRule::Interval { .. } => {
            let Some(expression) = job.repeat.cron_expression() else {
                return false;
            };
            let schedule = match Schedule::from_str(&expression) {
                Ok(schedule) => schedule,
                Err(e) => {
                    warn!("Job {} has an unusable cadence ({}): {}", job.id, expression, e);
                    return false;
                }
            };
            let anchor = job.last_fired_at.unwrap_or(job.created_at);
            schedule
                .after(&anchor)
                .next()
                .map_or(false, |next_fire| now >= next_fire)
        }
    }
}

pub struct SchedulerService {
    registry: Arc<RwLock<HashMap<Uuid, RecordingJob>>>,
    catalog: Arc<StationCatalog>,
    batch: BatchRunner,
    database: Database,
    config: SchedulerConfig,
    recordings_root: PathBuf,
    running: Arc<AtomicBool>,
}

impl SchedulerService {
    pub fn new(
        catalog: Arc<StationCatalog>,
        database: Database,
        batch: BatchRunner,
        config: SchedulerConfig,
        recordings_root: PathBuf,
        running: Arc<AtomicBool>,
    ) -> Self {
        Self {
            registry: Arc::new(RwLock::new(HashMap::new())),
            catalog,
            batch,
            database,
            config,
            recordings_root,
            running,
        }
    }

    /// Validate and register a job, arming it for the next matching tick.
    pub async fn register_job(
        &self,
        mut kind: JobKind,
        repeat: RepeatRule,
        duration_secs: u32,
    ) -> Result<Uuid, AppError> {
        if duration_secs == 0 {
            return Err(AppError::validation("Recording duration must be at least 1 second"));
        }

        if let RepeatRule::Interval { minutes } = &repeat {
            if *minutes < self.config.min_interval_minutes {
                return Err(AppError::validation(format!(
                    "Recording interval must be at least {} minute(s), got {}",
                    self.config.min_interval_minutes, minutes
                )));
            }
        }

        if let JobKind::BulkSet {
            country_filter,
            max_stations,
            max_concurrent,
            stagger_seconds,
        } = &mut kind
        {
            if *max_concurrent == 0 {
                return Err(AppError::validation(
                    "Bulk concurrency limit must be at least 1",
                ));
            }
            let matching = self
                .catalog
                .filter_stations(country_filter.as_deref(), *max_stations);
            if matching.is_empty() {
                return Err(AppError::validation(format!(
                    "No stations match filter '{}'",
                    country_filter.as_deref().unwrap_or("all countries")
                )));
            }
            if *stagger_seconds > 0 && *stagger_seconds < self.config.min_stagger_secs {
                warn!(
                    "Raising stagger from {}s to the {}s floor",
                    stagger_seconds, self.config.min_stagger_secs
                );
                *stagger_seconds = self.config.min_stagger_secs;
            }
        }

        let job = RecordingJob {
            id: Uuid::new_v4(),
            kind,
            repeat,
            duration_secs,
            is_active: true,
            created_at: Utc::now(),
            last_fired_at: None,
        };

        // The registry is authoritative; the store is a log for restart
        // visibility and must not block registration
        if let Err(e) = self.database.record_job(&job).await {
            error!("Failed to persist job {}: {}", job.id, e);
        }

        info!(
            "Registered job {} ({}, {}, {}s per recording)",
            job.id,
            job.kind.describe(),
            job.repeat.describe(),
            job.duration_secs
        );

        let id = job.id;
        self.registry.write().await.insert(id, job);
        Ok(id)
    }

    /// Cancel a job. Cancellation is terminal: a second cancel of the same
    /// id reports not-found and changes nothing.
    pub async fn cancel_job(&self, job_id: Uuid) -> Result<(), AppError> {
        {
            let mut registry = self.registry.write().await;
            match registry.get_mut(&job_id) {
                Some(job) if job.is_active => {
                    job.is_active = false;
                }
                _ => return Err(AppError::not_found("job", job_id.to_string())),
            }
        }

        if let Err(e) = self.database.deactivate_job(job_id).await {
            error!("Failed to deactivate persisted job {}: {}", job_id, e);
        }

        info!("Cancelled job {}", job_id);
        Ok(())
    }

    /// All known jobs, newest first; cancelled and completed jobs keep their
    /// entries with the active flag cleared.
    pub async fn list_jobs(&self) -> Vec<RecordingJob> {
        let registry = self.registry.read().await;
        let mut jobs: Vec<RecordingJob> = registry.values().cloned().collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        jobs
    }

    /// Tick until the process-wide running flag is cleared.
    pub async fn run(&self) {
        info!("Scheduler service started");
        let mut ticker = interval(Duration::from_secs(1));

        while self.running.load(Ordering::Relaxed) {
            ticker.tick().await;
            self.tick_once(Utc::now()).await;
        }

        info!("Scheduler service stopped");
    }

    /// One tick scan: fire every due job and return how many fired.
    ///
    /// Due jobs are stamped `last_fired_at` while the registry lock is held,
    /// then fired with the lock released.
    pub async fn tick_once(&self, now: DateTime<Utc>) -> usize {
        let due: Vec<RecordingJob> = {
            let mut registry = self.registry.write().await;
            registry
                .values_mut()
                .filter(|job| job_is_due(job, now))
                .map(|job| {
                    job.last_fired_at = Some(now);
                    job.clone()
                })
                .collect()
        };

        if due.is_empty() {
            return 0;
        }

        debug!("{} job(s) due at {}", due.len(), now.format("%Y-%m-%d %H:%M:%S UTC"));
        for job in &due {
            self.fire_job(job, now).await;
        }
        due.len()
    }

    async fn fire_job(&self, job: &RecordingJob, now: DateTime<Utc>) {
        let tasks = self.expand_job(job, now);

        if tasks.is_empty() {
            // An empty expansion is a no-op firing, not a job failure
            warn!(
                "Job {} ({}) expanded to an empty task set, skipping this firing",
                job.id,
                job.kind.describe()
            );
        } else {
            let (max_concurrent, stagger_seconds) = match &job.kind {
                JobKind::SingleStation { .. } => (1, 0),
                JobKind::BulkSet {
                    max_concurrent,
                    stagger_seconds,
                    ..
                } => (*max_concurrent, *stagger_seconds),
            };

            info!(
                "Firing job {} ({}): {} task(s), {} max concurrent",
                job.id,
                job.kind.describe(),
                tasks.len(),
                max_concurrent
            );

            let results = self.batch.run_batch(tasks, max_concurrent, stagger_seconds).await;
            let successful = results.iter().filter(|r| r.is_success()).count();
            info!(
                "Job {} firing complete: {}/{} successful",
                job.id,
                successful,
                results.len()
            );
        }

        if matches!(job.repeat, RepeatRule::Once { .. }) {
            self.complete_job(job.id).await;
        }
    }

    /// Expand a job into its task set for one firing.
    fn expand_job(&self, job: &RecordingJob, now: DateTime<Utc>) -> Vec<RecordingTask> {
        let stations = match &job.kind {
            JobKind::SingleStation { station } => vec![station.clone()],
            JobKind::BulkSet {
                country_filter,
                max_stations,
                ..
            } => self
                .catalog
                .filter_stations(country_filter.as_deref(), *max_stations),
        };

        stations
            .into_iter()
            .map(|station| {
                let output_path = output_path_for(&self.recordings_root, &station, now);
                RecordingTask {
                    id: Uuid::new_v4(),
                    job_id: Some(job.id),
                    station,
                    duration_secs: job.duration_secs,
                    output_path,
                    created_at: now,
                }
            })
            .collect()
    }

    async fn complete_job(&self, job_id: Uuid) {
        {
            let mut registry = self.registry.write().await;
            if let Some(job) = registry.get_mut(&job_id) {
                job.is_active = false;
            }
        }
        if let Err(e) = self.database.deactivate_job(job_id).await {
            error!("Failed to deactivate persisted job {}: {}", job_id, e);
        }
        info!("One-shot job {} completed", job_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, DatabaseConfig};
    use crate::errors::CaptureError;
    use crate::models::Station;
    use crate::recorder::{CaptureOutput, CaptureTool, TaskExecutor};
    use crate::stats::Statistics;
    use async_trait::async_trait;
    use chrono::{TimeZone, Timelike};

    /// Capture double that records instantly.
    struct InstantCapture;

    #[async_trait]
    impl CaptureTool for InstantCapture {
        async fn capture(&self, _task: &RecordingTask) -> Result<CaptureOutput, CaptureError> {
            Ok(CaptureOutput { file_size: 2048 })
        }
    }

    const CATALOG_JSON: &str = r#"{
        "stations_by_country": {
            "Egypt": [
                {"name": "Radio Cairo", "url": "http://streams.example.com/cairo", "state": "Cairo"},
                {"name": "Nile FM", "url": "http://streams.example.com/nile", "state": "Cairo"}
            ],
            "Jordan": [
                {"name": "Amman Live", "url": "http://streams.example.com/amman", "state": "Amman"}
            ]
        }
    }"#;

    async fn scheduler() -> (SchedulerService, Database) {
        let catalog = Arc::new(crate::catalog::StationCatalog::from_json(CATALOG_JSON).unwrap());
        let database = Database::new(&DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: Some(1),
        })
        .await
        .unwrap();
        database.migrate().await.unwrap();

        let executor = TaskExecutor::new(
            Arc::new(InstantCapture),
            database.clone(),
            Arc::new(Statistics::new()),
            &Config::default().recording,
        );
        let service = SchedulerService::new(
            catalog,
            database.clone(),
            BatchRunner::new(Arc::new(executor)),
            Config::default().scheduler,
            PathBuf::from("recordings"),
            Arc::new(AtomicBool::new(true)),
        );
        (service, database)
    }

    fn single_station_kind() -> JobKind {
        JobKind::SingleStation {
            station: Station {
                name: "Radio Cairo".to_string(),
                url: "http://streams.example.com/cairo".to_string(),
                country: "Egypt".to_string(),
                city: "Cairo".to_string(),
                bitrate: None,
                language: None,
            },
        }
    }

    fn job_at(created_at: DateTime<Utc>, repeat: RepeatRule) -> RecordingJob {
        RecordingJob {
            id: Uuid::new_v4(),
            kind: single_station_kind(),
            repeat,
            duration_secs: 30,
            is_active: true,
            created_at,
            last_fired_at: None,
        }
    }

    #[test]
    fn test_interval_job_due_on_minute_buckets() {
        let created = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 30).unwrap();
        let mut job = job_at(created, RepeatRule::Interval { minutes: 5 });

        // Not due before the next five-minute boundary
        assert!(!job_is_due(&job, Utc.with_ymd_and_hms(2025, 3, 1, 12, 3, 0).unwrap()));
        assert!(job_is_due(&job, Utc.with_ymd_and_hms(2025, 3, 1, 12, 5, 0).unwrap()));

        job.last_fired_at = Some(Utc.with_ymd_and_hms(2025, 3, 1, 12, 5, 0).unwrap());
        assert!(!job_is_due(&job, Utc.with_ymd_and_hms(2025, 3, 1, 12, 6, 0).unwrap()));
        assert!(job_is_due(&job, Utc.with_ymd_and_hms(2025, 3, 1, 12, 10, 0).unwrap()));
    }

    #[test]
    fn test_interval_job_hour_bucket_for_large_intervals() {
        let created = Utc.with_ymd_and_hms(2025, 3, 1, 12, 10, 0).unwrap();
        // 90 minutes truncates to an hourly cadence
        let job = job_at(created, RepeatRule::Interval { minutes: 90 });

        assert!(!job_is_due(&job, Utc.with_ymd_and_hms(2025, 3, 1, 12, 59, 0).unwrap()));
        assert!(job_is_due(&job, Utc.with_ymd_and_hms(2025, 3, 1, 13, 0, 0).unwrap()));
    }

    #[test]
    fn test_once_job_due_immediately_without_start() {
        let created = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        let mut job = job_at(created, RepeatRule::Once { start_at: None });

        assert!(job_is_due(&job, created));
        job.last_fired_at = Some(created);
        assert!(!job_is_due(&job, created + chrono::Duration::hours(1)));
    }

    #[test]
    fn test_once_job_waits_for_start_time() {
        let created = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        let start = Utc.with_ymd_and_hms(2025, 3, 1, 15, 0, 0).unwrap();
        let job = job_at(created, RepeatRule::Once { start_at: Some(start) });

        assert!(!job_is_due(&job, created + chrono::Duration::hours(1)));
        assert!(job_is_due(&job, start));
    }

    #[test]
    fn test_inactive_job_never_due() {
        let created = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        let mut job = job_at(created, RepeatRule::Once { start_at: None });
        job.is_active = false;
        assert!(!job_is_due(&job, created + chrono::Duration::minutes(10)));
    }

    #[tokio::test]
    async fn test_register_rejects_zero_duration() {
        let (service, _db) = scheduler().await;
        let result = service
            .register_job(single_station_kind(), RepeatRule::Once { start_at: None }, 0)
            .await;
        assert!(matches!(result, Err(AppError::Validation { .. })));
    }

    #[tokio::test]
    async fn test_register_rejects_sub_minimum_interval() {
        let (service, _db) = scheduler().await;
        let result = service
            .register_job(
                single_station_kind(),
                RepeatRule::Interval { minutes: 0 },
                30,
            )
            .await;
        assert!(matches!(result, Err(AppError::Validation { .. })));
    }

    #[tokio::test]
    async fn test_register_rejects_empty_bulk_filter() {
        let (service, _db) = scheduler().await;
        let result = service
            .register_job(
                JobKind::BulkSet {
                    country_filter: Some("Atlantis".to_string()),
                    max_stations: None,
                    max_concurrent: 5,
                    stagger_seconds: 0,
                },
                RepeatRule::Interval { minutes: 30 },
                30,
            )
            .await;
        assert!(matches!(result, Err(AppError::Validation { .. })));
    }

    #[tokio::test]
    async fn test_register_applies_stagger_floor() {
        let (service, _db) = scheduler().await;
        let id = service
            .register_job(
                JobKind::BulkSet {
                    country_filter: Some("Egypt".to_string()),
                    max_stations: None,
                    max_concurrent: 2,
                    stagger_seconds: 3,
                },
                RepeatRule::Interval { minutes: 30 },
                30,
            )
            .await
            .unwrap();

        let jobs = service.list_jobs().await;
        let job = jobs.iter().find(|j| j.id == id).unwrap();
        match &job.kind {
            JobKind::BulkSet { stagger_seconds, .. } => assert_eq!(*stagger_seconds, 10),
            _ => panic!("expected bulk job"),
        }
    }

    #[tokio::test]
    async fn test_cancel_is_idempotent_not_found() {
        let (service, _db) = scheduler().await;
        let id = service
            .register_job(single_station_kind(), RepeatRule::Interval { minutes: 5 }, 30)
            .await
            .unwrap();

        service.cancel_job(id).await.unwrap();
        // Second cancel reports not-found instead of erroring destructively
        assert!(matches!(
            service.cancel_job(id).await,
            Err(AppError::NotFound { .. })
        ));
        // Unknown ids behave the same way
        assert!(matches!(
            service.cancel_job(Uuid::new_v4()).await,
            Err(AppError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_cancelled_job_never_fires_again() {
        let (service, database) = scheduler().await;
        let id = service
            .register_job(single_station_kind(), RepeatRule::Interval { minutes: 5 }, 30)
            .await
            .unwrap();
        service.cancel_job(id).await.unwrap();

        let base = Utc::now() + chrono::Duration::minutes(10);
        for i in 0..5 {
            let fired = service.tick_once(base + chrono::Duration::minutes(5 * i)).await;
            assert_eq!(fired, 0);
        }
        assert!(database.recent_recordings(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_three_interval_ticks_produce_three_recordings() {
        let (service, database) = scheduler().await;
        service
            .register_job(single_station_kind(), RepeatRule::Interval { minutes: 5 }, 30)
            .await
            .unwrap();

        // Walk the next three five-minute boundaries after registration
        let registered_at = service.list_jobs().await[0].created_at;
        let mut fired_total = 0;
        let mut boundary = registered_at;
        for _ in 0..3 {
            boundary = next_five_minute_boundary(boundary);
            fired_total += service.tick_once(boundary).await;
            // A tick between boundaries does nothing
            fired_total += service.tick_once(boundary + chrono::Duration::seconds(30)).await;
        }

        assert_eq!(fired_total, 3);
        assert_eq!(database.recent_recordings(10).await.unwrap().len(), 3);
    }

    fn next_five_minute_boundary(after: DateTime<Utc>) -> DateTime<Utc> {
        let mut boundary = after
            .date_naive()
            .and_hms_opt(after.time().hour(), after.time().minute(), 0)
            .unwrap()
            .and_utc();
        loop {
            boundary += chrono::Duration::minutes(1);
            if boundary.minute() % 5 == 0 && boundary > after {
                return boundary;
            }
        }
    }

    #[tokio::test]
    async fn test_once_job_fires_then_completes() {
        let (service, database) = scheduler().await;
        let id = service
            .register_job(single_station_kind(), RepeatRule::Once { start_at: None }, 30)
            .await
            .unwrap();

        let fired = service.tick_once(Utc::now()).await;
        assert_eq!(fired, 1);
        assert_eq!(database.recent_recordings(10).await.unwrap().len(), 1);

        let jobs = service.list_jobs().await;
        assert!(!jobs.iter().find(|j| j.id == id).unwrap().is_active);

        // No further firings
        assert_eq!(service.tick_once(Utc::now() + chrono::Duration::minutes(5)).await, 0);
    }

    #[tokio::test]
    async fn test_bulk_job_records_every_station() {
        let (service, database) = scheduler().await;
        service
            .register_job(
                JobKind::BulkSet {
                    country_filter: None,
                    max_stations: None,
                    max_concurrent: 2,
                    stagger_seconds: 0,
                },
                RepeatRule::Once { start_at: None },
                30,
            )
            .await
            .unwrap();

        service.tick_once(Utc::now()).await;
        // All three catalogued stations captured in one firing
        assert_eq!(database.recent_recordings(10).await.unwrap().len(), 3);
    }
}
