//! Service facade
//!
//! Wires the catalog, store, statistics, monitor table, executor and
//! scheduler together and exposes the operations consumed by front-end
//! layers. Every operation returns a structured outcome; background loops
//! are spawned by the caller from the handles this facade hands out.

use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;
use uuid::Uuid;

use crate::catalog::StationCatalog;
use crate::config::Config;
use crate::database::Database;
use crate::errors::AppError;
use crate::models::{
    ConnectionState, ConnectionStatus, CountryStatusSummary, JobKind, ProbeSweepSummary,
    RecordingJob, RecordingRecord, RecordingTask, RepeatRule, StationOverview, StationStatusRow,
    StatisticsSnapshot, TaskResult,
};
use crate::monitor::{self, ConnectionMonitor, ConnectionStatusTable, HealthProber};
use crate::recorder::capture::output_path_for;
use crate::recorder::{BatchRunner, CaptureTool, FfmpegCapture, TaskExecutor};
use crate::scheduler::SchedulerService;
use crate::stats::Statistics;

pub struct RecordingService {
    config: Config,
    catalog: Arc<StationCatalog>,
    database: Database,
    stats: Arc<Statistics>,
    status_table: ConnectionStatusTable,
    prober: HealthProber,
    executor: Arc<TaskExecutor>,
    scheduler: Arc<SchedulerService>,
    running: Arc<AtomicBool>,
}

impl RecordingService {
    /// Build a service around the real ffmpeg capture tool.
    pub async fn new(
        config: Config,
        catalog: StationCatalog,
        database: Database,
    ) -> anyhow::Result<Self> {
        let capture = Arc::new(FfmpegCapture::new(&config.recording));
        Self::with_capture_tool(config, catalog, database, capture).await
    }

    /// Build a service around any capture tool implementation.
    pub async fn with_capture_tool(
        config: Config,
        catalog: StationCatalog,
        database: Database,
        capture: Arc<dyn CaptureTool>,
    ) -> anyhow::Result<Self> {
        let stats = Arc::new(Statistics::new());
        match database.load_statistics().await {
            Ok(snapshot) => stats.seed(&snapshot),
            Err(e) => warn!("Could not seed statistics from history: {}", e),
        }

        let catalog = Arc::new(catalog);
        let running = Arc::new(AtomicBool::new(true));
        let executor = Arc::new(TaskExecutor::new(
            capture,
            database.clone(),
            stats.clone(),
            &config.recording,
        ));
        let scheduler = Arc::new(SchedulerService::new(
            catalog.clone(),
            database.clone(),
            BatchRunner::new(executor.clone()),
            config.scheduler.clone(),
            config.storage.recordings_path.clone(),
            running.clone(),
        ));

        Ok(Self {
            config,
            catalog,
            database,
            stats,
            status_table: ConnectionStatusTable::new(),
            prober: HealthProber::new(),
            executor,
            scheduler,
            running,
        })
    }

    /// Scheduler handle for spawning the tick loop.
    pub fn scheduler(&self) -> Arc<SchedulerService> {
        self.scheduler.clone()
    }

    /// Build the background monitor over this service's status table.
    pub fn connection_monitor(&self) -> ConnectionMonitor {
        ConnectionMonitor::new(
            self.catalog.clone(),
            self.database.clone(),
            self.status_table.clone(),
            self.config.monitor.clone(),
            self.running.clone(),
        )
    }

    pub fn catalog(&self) -> &StationCatalog {
        &self.catalog
    }

    /// Clear the process-wide running flag; background loops drain and stop.
    pub fn shutdown(&self) {
        self.running.store(false, Ordering::Relaxed);
    }

    pub async fn register_single_job(
        &self,
        country: &str,
        city: Option<&str>,
        station_name: &str,
        duration_secs: u32,
        repeat: RepeatRule,
    ) -> Result<Uuid, AppError> {
        let station = self.catalog.find_station(country, city, station_name)?;
        self.scheduler
            .register_job(JobKind::SingleStation { station }, repeat, duration_secs)
            .await
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn register_bulk_job(
        &self,
        country_filter: Option<String>,
        duration_secs: u32,
        repeat: RepeatRule,
        max_concurrent: Option<usize>,
        stagger_seconds: u64,
        max_stations: Option<usize>,
    ) -> Result<Uuid, AppError> {
        let kind = JobKind::BulkSet {
            country_filter,
            max_stations,
            max_concurrent: max_concurrent
                .unwrap_or(self.config.recording.default_max_concurrent),
            stagger_seconds,
        };
        self.scheduler.register_job(kind, repeat, duration_secs).await
    }

    pub async fn cancel_job(&self, job_id: Uuid) -> Result<(), AppError> {
        self.scheduler.cancel_job(job_id).await
    }

    pub async fn list_jobs(&self) -> Vec<RecordingJob> {
        self.scheduler.list_jobs().await
    }

    /// Record one station immediately, outside any job.
    pub async fn trigger_manual_recording(
        &self,
        country: &str,
        city: Option<&str>,
        station_name: &str,
        duration_secs: u32,
    ) -> Result<TaskResult, AppError> {
        if duration_secs == 0 {
            return Err(AppError::validation(
                "Recording duration must be at least 1 second",
            ));
        }
        let station = self.catalog.find_station(country, city, station_name)?;
        let now = Utc::now();
        let task = RecordingTask {
            id: Uuid::new_v4(),
            job_id: None,
            station: station.clone(),
            duration_secs,
            output_path: output_path_for(&self.config.storage.recordings_path, &station, now),
            created_at: now,
        };
        Ok(self.executor.execute(&task).await)
    }

    pub async fn connection_status(&self) -> HashMap<String, ConnectionStatus> {
        self.status_table.snapshot().await
    }

    pub fn statistics_snapshot(&self) -> StatisticsSnapshot {
        self.stats.snapshot()
    }

    pub async fn recent_recordings(&self, limit: u32) -> Result<Vec<RecordingRecord>, AppError> {
        self.database
            .recent_recordings(limit)
            .await
            .map_err(|e| AppError::internal(e.to_string()))
    }

    /// One-shot concurrency-bounded probe over the whole catalog.
    pub async fn probe_all_stations(&self, max_concurrent: usize) -> ProbeSweepSummary {
        monitor::probe_all_stations(
            &self.catalog,
            &self.prober,
            &self.status_table,
            Duration::from_secs(self.config.monitor.probe_timeout_secs),
            max_concurrent,
        )
        .await
    }

    /// Catalog-wide health rollup; stations without a cached probe result
    /// count as untested.
    pub async fn station_overview(&self) -> StationOverview {
        let statuses = self.status_table.snapshot().await;

        let mut overview = StationOverview {
            total_stations: 0,
            online_stations: 0,
            offline_stations: 0,
            untested_stations: 0,
            by_country: HashMap::new(),
            detailed_status: Vec::new(),
        };

        for (country, stations) in self.catalog.by_country() {
            let summary = overview
                .by_country
                .entry(country.clone())
                .or_insert_with(CountryStatusSummary::default);

            for station in stations {
                overview.total_stations += 1;
                summary.total += 1;

                let cached = statuses.get(&station.name);
                let state = cached
                    .map(|status| status.state)
                    .unwrap_or(ConnectionState::Untested);
                match state {
                    ConnectionState::Online => {
                        overview.online_stations += 1;
                        summary.online += 1;
                    }
                    ConnectionState::Offline => {
                        overview.offline_stations += 1;
                        summary.offline += 1;
                    }
                    ConnectionState::Untested => {
                        overview.untested_stations += 1;
                        summary.untested += 1;
                    }
                }

                overview.detailed_status.push(StationStatusRow {
                    name: station.name.clone(),
                    country: station.country.clone(),
                    city: station.city.clone(),
                    url: station.url.clone(),
                    state,
                    last_check: cached.map(|status| status.last_check),
                });
            }
        }

        overview
    }
}
