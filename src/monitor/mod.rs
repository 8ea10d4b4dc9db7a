//! Background connection monitoring
//!
//! A long-lived loop that walks a rotating window of the station catalog,
//! probes each selected station and publishes the results into a shared
//! status table. The monitor loop is the only writer of that table; readers
//! snapshot it and treat absent entries as untested. A failed cycle is
//! logged and the loop continues after a backoff sleep.

pub mod prober;

pub use prober::{HealthProber, ProbeOutcome};

use chrono::Utc;
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::catalog::StationCatalog;
use crate::config::MonitorConfig;
use crate::database::Database;
use crate::models::{ConnectionState, ConnectionStatus, ProbeSweepSummary, Station};

/// Shared per-station health cache, keyed by station name.
#[derive(Clone, Default)]
pub struct ConnectionStatusTable {
    inner: Arc<RwLock<HashMap<String, ConnectionStatus>>>,
}

impl ConnectionStatusTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the live entry for one station. Monitor-side code is the
    /// only caller; everything else reads.
    pub(crate) async fn record(&self, status: ConnectionStatus) {
        let mut table = self.inner.write().await;
        table.insert(status.station_name.clone(), status);
    }

    pub async fn get(&self, station_name: &str) -> Option<ConnectionStatus> {
        self.inner.read().await.get(station_name).cloned()
    }

    /// Cached state for a station; stations never probed are `Untested`.
    pub async fn state_of(&self, station_name: &str) -> ConnectionState {
        self.inner
            .read()
            .await
            .get(station_name)
            .map(|status| status.state)
            .unwrap_or(ConnectionState::Untested)
    }

    pub async fn snapshot(&self) -> HashMap<String, ConnectionStatus> {
        self.inner.read().await.clone()
    }
}

/// Select a wrapping window of countries starting at `cursor`.
///
/// Returns the selected countries and the advanced cursor, so consecutive
/// cycles cover the whole catalog instead of re-probing the same head.
fn rotating_window(countries: &[String], cursor: usize, count: usize) -> (Vec<String>, usize) {
    if countries.is_empty() || count == 0 {
        return (Vec::new(), 0);
    }
    let count = count.min(countries.len());
    let cursor = cursor % countries.len();
    let window = (0..count)
        .map(|i| countries[(cursor + i) % countries.len()].clone())
        .collect();
    (window, (cursor + count) % countries.len())
}

pub struct ConnectionMonitor {
    catalog: Arc<StationCatalog>,
    database: Database,
    prober: HealthProber,
    table: ConnectionStatusTable,
    config: MonitorConfig,
    running: Arc<AtomicBool>,
    cursor: usize,
}

impl ConnectionMonitor {
    pub fn new(
        catalog: Arc<StationCatalog>,
        database: Database,
        table: ConnectionStatusTable,
        config: MonitorConfig,
        running: Arc<AtomicBool>,
    ) -> Self {
        Self {
            catalog,
            database,
            prober: HealthProber::new(),
            table,
            config,
            running,
            cursor: 0,
        }
    }

    /// Run monitoring cycles until the process-wide running flag is cleared.
    pub async fn run(mut self) {
        info!(
            "Connection monitor started ({} countries x {} stations per cycle, {}s cycle interval)",
            self.config.countries_per_cycle,
            self.config.stations_per_country,
            self.config.cycle_interval_secs
        );

        while self.running.load(Ordering::Relaxed) {
            match self.run_cycle().await {
                Ok(probed) => {
                    debug!("Monitor cycle complete: {} stations probed", probed);
                    let jitter = fastrand::u64(0..5);
                    self.idle_sleep(Duration::from_secs(self.config.cycle_interval_secs + jitter))
                        .await;
                }
                Err(e) => {
                    error!("Error in connection monitor cycle: {}", e);
                    self.idle_sleep(Duration::from_secs(self.config.error_backoff_secs))
                        .await;
                }
            }
        }

        info!("Connection monitor stopped");
    }

    async fn run_cycle(&mut self) -> anyhow::Result<usize> {
        let countries = self.catalog.countries();
        if countries.is_empty() {
            warn!("Station catalog is empty, nothing to monitor");
            return Ok(0);
        }

        let (window, next_cursor) =
            rotating_window(&countries, self.cursor, self.config.countries_per_cycle);
        self.cursor = next_cursor;

        let probe_timeout = Duration::from_secs(self.config.probe_timeout_secs);
        let mut probed = 0;

        for country in window {
            let stations = self.catalog.stations_in(&country, None);
            for station in stations.iter().take(self.config.stations_per_country) {
                if !self.running.load(Ordering::Relaxed) {
                    return Ok(probed);
                }

                let status = probe_station(&self.prober, station, probe_timeout).await;
                self.table.record(status.clone()).await;

                // Loss of the history row is acceptable, a dead monitor is not
                if let Err(e) = self.database.record_connection_status(&status).await {
                    error!(
                        "Failed to persist probe result for '{}': {}",
                        status.station_name, e
                    );
                }

                probed += 1;
                tokio::time::sleep(Duration::from_secs(self.config.inter_probe_delay_secs)).await;
            }
        }

        Ok(probed)
    }

    /// Sleep that wakes early when the running flag is cleared.
    async fn idle_sleep(&self, duration: Duration) {
        let mut remaining = duration;
        let step = Duration::from_secs(1);
        while remaining > Duration::ZERO && self.running.load(Ordering::Relaxed) {
            let chunk = remaining.min(step);
            tokio::time::sleep(chunk).await;
            remaining = remaining.saturating_sub(chunk);
        }
    }
}

async fn probe_station(
    prober: &HealthProber,
    station: &Station,
    timeout: Duration,
) -> ConnectionStatus {
    let outcome = prober.probe(&station.url, timeout).await;
    ConnectionStatus {
        station_name: station.name.clone(),
        station_url: station.url.clone(),
        country: station.country.clone(),
        city: station.city.clone(),
        state: if outcome.reachable {
            ConnectionState::Online
        } else {
            ConnectionState::Offline
        },
        last_check: Utc::now(),
        latency_secs: outcome.latency_secs(),
    }
}

/// One-shot probe sweep over the entire catalog, concurrency-bounded in
/// groups like the recording worker pool. Results land in the shared status
/// table; the summary reports what was seen.
pub async fn probe_all_stations(
    catalog: &StationCatalog,
    prober: &HealthProber,
    table: &ConnectionStatusTable,
    probe_timeout: Duration,
    max_concurrent: usize,
) -> ProbeSweepSummary {
    let stations = catalog.all_stations();
    let max_concurrent = max_concurrent.max(1);
    let mut summary = ProbeSweepSummary::default();

    for group in stations.chunks(max_concurrent) {
        let statuses = join_all(
            group
                .iter()
                .map(|station| probe_station(prober, station, probe_timeout)),
        )
        .await;

        for status in statuses {
            summary.tested += 1;
            match status.state {
                ConnectionState::Online => summary.online += 1,
                _ => summary.offline += 1,
            }
            table.record(status).await;
        }
    }

    summary
}

#[cfg(test)]
mod tests {
    use super::*;

    fn countries(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_rotating_window_wraps_around() {
        let all = countries(&["Algeria", "Egypt", "Jordan", "Lebanon", "Morocco"]);

        let (first, cursor) = rotating_window(&all, 0, 3);
        assert_eq!(first, countries(&["Algeria", "Egypt", "Jordan"]));
        assert_eq!(cursor, 3);

        let (second, cursor) = rotating_window(&all, cursor, 3);
        assert_eq!(second, countries(&["Lebanon", "Morocco", "Algeria"]));
        assert_eq!(cursor, 1);
    }

    #[test]
    fn test_rotating_window_larger_than_catalog() {
        let all = countries(&["Egypt", "Jordan"]);
        let (window, cursor) = rotating_window(&all, 0, 10);
        assert_eq!(window, countries(&["Egypt", "Jordan"]));
        assert_eq!(cursor, 0);
    }

    #[test]
    fn test_rotating_window_empty() {
        let (window, cursor) = rotating_window(&[], 5, 3);
        assert!(window.is_empty());
        assert_eq!(cursor, 0);
    }

    #[tokio::test]
    async fn test_status_table_defaults_to_untested() {
        let table = ConnectionStatusTable::new();
        assert_eq!(table.state_of("never probed").await, ConnectionState::Untested);
        assert!(table.get("never probed").await.is_none());
    }

    #[tokio::test]
    async fn test_probe_sweep_covers_whole_catalog() {
        let catalog = crate::catalog::StationCatalog::from_json(
            r#"{
                "stations_by_country": {
                    "Egypt": [
                        {"name": "A", "url": "http://127.0.0.1:9/a", "state": "Cairo"},
                        {"name": "B", "url": "http://127.0.0.1:9/b", "state": "Cairo"}
                    ],
                    "Jordan": [
                        {"name": "C", "url": "http://127.0.0.1:9/c", "state": "Amman"}
                    ]
                }
            }"#,
        )
        .unwrap();
        let table = ConnectionStatusTable::new();
        let prober = HealthProber::new();

        let summary =
            probe_all_stations(&catalog, &prober, &table, Duration::from_secs(1), 2).await;

        assert_eq!(summary.tested, 3);
        assert_eq!(summary.online, 0);
        assert_eq!(summary.offline, 3);
        assert_eq!(table.snapshot().await.len(), 3);
        assert_eq!(table.state_of("C").await, ConnectionState::Offline);
    }

    #[tokio::test]
    async fn test_status_table_overwrites_per_station() {
        let table = ConnectionStatusTable::new();
        let mut status = ConnectionStatus {
            station_name: "Radio Cairo".to_string(),
            station_url: "http://streams.example.com/cairo".to_string(),
            country: "Egypt".to_string(),
            city: "Cairo".to_string(),
            state: ConnectionState::Online,
            last_check: Utc::now(),
            latency_secs: 0.2,
        };
        table.record(status.clone()).await;
        assert_eq!(table.state_of("Radio Cairo").await, ConnectionState::Online);

        status.state = ConnectionState::Offline;
        table.record(status).await;
        assert_eq!(table.state_of("Radio Cairo").await, ConnectionState::Offline);
        assert_eq!(table.snapshot().await.len(), 1);
    }
}
