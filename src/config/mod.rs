use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub storage: StorageConfig,
    pub recording: RecordingConfig,
    pub monitor: MonitorConfig,
    pub scheduler: SchedulerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root directory for captured audio, laid out as Country/City/file.
    pub recordings_path: PathBuf,
    /// Station catalog JSON document.
    pub catalog_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingConfig {
    /// Capture tool binary, invoked once per task.
    pub ffmpeg_binary: String,
    pub audio_codec: String,
    pub audio_bitrate: String,
    /// Grace period added to the requested duration before a task is
    /// declared timed out, allowing the tool to shut down cleanly.
    pub capture_overhead_secs: u64,
    /// Concurrency cap applied when a bulk job does not specify one.
    pub default_max_concurrent: usize,
    /// Bounded length for stored capture diagnostics.
    pub max_error_length: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Per-probe timeout.
    pub probe_timeout_secs: u64,
    /// Delay between consecutive probes within one cycle.
    pub inter_probe_delay_secs: u64,
    /// Sleep between monitoring cycles.
    pub cycle_interval_secs: u64,
    /// Backoff sleep after a failed cycle.
    pub error_backoff_secs: u64,
    /// Rotating window: countries probed per cycle.
    pub countries_per_cycle: usize,
    /// Rotating window: stations probed per country.
    pub stations_per_country: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Minimum accepted interval for repeating jobs, in minutes.
    pub min_interval_minutes: u32,
    /// Floor applied to bulk-job stagger when staggering is requested.
    pub min_stagger_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://./radio-recorder.db".to_string(),
                max_connections: Some(10),
            },
            storage: StorageConfig {
                recordings_path: PathBuf::from("./recordings"),
                catalog_path: PathBuf::from("./stations.json"),
            },
            recording: RecordingConfig {
                ffmpeg_binary: "ffmpeg".to_string(),
                audio_codec: "mp3".to_string(),
                audio_bitrate: "128k".to_string(),
                capture_overhead_secs: 30,
                default_max_concurrent: 5,
                max_error_length: 500,
            },
            monitor: MonitorConfig {
                probe_timeout_secs: 8,
                inter_probe_delay_secs: 1,
                cycle_interval_secs: 300,
                error_backoff_secs: 60,
                countries_per_cycle: 10,
                stations_per_country: 2,
            },
            scheduler: SchedulerConfig {
                min_interval_minutes: 1,
                min_stagger_secs: 10,
            },
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_file =
            std::env::var("CONFIG_FILE").unwrap_or_else(|_| "config.toml".to_string());

        if std::path::Path::new(&config_file).exists() {
            let contents = std::fs::read_to_string(&config_file)?;
            Ok(toml::from_str(&contents)?)
        } else {
            let default_config = Self::default();
            let contents = toml::to_string_pretty(&default_config)?;
            std::fs::create_dir_all(&default_config.storage.recordings_path)?;
            std::fs::write(&config_file, contents)?;
            Ok(default_config)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_round_trips_through_toml() {
        let config = Config::default();
        let serialized = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&serialized).unwrap();
        assert_eq!(parsed.database.url, config.database.url);
        assert_eq!(
            parsed.recording.capture_overhead_secs,
            config.recording.capture_overhead_secs
        );
        assert_eq!(
            parsed.monitor.cycle_interval_secs,
            config.monitor.cycle_interval_secs
        );
    }
}
