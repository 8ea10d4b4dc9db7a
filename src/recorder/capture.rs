//! ffmpeg capture tool
//!
//! Invokes ffmpeg once per task to copy a bounded slice of the stream to an
//! audio file. Output is organized as `<root>/<Country>/<City>/<Name>_<ts>.mp3`
//! with sanitized path components.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

use super::{CaptureOutput, CaptureTool};
use crate::config::RecordingConfig;
use crate::errors::CaptureError;
use crate::models::Station;

/// Strip a station name down to characters safe in a filename.
pub fn sanitize_station_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '-' | '_'))
        .collect();
    cleaned.trim().replace(' ', "_")
}

fn sanitize_location(component: &str, fallback: &str) -> String {
    let trimmed = component.trim();
    if trimmed.is_empty() {
        fallback.to_string()
    } else {
        trimmed.replace(' ', "_")
    }
}

/// Target path for one capture: `<root>/<Country>/<City>/<SafeName>_<timestamp>.mp3`.
pub fn output_path_for(root: &Path, station: &Station, at: DateTime<Utc>) -> PathBuf {
    let country = sanitize_location(&station.country, "Unknown_Country");
    let city = sanitize_location(&station.city, "Unknown_City");
    let filename = format!(
        "{}_{}.mp3",
        sanitize_station_name(&station.name),
        at.format("%Y%m%d_%H%M%S")
    );
    root.join(country).join(city).join(filename)
}

#[derive(Debug, Clone)]
pub struct FfmpegCapture {
    binary: String,
    audio_codec: String,
    audio_bitrate: String,
}

impl FfmpegCapture {
    pub fn new(config: &RecordingConfig) -> Self {
        Self {
            binary: config.ffmpeg_binary.clone(),
            audio_codec: config.audio_codec.clone(),
            audio_bitrate: config.audio_bitrate.clone(),
        }
    }
}

#[async_trait]
impl CaptureTool for FfmpegCapture {
    async fn capture(
        &self,
        task: &crate::models::RecordingTask,
    ) -> Result<CaptureOutput, CaptureError> {
        if let Some(parent) = task.output_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        debug!(
            "Capturing '{}' for {}s -> {}",
            task.station.name,
            task.duration_secs,
            task.output_path.display()
        );

        let mut command = Command::new(&self.binary);
        command
            .arg("-i")
            .arg(&task.station.url)
            .arg("-t")
            .arg(task.duration_secs.to_string())
            .arg("-c:a")
            .arg(&self.audio_codec)
            .arg("-b:a")
            .arg(&self.audio_bitrate)
            .arg("-y")
            .arg(&task.output_path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            // An expired execution deadline drops this future; the child
            // must not outlive it
            .kill_on_drop(true);

        let output = command
            .output()
            .await
            .map_err(|e| CaptureError::spawn_failed(&self.binary, e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CaptureError::ToolFailed {
                status: output.status.code().unwrap_or(-1),
                stderr: stderr.trim().to_string(),
            });
        }

        // Exit code 0 with no file on disk still counts as a failure
        let metadata = tokio::fs::metadata(&task.output_path)
            .await
            .map_err(|_| CaptureError::missing_output(task.output_path.display().to_string()))?;

        Ok(CaptureOutput {
            file_size: metadata.len(),
        })
    }
}
