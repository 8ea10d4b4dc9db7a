//! Capture execution
//!
//! The capture tool itself is an external program; everything above it is
//! organized around the [`CaptureTool`] seam so the executor and batch
//! runner stay independent of how audio actually gets onto disk.

pub mod batch;
pub mod capture;
pub mod executor;

pub use batch::BatchRunner;
pub use capture::FfmpegCapture;
pub use executor::TaskExecutor;

use async_trait::async_trait;

use crate::errors::CaptureError;
use crate::models::RecordingTask;

/// What a completed capture produced.
#[derive(Debug, Clone, Copy)]
pub struct CaptureOutput {
    pub file_size: u64,
}

/// One capture attempt, run to completion.
///
/// Implementations report all failure modes as [`CaptureError`]; enforcing
/// the execution deadline is the executor's job, not the tool's.
#[async_trait]
pub trait CaptureTool: Send + Sync {
    async fn capture(&self, task: &RecordingTask) -> Result<CaptureOutput, CaptureError>;
}
