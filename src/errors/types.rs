//! Error type definitions for the radio recorder application
//!
//! This module defines all error types used throughout the application,
//! providing a hierarchical error system that makes debugging and error
//! handling more straightforward.

use thiserror::Error;

/// Top-level application error type
///
/// This enum represents all possible errors that can occur in the application.
/// It uses `thiserror` to provide automatic error trait implementations and
/// proper error chaining.
#[derive(Error, Debug)]
pub enum AppError {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Capture tool errors
    #[error("Capture error: {0}")]
    Capture(#[from] CaptureError),

    /// Catalog loading and lookup errors
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    /// Validation errors
    #[error("Validation error: {message}")]
    Validation { message: String },

    /// Resource not found errors
    #[error("Not found: {resource} with id {id}")]
    NotFound { resource: String, id: String },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Generic internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },

    /// HTTP client errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Capture tool specific errors
#[derive(Error, Debug)]
pub enum CaptureError {
    /// The capture tool could not be spawned at all
    #[error("Failed to spawn capture tool '{tool}': {message}")]
    SpawnFailed { tool: String, message: String },

    /// The capture tool exited with a non-zero status
    #[error("Capture tool exited with status {status}: {stderr}")]
    ToolFailed { status: i32, stderr: String },

    /// The tool reported success but produced no output file
    #[error("Capture produced no output at {path}")]
    MissingOutput { path: String },

    /// Filesystem errors around the output location
    #[error("Output I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Catalog specific errors
#[derive(Error, Debug)]
pub enum CatalogError {
    /// The catalog data file could not be read
    #[error("Catalog file not readable: {path} - {message}")]
    Unreadable { path: String, message: String },

    /// The catalog data file could not be parsed
    #[error("Catalog parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Lookup missed: no station matched the given location/name
    #[error("Station not found: {name} ({location})")]
    StationNotFound { name: String, location: String },

    /// A filter produced an empty station set
    #[error("Empty station set for filter: {filter}")]
    EmptyFilter { filter: String },
}

/// Convenience methods for creating common error types
impl AppError {
    /// Create a validation error with a custom message
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a not found error for a specific resource
    pub fn not_found<R: Into<String>, I: Into<String>>(resource: R, id: I) -> Self {
        Self::NotFound {
            resource: resource.into(),
            id: id.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

impl CaptureError {
    /// Create a spawn failure error
    pub fn spawn_failed<T: Into<String>, M: Into<String>>(tool: T, message: M) -> Self {
        Self::SpawnFailed {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Create a missing output error
    pub fn missing_output<P: Into<String>>(path: P) -> Self {
        Self::MissingOutput { path: path.into() }
    }
}

impl CatalogError {
    /// Create a station not found error
    pub fn station_not_found<N: Into<String>, L: Into<String>>(name: N, location: L) -> Self {
        Self::StationNotFound {
            name: name.into(),
            location: location.into(),
        }
    }

    /// Create an empty filter error
    pub fn empty_filter<F: Into<String>>(filter: F) -> Self {
        Self::EmptyFilter {
            filter: filter.into(),
        }
    }
}
