//! Centralized error handling for the radio recorder application
//!
//! This module provides the error types used across all application layers
//! so that every operation exposed by the service facade returns a
//! structured outcome instead of raising past the API boundary.
//!
//! # Error Categories
//!
//! - **Database Errors**: SQLite operations, migrations, connection issues
//! - **Capture Errors**: ffmpeg invocation and output failures
//! - **Validation Errors**: job definitions rejected at registration time
//! - **Catalog Errors**: station catalog loading and lookup failures

pub mod types;

pub use types::*;

/// Convenience type alias for Results using AppError
pub type AppResult<T> = Result<T, AppError>;
