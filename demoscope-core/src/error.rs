//! Error types for the demoscope core library.

use thiserror::Error;

/// Top-level error type for all demoscope operations.
///
/// Only [`DemoError::Structural`] is produced by the parse pipeline itself;
/// every other inconsistency in an event log is absorbed with a best-effort
/// default and reported through [`crate::ParseDiagnostics`].
#[derive(Error, Debug)]
pub enum DemoError {
    /// The top-level JSON value is neither an array of events nor an object
    /// carrying an `events` array.
    #[error("Unsupported demo layout: {0}")]
    Structural(String),

    /// The input could not be decoded as JSON.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience Result type alias.
pub type Result<T> = std::result::Result<T, DemoError>;
