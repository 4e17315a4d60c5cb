//! Error types for the MegaRAID exporter

use std::time::Duration;

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the MegaRAID exporter
#[derive(Error, Debug)]
pub enum Error {
    /// Diagnostic binary missing or not executable
    #[error("Diagnostic binary unavailable at path: {path:?}")]
    BinaryUnavailable { path: String },

    /// Subprocess invocation failed
    #[error(transparent)]
    Invoke(#[from] InvokeError),

    /// Diagnostic output had an unexpected shape
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// Prometheus descriptor or encoding error
    #[error("Prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

// =============================================================================
// Subprocess Errors
// =============================================================================

/// Classified failure of one diagnostic-tool invocation
#[derive(Error, Debug)]
pub enum InvokeError {
    /// Path is empty or nothing exists there
    #[error("Diagnostic binary not found: {path:?}")]
    BinaryNotFound { path: String },

    /// Binary exists but cannot be executed
    #[error("Permission denied executing {path}")]
    PermissionDenied { path: String },

    /// Process exited unsuccessfully
    #[error("Diagnostic command exited with code {code:?}: {stderr}")]
    NonZeroExit { code: Option<i32>, stderr: String },

    /// Process did not finish in time and was killed
    #[error("Diagnostic command timed out after {0:?}")]
    Timeout(Duration),

    /// Process succeeded but printed nothing
    #[error("Diagnostic command produced no output")]
    EmptyOutput,

    /// Any other spawn or wait failure
    #[error("Failed to run diagnostic command: {0}")]
    Io(#[source] std::io::Error),
}

// =============================================================================
// Parse Errors
// =============================================================================

/// Failure to turn diagnostic output into entities
#[derive(Error, Debug)]
pub enum ParseError {
    /// JSON did not match the expected controller-block layout
    #[error("Malformed JSON: {0}")]
    MalformedJson(#[from] serde_json::Error),
}

// =============================================================================
// Normalization Errors
// =============================================================================

/// Failure to normalize a single field
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NormalizationError {
    /// Numeric field had no value after the key
    #[error("Empty value for key {key:?}")]
    EmptyValue { key: String },

    /// Numeric field value did not parse
    #[error("Failed to parse numeric value {token:?} for key {key:?}")]
    UnparsableNumber { key: String, token: String },
}
