//! Error types for release-radar
//!
//! Each layer owns a `thiserror` enum. `RadarError` aggregates them at the
//! task boundary where the orchestrator logs and isolates failures.

use thiserror::Error;

/// Errors returned by the upstream catalog API
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ApiError {
    /// HTTP 429, carrying the retry delay in seconds
    #[error("Rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// Network or IO failure before a response was received
    #[error("Transport error: {0}")]
    Transport(String),

    /// Non-2xx, non-429 response
    #[error("Upstream error: HTTP {status}: {message}")]
    Upstream { status: u16, message: String },

    /// Response body could not be decoded
    #[error("Invalid data: {0}")]
    InvalidData(String),
}

/// Errors from the credential provider
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CredentialError {
    /// No stored credential (or no refresh token) for the user
    #[error("No credential for user {0}")]
    NoCredential(String),

    /// Refreshing an expired credential failed
    #[error("Credential refresh failed: {0}")]
    RefreshFailed(String),

    /// Token store could not be read or written
    #[error("Credential storage error: {0}")]
    Storage(String),
}

/// Release date parsing errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DateError {
    /// Precision tag other than day, month or year
    #[error("Unsupported release date precision: {0}")]
    UnsupportedPrecision(String),

    /// Date string does not match its precision
    #[error("Invalid release date {value:?} for precision {precision}")]
    InvalidDate { value: String, precision: String },
}

/// Database-related errors
#[derive(Debug, Error)]
pub enum DbError {
    /// SQLite error
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Error from the background connection thread
    #[error("Database connection error: {0}")]
    Connection(#[from] tokio_rusqlite::Error),

    /// Record not found
    #[error("Record not found")]
    NotFound,
}

/// Task-level error
///
/// Everything that can abort detection or write-back for a single task.
#[derive(Debug, Error)]
pub enum RadarError {
    /// Task does not exist
    #[error("Task {0} not found")]
    TaskNotFound(i64),

    /// Task platform is not handled by this engine
    #[error("Unsupported platform: {0}")]
    UnsupportedPlatform(String),

    /// Task watches an entity kind that cannot produce releases
    #[error("Unsupported watch item kind: {0}")]
    UnsupportedWatchItemKind(String),

    /// Album carries an unknown release date precision
    #[error("Unsupported release date precision: {0}")]
    UnsupportedPrecision(String),

    /// Album release date does not parse
    #[error("Invalid release date {value:?} for precision {precision}")]
    InvalidReleaseDate { value: String, precision: String },

    /// Active task without a destination playlist
    #[error("Task {0} has no destination playlist")]
    MissingDestination(i64),

    /// Credential error
    #[error("Credential error: {0}")]
    Credential(#[from] CredentialError),

    /// Catalog API error
    #[error("Catalog API error: {0}")]
    Api(#[from] ApiError),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] DbError),
}

impl From<DateError> for RadarError {
    fn from(err: DateError) -> Self {
        match err {
            DateError::UnsupportedPrecision(p) => RadarError::UnsupportedPrecision(p),
            DateError::InvalidDate { value, precision } => {
                RadarError::InvalidReleaseDate { value, precision }
            }
        }
    }
}

/// Errors from the manual-run handle
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SchedulerError {
    /// The scheduler loop is not running
    #[error("Scheduler not running")]
    NotRunning,

    /// The scheduler dropped the request without answering
    #[error("No response from scheduler")]
    NoResponse,
}

/// Trait for determining if an error is retryable
pub trait RetryableError {
    /// Returns true if the error is retryable
    fn is_retryable(&self) -> bool;

    /// Server-supplied delay before the next attempt, if any
    fn retry_after_secs(&self) -> Option<u64> {
        None
    }
}

impl RetryableError for ApiError {
    fn is_retryable(&self) -> bool {
        matches!(self, ApiError::RateLimited(_))
    }

    fn retry_after_secs(&self) -> Option<u64> {
        match self {
            ApiError::RateLimited(secs) => Some(*secs),
            _ => None,
        }
    }
}
