//! Typed errors for the triage library.
//!
//! Uses `thiserror` for library errors (not `anyhow`) to provide
//! strongly-typed, composable error handling.
//!
//! The taxonomy is deliberately small: per-item and per-batch failures are
//! absorbed into `Failed` records and counters, and a cancelled run returns
//! `Ok` with partial results, so the only errors a caller ever sees from a
//! pipeline run are validation failures and fatal gateway failures.

use thiserror::Error;

/// Errors surfaced by the classification and deduplication pipelines.
#[derive(Debug, Error)]
pub enum TriageError {
    /// A precondition was violated before any gateway call was made
    /// (empty rubric, empty document set, session id already in use).
    #[error("validation error: {reason}")]
    Validation { reason: String },

    /// A gateway failure that cannot be recovered from locally.
    ///
    /// Only auth failures reach the caller this way; rate limits and
    /// transient faults degrade the affected batch instead.
    #[error("gateway error: {0}")]
    Gateway(#[from] GatewayError),
}

impl TriageError {
    /// Shorthand for a validation error.
    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation {
            reason: reason.into(),
        }
    }
}

/// Errors raised by AI and embedding gateway implementations.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Credentials rejected. Fatal for the whole run.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Upstream rate limit hit. The affected batch degrades to defaults.
    #[error("rate limit exceeded")]
    RateLimited,

    /// Transport or upstream fault. The affected batch degrades to defaults.
    #[error("transient gateway error: {0}")]
    Transient(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The gateway returned a body that could not be understood at all
    /// (missing choices, missing embedding data).
    #[error("invalid gateway response: {0}")]
    InvalidResponse(String),
}

impl GatewayError {
    /// Whether this error must abort the whole run.
    pub fn is_fatal(&self) -> bool {
        matches!(self, GatewayError::Auth(_))
    }

    /// Wrap an arbitrary transport error or message as `Transient`.
    pub fn transient(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Transient(err.into())
    }
}

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, TriageError>;

/// Result type alias for gateway operations.
pub type GatewayResult<T> = std::result::Result<T, GatewayError>;
