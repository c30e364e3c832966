//! Error types for the memory bridge.

use thiserror::Error;

/// Memory bridge error type.
#[derive(Debug, Error)]
pub enum MemoryError {
    /// No API key configured; the remote call was never attempted.
    #[error("memory service API key is not configured")]
    MissingCredential,
    /// Network-level failure talking to the memory service.
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// The memory service answered with a non-success status.
    #[error("memory service returned status {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body (possibly truncated).
        body: String,
    },
    /// A single attempt exceeded its time budget.
    #[error("request timed out after {timeout_ms}ms")]
    Timeout {
        /// Configured per-attempt timeout.
        timeout_ms: u64,
    },
    /// Response body could not be interpreted.
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    /// Dashboard config update rejected.
    #[error("invalid config update: {}", .0.join("; "))]
    Validation(Vec<String>),
    /// Invalid configuration or unsupported values.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// URL parse error.
    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),
    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Regex compilation error.
    #[error("regex error: {0}")]
    Regex(#[from] regex::Error),
}

impl MemoryError {
    /// Check if this error is worth another attempt.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Http(_) | Self::Status { .. } | Self::Timeout { .. }
        )
    }
}

/// Convenience result alias for memory operations.
pub type MemoryResult<T> = Result<T, MemoryError>;
