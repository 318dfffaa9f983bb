//! Backend client error types.

use thiserror::Error;

/// Error type for backend accounts-service calls.
#[derive(Error, Debug)]
pub enum BackendError {
    /// Second-factor code was rejected
    #[error("Second-factor code rejected: {0}")]
    SecondFactorInvalid(String),

    /// Second factor has not been configured for this user
    #[error("Second factor is not configured")]
    SecondFactorNotConfigured,

    /// Second-factor code expired
    #[error("Second-factor code expired")]
    SecondFactorExpired,

    /// Non-success HTTP status from the backend
    #[error("Backend returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// HTTP transport error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Retries exhausted
    #[error("Backend call failed after {0} attempts")]
    RetriesExhausted(u32),
}

impl BackendError {
    /// Returns true if this error is transient and the call can be retried.
    ///
    /// Transient errors include:
    /// - Connection failures and timeouts
    /// - HTTP 429 (rate limited)
    /// - HTTP 5xx server errors
    pub fn is_transient(&self) -> bool {
        match self {
            BackendError::Status { status, .. } => *status == 429 || (500..600).contains(status),
            BackendError::Http(e) => {
                if e.is_connect() || e.is_timeout() {
                    return true;
                }
                if let Some(status) = e.status() {
                    return status.is_server_error() || status.as_u16() == 429;
                }
                false
            }
            _ => false,
        }
    }
}

/// Result type alias using BackendError.
pub type BackendResult<T> = Result<T, BackendError>;
