//! Identity provider error types.

use thiserror::Error;

/// Error type for identity provider operations.
#[derive(Error, Debug)]
pub enum ProviderError {
    /// Interactive sign-in failed or was rejected
    #[error("Sign-in failed: {0}")]
    SignIn(String),

    /// Token refresh failed
    #[error("Token refresh failed: {0}")]
    TokenRefresh(String),

    /// No provider session exists
    #[error("Not signed in")]
    NotSignedIn,

    /// Interactive sign-in timed out
    #[error("Sign-in timed out")]
    Timeout,

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(#[from] warden_storage::StorageError),

    /// HTTP request error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias using ProviderError.
pub type ProviderResult<T> = Result<T, ProviderError>;
