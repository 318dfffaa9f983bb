//! Reconciler error taxonomy.

use thiserror::Error;
use warden_backend::BackendError;
use warden_provider::ProviderError;
use warden_storage::StorageError;

/// Error type for the auth reconciliation core.
#[derive(Error, Debug)]
pub enum AuthError {
    /// Signed-in email is outside the allowed organizational domain
    #[error("Email outside the allowed domain: {0}")]
    DomainRejected(String),

    /// Id token could not be obtained (degraded, non-fatal)
    #[error("Id token unavailable: {0}")]
    TokenUnavailable(String),

    /// Backend user sync failed (non-fatal, logged)
    #[error("User sync failed: {0}")]
    SyncFailed(String),

    /// Second-factor code was rejected
    #[error("Second-factor code rejected: {0}")]
    SecondFactorInvalid(String),

    /// Second factor has not been configured for this user
    #[error("Second factor is not configured")]
    SecondFactorNotConfigured,

    /// Second-factor code expired
    #[error("Second-factor code expired")]
    SecondFactorExpired,

    /// A user switch landed while the verification was in flight
    #[error("Verification superseded by a newer session")]
    VerificationSuperseded,

    /// No identity is signed in
    #[error("Not signed in")]
    NotSignedIn,

    /// Invalid status machine transition
    #[error("Invalid auth state transition: {0}")]
    InvalidStateTransition(String),

    /// Identity provider error
    #[error("Identity provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Flag store error
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Uncategorized backend error
    #[error("Backend error: {0}")]
    Backend(BackendError),
}

impl From<BackendError> for AuthError {
    /// Lift backend errors, keeping the second-factor classification intact
    /// so `complete_second_factor` callers can give field-level feedback.
    fn from(error: BackendError) -> Self {
        match error {
            BackendError::SecondFactorInvalid(message) => AuthError::SecondFactorInvalid(message),
            BackendError::SecondFactorNotConfigured => AuthError::SecondFactorNotConfigured,
            BackendError::SecondFactorExpired => AuthError::SecondFactorExpired,
            other => AuthError::Backend(other),
        }
    }
}

/// Result type alias using AuthError.
pub type AuthResult<T> = Result<T, AuthError>;
