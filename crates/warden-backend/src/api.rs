//! Accounts-service API surface consumed by the reconciler.

use crate::{BackendResult, SyncedUser, TotpSetup, TotpStatus};
use async_trait::async_trait;

/// Operations the reconciler needs from the accounts service.
///
/// Implemented over HTTP by [`crate::BackendClient`]; test suites substitute
/// a scripted implementation.
#[async_trait]
pub trait SyncApi: Send + Sync {
    /// Register or refresh the authenticated user, returning profile id and role.
    /// Idempotent; safe to call on every successful identity resolution.
    async fn sync_user(&self, access_token: &str) -> BackendResult<SyncedUser>;

    /// Provision a TOTP secret for the authenticated user.
    async fn setup_totp(&self, access_token: &str) -> BackendResult<TotpSetup>;

    /// Verify a TOTP code. Errors are classified as invalid / not configured
    /// / expired where the backend allows it.
    async fn verify_totp(&self, access_token: &str, code: &str) -> BackendResult<()>;

    /// Fetch whether TOTP is configured and verified for the user.
    async fn totp_status(&self, access_token: &str) -> BackendResult<TotpStatus>;
}
