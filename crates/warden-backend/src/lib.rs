//! REST client for the backend accounts service.
//!
//! This crate provides:
//! - User synchronization (`POST /v1/users/sync`) with a `/v1/users/me`
//!   fallback when the sync response carries no role
//! - Second-factor (TOTP) setup, verification and status endpoints
//! - Retry with exponential backoff on transient failures

mod api;
mod client;
mod error;
mod retry;
mod types;

pub use api::SyncApi;
pub use client::BackendClient;
pub use error::{BackendError, BackendResult};
pub use retry::RetryConfig;
pub use types::{SyncedUser, TotpSetup, TotpStatus, UserInfo};
