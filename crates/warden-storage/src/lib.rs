//! Persisted session flag storage for the Warden auth engine.
//!
//! This crate provides a small durable key-value store scoped to the local
//! profile, plus a typed manager for the flags the auth engine persists
//! across restarts:
//! - the second-factor verification state (one JSON document, so a flag-set
//!   is written and cleared as a unit)
//! - the identity provider's cached token material

mod file;
mod flags;
mod keys;
mod memory;
mod traits;

pub use file::JsonFileStore;
pub use flags::{PersistedFlags, ProviderSessionMeta, VerificationState};
pub use keys::StorageKeys;
pub use memory::MemoryFlagStore;
pub use traits::FlagStore;

use thiserror::Error;

/// Error type for flag store operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Backend-specific storage error
    #[error("Storage backend error: {0}")]
    Backend(String),

    /// Encoding/decoding error
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for flag store operations.
pub type StorageResult<T> = Result<T, StorageError>;
