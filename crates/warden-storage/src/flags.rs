//! High-level API for the flags the auth engine persists.

use crate::{FlagStore, StorageError, StorageKeys, StorageResult};
use serde::{Deserialize, Serialize};

/// Second-factor verification state.
///
/// Stored as a single JSON document so it is written and cleared as a unit:
/// `verified`, `verified_user_id` and `session_id` can never be observed
/// half-reset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationState {
    /// Whether the second factor has been passed for this session.
    pub verified: bool,
    /// Identity user id the verification belongs to.
    #[serde(default)]
    pub verified_user_id: Option<String>,
    /// Opaque verification session identifier, when the backend issued one.
    #[serde(default)]
    pub session_id: Option<String>,
}

impl VerificationState {
    /// A verified state bound to the given user id.
    pub fn verified_for(user_id: &str) -> Self {
        Self {
            verified: true,
            verified_user_id: Some(user_id.to_string()),
            session_id: None,
        }
    }

    /// True when this state marks the given user id as verified.
    pub fn covers(&self, user_id: &str) -> bool {
        self.verified && self.verified_user_id.as_deref() == Some(user_id)
    }
}

/// Identity provider session metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSessionMeta {
    /// User id issued by the identity provider
    pub user_id: String,
    /// User email, when the provider shared one
    #[serde(default)]
    pub email: Option<String>,
    /// When the cached access token expires (RFC 3339 timestamp)
    pub expires_at: String,
}

/// High-level API for storing and retrieving the persisted auth flags.
pub struct PersistedFlags {
    store: Box<dyn FlagStore>,
}

impl PersistedFlags {
    /// Create a new manager with the given storage backend.
    pub fn new(store: Box<dyn FlagStore>) -> Self {
        Self { store }
    }

    // ==========================================
    // Second-factor verification state
    // ==========================================

    /// Retrieve the verification state; a missing document reads as unverified.
    pub fn get_verification(&self) -> StorageResult<VerificationState> {
        match self.store.get(StorageKeys::VERIFICATION_STATE)? {
            Some(json) => serde_json::from_str(&json)
                .map_err(|e| StorageError::Encoding(e.to_string())),
            None => Ok(VerificationState::default()),
        }
    }

    /// Store the verification state as one document.
    pub fn set_verification(&self, state: &VerificationState) -> StorageResult<()> {
        let json =
            serde_json::to_string(state).map_err(|e| StorageError::Encoding(e.to_string()))?;
        self.store.set(StorageKeys::VERIFICATION_STATE, &json)
    }

    /// Remove the verification state document.
    pub fn clear_verification(&self) -> StorageResult<()> {
        let _ = self.store.remove(StorageKeys::VERIFICATION_STATE)?;
        Ok(())
    }

    // ==========================================
    // Identity provider session
    // ==========================================

    /// Store provider access token
    pub fn set_provider_access_token(&self, token: &str) -> StorageResult<()> {
        self.store.set(StorageKeys::PROVIDER_ACCESS_TOKEN, token)
    }

    /// Retrieve provider access token
    pub fn get_provider_access_token(&self) -> StorageResult<Option<String>> {
        self.store.get(StorageKeys::PROVIDER_ACCESS_TOKEN)
    }

    /// Store provider refresh token
    pub fn set_provider_refresh_token(&self, token: &str) -> StorageResult<()> {
        self.store.set(StorageKeys::PROVIDER_REFRESH_TOKEN, token)
    }

    /// Retrieve provider refresh token
    pub fn get_provider_refresh_token(&self) -> StorageResult<Option<String>> {
        self.store.get(StorageKeys::PROVIDER_REFRESH_TOKEN)
    }

    /// Store provider session metadata
    pub fn set_provider_session_meta(&self, meta: &ProviderSessionMeta) -> StorageResult<()> {
        let json =
            serde_json::to_string(meta).map_err(|e| StorageError::Encoding(e.to_string()))?;
        self.store.set(StorageKeys::PROVIDER_SESSION_META, &json)
    }

    /// Retrieve provider session metadata
    pub fn get_provider_session_meta(&self) -> StorageResult<Option<ProviderSessionMeta>> {
        match self.store.get(StorageKeys::PROVIDER_SESSION_META)? {
            Some(json) => {
                let meta: ProviderSessionMeta = serde_json::from_str(&json)
                    .map_err(|e| StorageError::Encoding(e.to_string()))?;
                Ok(Some(meta))
            }
            None => Ok(None),
        }
    }

    /// Store a complete provider session (tokens + metadata).
    pub fn set_provider_session(
        &self,
        access_token: &str,
        refresh_token: &str,
        meta: &ProviderSessionMeta,
    ) -> StorageResult<()> {
        self.set_provider_access_token(access_token)?;
        self.set_provider_refresh_token(refresh_token)?;
        self.set_provider_session_meta(meta)?;
        Ok(())
    }

    /// Check if a provider session exists.
    pub fn has_provider_session(&self) -> StorageResult<bool> {
        let has_token = self.store.has(StorageKeys::PROVIDER_ACCESS_TOKEN)?;
        let has_meta = self.store.has(StorageKeys::PROVIDER_SESSION_META)?;
        Ok(has_token && has_meta)
    }

    /// Check if the cached provider session is expired.
    pub fn is_provider_session_expired(&self) -> StorageResult<bool> {
        match self.get_provider_session_meta()? {
            Some(meta) => {
                let expires_at = chrono::DateTime::parse_from_rfc3339(&meta.expires_at)
                    .map_err(|e| StorageError::Encoding(e.to_string()))?;
                let now = chrono::Utc::now();
                // Treat tokens with under a minute left as already expired
                Ok(expires_at.signed_duration_since(now).num_seconds() < 60)
            }
            None => Ok(true),
        }
    }

    /// Clear the cached provider session.
    pub fn clear_provider_session(&self) -> StorageResult<()> {
        let _ = self.store.remove(StorageKeys::PROVIDER_ACCESS_TOKEN);
        let _ = self.store.remove(StorageKeys::PROVIDER_REFRESH_TOKEN);
        let _ = self.store.remove(StorageKeys::PROVIDER_SESSION_META);
        Ok(())
    }

    // ==========================================
    // Clear All
    // ==========================================

    /// Clear every persisted flag.
    pub fn clear_all(&self) -> StorageResult<()> {
        let _ = self.store.remove(StorageKeys::VERIFICATION_STATE);
        let _ = self.store.remove(StorageKeys::PROVIDER_ACCESS_TOKEN);
        let _ = self.store.remove(StorageKeys::PROVIDER_REFRESH_TOKEN);
        let _ = self.store.remove(StorageKeys::PROVIDER_SESSION_META);
        Ok(())
    }
}
