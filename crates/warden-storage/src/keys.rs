//! Storage key constants.

/// Storage keys used by the auth engine
pub struct StorageKeys;

impl StorageKeys {
    /// Second-factor verification state (JSON document)
    pub const VERIFICATION_STATE: &'static str = "verification_state";

    /// Identity provider access token
    pub const PROVIDER_ACCESS_TOKEN: &'static str = "provider_access_token";

    /// Identity provider refresh token
    pub const PROVIDER_REFRESH_TOKEN: &'static str = "provider_refresh_token";

    /// Identity provider session metadata (JSON document)
    pub const PROVIDER_SESSION_META: &'static str = "provider_session_meta";
}
