//! Session data owned by the reconciler.

use crate::AuthStatus;
use serde::Serialize;
use warden_provider::Identity;

/// The session the reconciler maintains for the signed-in identity.
///
/// Mutated only in response to provider events or explicit sign-in/sign-out
/// calls; dropped entirely on sign-out, domain rejection or provider fault.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// User id issued by the identity provider.
    pub identity_user_id: String,
    /// Email reported by the provider.
    pub email: Option<String>,
    /// Most recent id token, when one could be obtained.
    pub id_token: Option<String>,
    /// Role reported by the backend sync endpoint.
    pub role: Option<String>,
    /// Profile id assigned by the backend.
    pub profile_id: Option<String>,
}

impl Session {
    /// Start a session for a freshly reported identity. Token, role and
    /// profile id are filled in by the async continuations.
    pub fn from_identity(identity: &Identity) -> Self {
        Self {
            identity_user_id: identity.uid.clone(),
            email: identity.email.clone(),
            id_token: None,
            role: None,
            profile_id: None,
        }
    }
}

/// Read-only view of the reconciler state for consumers.
#[derive(Debug, Clone, Serialize)]
pub struct AuthSnapshot {
    /// Current status.
    pub status: AuthStatus,
    /// Identity user id, when signed in.
    pub user_id: Option<String>,
    /// Email, when known.
    pub email: Option<String>,
    /// Backend role, once sync completed.
    pub role: Option<String>,
    /// Backend profile id, once sync completed.
    pub profile_id: Option<String>,
    /// Whether the second factor is verified for the current user.
    pub second_factor_verified: bool,
    /// Most recent surfaced error, if any.
    pub last_error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_starts_with_identity_fields_only() {
        let identity = Identity::new("u1", "a@warden.dev");
        let session = Session::from_identity(&identity);
        assert_eq!(session.identity_user_id, "u1");
        assert_eq!(session.email.as_deref(), Some("a@warden.dev"));
        assert!(session.id_token.is_none());
        assert!(session.role.is_none());
        assert!(session.profile_id.is_none());
    }
}
