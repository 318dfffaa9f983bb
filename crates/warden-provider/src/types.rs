//! Identity and event types.

use serde::{Deserialize, Serialize};

/// The authenticated principal reported by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Stable user id issued by the provider.
    pub uid: String,
    /// Email address, when the provider shared one.
    #[serde(default)]
    pub email: Option<String>,
}

impl Identity {
    /// Create an identity with an email.
    pub fn new(uid: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            email: Some(email.into()),
        }
    }
}

/// Event delivered on the provider's subscription channel.
///
/// Events are emitted in order; `StateChanged(None)` means no identity is
/// signed in (initial announcement or sign-out).
#[derive(Debug, Clone)]
pub enum ProviderEvent {
    /// The signed-in identity changed (or was cleared).
    StateChanged(Option<Identity>),
    /// The provider itself failed (network, misconfiguration).
    Faulted(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_serde_tolerates_missing_email() {
        let identity: Identity = serde_json::from_str(r#"{"uid": "u1"}"#).unwrap();
        assert_eq!(identity.uid, "u1");
        assert!(identity.email.is_none());
    }
}
