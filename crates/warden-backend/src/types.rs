//! Wire types for the accounts service.

use serde::{Deserialize, Serialize};

/// Response of `POST /v1/users/sync`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncedUser {
    /// Profile id assigned by the accounts service.
    pub id: String,
    /// Role assigned to the user, when the service reports one.
    #[serde(default)]
    pub role: Option<String>,
}

/// Response of `GET /v1/users/me`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserInfo {
    /// Profile id, when reported.
    #[serde(default)]
    pub id: Option<String>,
    /// Role assigned to the user.
    #[serde(default)]
    pub role: Option<String>,
    /// Email on record.
    #[serde(default)]
    pub email: Option<String>,
}

/// Response of `POST /v1/auth/setup-totp`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TotpSetup {
    /// QR code (data URL) to scan with an authenticator app.
    pub qr_code: String,
    /// Raw shared secret, when the service exposes it.
    #[serde(default)]
    pub secret: Option<String>,
    /// Key for manual entry into an authenticator app.
    pub manual_entry_key: String,
}

/// Response of `GET /v1/auth/totp-status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TotpStatus {
    /// Whether a TOTP secret has been provisioned for the user.
    pub is_configured: bool,
    /// Whether the user has passed verification in the current session.
    pub is_verified: bool,
}

impl TotpStatus {
    /// Status for a user with no second factor configured.
    pub fn not_configured() -> Self {
        Self {
            is_configured: false,
            is_verified: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synced_user_tolerates_missing_role() {
        let user: SyncedUser = serde_json::from_str(r#"{"id": "profile-1"}"#).unwrap();
        assert_eq!(user.id, "profile-1");
        assert!(user.role.is_none());

        let user: SyncedUser =
            serde_json::from_str(r#"{"id": "profile-1", "role": "admin"}"#).unwrap();
        assert_eq!(user.role.as_deref(), Some("admin"));
    }

    #[test]
    fn totp_setup_tolerates_null_secret() {
        let setup: TotpSetup = serde_json::from_str(
            r#"{"qr_code": "data:image/png;base64,AAAA", "secret": null, "manual_entry_key": "ABCD EFGH"}"#,
        )
        .unwrap();
        assert!(setup.secret.is_none());
        assert_eq!(setup.manual_entry_key, "ABCD EFGH");
    }

    #[test]
    fn totp_status_roundtrip() {
        let status = TotpStatus {
            is_configured: true,
            is_verified: false,
        };
        let json = serde_json::to_string(&status).unwrap();
        assert!(json.contains("is_configured"));

        let parsed: TotpStatus = serde_json::from_str(&json).unwrap();
        assert!(parsed.is_configured);
        assert!(!parsed.is_verified);
    }
}
