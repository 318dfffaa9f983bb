//! HTTP client for the accounts service.

use crate::{
    BackendError, BackendResult, RetryConfig, SyncApi, SyncedUser, TotpSetup, TotpStatus, UserInfo,
};
use async_trait::async_trait;
use serde::Serialize;
use std::future::Future;
use tracing::{debug, warn};

/// Request body for `POST /v1/auth/verify-totp`.
#[derive(Debug, Serialize)]
struct VerifyTotpRequest<'a> {
    totp_code: &'a str,
}

/// Accounts-service REST client.
#[derive(Clone)]
pub struct BackendClient {
    http_client: reqwest::Client,
    api_url: String,
    retry: RetryConfig,
}

impl BackendClient {
    /// Create a new client.
    ///
    /// # Arguments
    /// * `api_url` - Base URL of the accounts service (e.g. `http://localhost:8001`)
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            api_url: api_url.into(),
            retry: RetryConfig::default(),
        }
    }

    /// Create a new client with custom retry configuration.
    pub fn with_retry_config(api_url: impl Into<String>, retry: RetryConfig) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            api_url: api_url.into(),
            retry,
        }
    }

    /// Build the full URL for an API path.
    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.api_url.trim_end_matches('/'), path)
    }

    /// Run a call, retrying on transient errors with exponential backoff.
    ///
    /// Only used for idempotent calls.
    async fn with_retry<T, F, Fut>(&self, label: &str, mut call: F) -> BackendResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = BackendResult<T>>,
    {
        let mut last_error = None;

        for attempt in 0..=self.retry.max_retries {
            match call().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < self.retry.max_retries => {
                    let delay = self.retry.delay_for_attempt(attempt);
                    warn!(
                        call = label,
                        attempt = attempt + 1,
                        max_retries = self.retry.max_retries,
                        delay_ms = delay.as_millis(),
                        error = %e,
                        "Transient backend error, retrying"
                    );
                    last_error = Some(e);
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or(BackendError::RetriesExhausted(self.retry.max_retries)))
    }

    async fn post_sync(&self, access_token: &str) -> BackendResult<SyncedUser> {
        let url = self.endpoint("/v1/users/sync");
        debug!(url = %url, "Syncing user with accounts service");

        let response = self
            .http_client
            .post(&url)
            .header("Authorization", format!("Bearer {}", access_token))
            .header("Content-Type", "application/json")
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            warn!(status, body = %body, "User sync failed");
            return Err(BackendError::Status { status, body });
        }

        Ok(response.json().await?)
    }

    /// Fetch the current user's profile (`GET /v1/users/me`).
    pub async fn fetch_me(&self, access_token: &str) -> BackendResult<UserInfo> {
        let url = self.endpoint("/v1/users/me");
        debug!(url = %url, "Fetching user profile");

        let response = self
            .http_client
            .get(&url)
            .header("Authorization", format!("Bearer {}", access_token))
            .header("Accept", "application/json")
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            warn!(status, body = %body, "Profile fetch failed");
            return Err(BackendError::Status { status, body });
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl SyncApi for BackendClient {
    async fn sync_user(&self, access_token: &str) -> BackendResult<SyncedUser> {
        let mut user = self
            .with_retry("sync_user", || self.post_sync(access_token))
            .await?;

        // Some deployments omit the role from the sync response; fall back to
        // the profile endpoint rather than leaving the caller roleless.
        if user.role.is_none() {
            match self.fetch_me(access_token).await {
                Ok(info) => user.role = info.role,
                Err(error) => {
                    warn!(%error, "Role fallback via /v1/users/me failed");
                }
            }
        }

        debug!(profile_id = %user.id, role = ?user.role, "User synced");
        Ok(user)
    }

    async fn setup_totp(&self, access_token: &str) -> BackendResult<TotpSetup> {
        let url = self.endpoint("/v1/auth/setup-totp");
        debug!(url = %url, "Provisioning TOTP secret");

        let response = self
            .http_client
            .post(&url)
            .header("Authorization", format!("Bearer {}", access_token))
            .header("Content-Type", "application/json")
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            warn!(status, body = %body, "TOTP setup failed");
            return Err(BackendError::Status { status, body });
        }

        Ok(response.json().await?)
    }

    async fn verify_totp(&self, access_token: &str, code: &str) -> BackendResult<()> {
        let url = self.endpoint("/v1/auth/verify-totp");
        debug!(url = %url, "Verifying TOTP code");

        let response = self
            .http_client
            .post(&url)
            .header("Authorization", format!("Bearer {}", access_token))
            .header("Content-Type", "application/json")
            .json(&VerifyTotpRequest { totp_code: code })
            .send()
            .await?;

        let status = response.status().as_u16();
        if response.status().is_success() {
            debug!("TOTP code accepted");
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        warn!(status, body = %body, "TOTP verification rejected");
        Err(classify_verify_failure(status, &body))
    }

    async fn totp_status(&self, access_token: &str) -> BackendResult<TotpStatus> {
        let url = self.endpoint("/v1/auth/totp-status");

        let result = self
            .with_retry("totp_status", || async {
                let response = self
                    .http_client
                    .get(&url)
                    .header("Authorization", format!("Bearer {}", access_token))
                    .header("Accept", "application/json")
                    .send()
                    .await?;

                if !response.status().is_success() {
                    let status = response.status().as_u16();
                    let body = response.text().await.unwrap_or_default();
                    return Err(BackendError::Status { status, body });
                }

                Ok(response.json::<TotpStatus>().await?)
            })
            .await;

        match result {
            Ok(status) => Ok(status),
            // An unauthenticated or unknown user simply has no TOTP configured.
            Err(BackendError::Status { status, .. }) if status == 401 || status == 404 => {
                debug!(status, "Treating TOTP status response as not configured");
                Ok(TotpStatus::not_configured())
            }
            Err(e) => Err(e),
        }
    }
}

/// Map a failed verify response onto the second-factor error taxonomy.
fn classify_verify_failure(status: u16, body: &str) -> BackendError {
    let detail = error_detail(body);
    match status {
        400 => BackendError::SecondFactorInvalid(
            detail.unwrap_or_else(|| "Invalid second-factor code".to_string()),
        ),
        404 => BackendError::SecondFactorNotConfigured,
        410 => BackendError::SecondFactorExpired,
        _ => BackendError::Status {
            status,
            body: body.to_string(),
        },
    }
}

/// Extract the `detail` field from an error response body, when present.
fn error_detail(body: &str) -> Option<String> {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()?
        .get("detail")?
        .as_str()
        .map(String::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_building() {
        let client = BackendClient::new("http://localhost:8001");
        assert_eq!(
            client.endpoint("/v1/users/sync"),
            "http://localhost:8001/v1/users/sync"
        );

        let client = BackendClient::new("http://localhost:8001/");
        assert_eq!(
            client.endpoint("/v1/auth/totp-status"),
            "http://localhost:8001/v1/auth/totp-status"
        );
    }

    #[test]
    fn verify_failure_classification() {
        match classify_verify_failure(400, r#"{"detail": "Code out of window"}"#) {
            BackendError::SecondFactorInvalid(msg) => assert_eq!(msg, "Code out of window"),
            other => panic!("Expected SecondFactorInvalid, got {:?}", other),
        }

        match classify_verify_failure(400, "not json") {
            BackendError::SecondFactorInvalid(msg) => {
                assert_eq!(msg, "Invalid second-factor code")
            }
            other => panic!("Expected SecondFactorInvalid, got {:?}", other),
        }

        assert!(matches!(
            classify_verify_failure(404, ""),
            BackendError::SecondFactorNotConfigured
        ));
        assert!(matches!(
            classify_verify_failure(410, ""),
            BackendError::SecondFactorExpired
        ));
        assert!(matches!(
            classify_verify_failure(500, "boom"),
            BackendError::Status { status: 500, .. }
        ));
    }

    #[test]
    fn error_detail_extraction() {
        assert_eq!(
            error_detail(r#"{"detail": "nope"}"#),
            Some("nope".to_string())
        );
        assert_eq!(error_detail(r#"{"message": "nope"}"#), None);
        assert_eq!(error_detail("plain text"), None);
    }

    #[test]
    fn verify_request_serialization() {
        let body = serde_json::to_string(&VerifyTotpRequest {
            totp_code: "123456",
        })
        .unwrap();
        assert_eq!(body, r#"{"totp_code":"123456"}"#);
    }
}
