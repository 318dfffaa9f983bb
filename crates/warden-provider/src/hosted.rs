//! Hosted identity provider backed by the web console login flow.

use crate::{Identity, IdentityProvider, ProviderError, ProviderEvent, ProviderResult};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;
use warden_storage::{PersistedFlags, ProviderSessionMeta};

/// Default interval between login status polls.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 2;

/// Default timeout for the interactive sign-in flow.
pub const DEFAULT_LOGIN_TIMEOUT_SECS: u64 = 120;

/// Login status poll response.
#[derive(Debug, Deserialize)]
struct LoginStatusResponse {
    status: String,
    #[serde(default)]
    session: Option<LoginSession>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LoginSession {
    access_token: String,
    refresh_token: String,
    expires_at: String,
    user_id: String,
    #[serde(default)]
    email: Option<String>,
}

/// Token refresh request.
#[derive(Debug, serde::Serialize)]
struct RefreshRequest {
    refresh_token: String,
}

/// Token refresh response.
#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access_token: String,
    refresh_token: String,
    expires_in: i64,
    user: RefreshUser,
}

#[derive(Debug, Deserialize)]
struct RefreshUser {
    id: String,
    #[serde(default)]
    email: Option<String>,
}

/// Identity provider implemented over the hosted web login flow.
///
/// Interactive sign-in hands off to the browser (the popup analog): a login
/// URL carrying a fresh login id is surfaced to the user, and the provider
/// polls the status endpoint until the web flow completes. Token material is
/// cached through [`PersistedFlags`] so the identity survives restarts, the
/// way a browser SDK keeps its session in profile storage.
pub struct HostedProvider {
    http_client: reqwest::Client,
    web_app_url: String,
    auth_api_url: String,
    flags: Arc<PersistedFlags>,
    listeners: Mutex<Vec<mpsc::UnboundedSender<ProviderEvent>>>,
    poll_interval: Duration,
    login_timeout: Duration,
}

impl HostedProvider {
    /// Create a new provider.
    ///
    /// # Arguments
    /// * `web_app_url` - Web console URL hosting the login page and status endpoint
    /// * `auth_api_url` - Identity service URL used for token refresh
    /// * `flags` - Persisted store for cached token material
    pub fn new(
        web_app_url: impl Into<String>,
        auth_api_url: impl Into<String>,
        flags: Arc<PersistedFlags>,
    ) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            web_app_url: web_app_url.into().trim_end_matches('/').to_string(),
            auth_api_url: auth_api_url.into().trim_end_matches('/').to_string(),
            flags,
            listeners: Mutex::new(Vec::new()),
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            login_timeout: Duration::from_secs(DEFAULT_LOGIN_TIMEOUT_SECS),
        }
    }

    /// Override the poll interval and login timeout.
    pub fn with_timeouts(mut self, poll_interval: Duration, login_timeout: Duration) -> Self {
        self.poll_interval = poll_interval;
        self.login_timeout = login_timeout;
        self
    }

    /// Login page URL for a given login id.
    pub fn login_url(&self, login_id: &str) -> String {
        format!("{}/console-auth?login_id={}", self.web_app_url, login_id)
    }

    fn status_url(&self, login_id: &str) -> String {
        format!(
            "{}/api/console-login-status?login_id={}",
            self.web_app_url, login_id
        )
    }

    fn refresh_url(&self) -> String {
        format!("{}/v1/token?grant_type=refresh_token", self.auth_api_url)
    }

    fn emit(&self, event: ProviderEvent) {
        let mut listeners = self.listeners.lock().unwrap();
        listeners.retain(|sender| sender.send(event.clone()).is_ok());
    }

    fn cached_identity(&self) -> ProviderResult<Option<Identity>> {
        Ok(self.flags.get_provider_session_meta()?.map(|meta| Identity {
            uid: meta.user_id,
            email: meta.email,
        }))
    }

    /// Announce the current identity to subscribers.
    ///
    /// Call once at startup, after subscribing: emits `StateChanged(Some)` if
    /// a usable cached session exists (refreshing an expired one first), and
    /// `StateChanged(None)` otherwise. This is the restart analog of an auth
    /// SDK firing its subscription callback immediately with the current user.
    pub async fn announce(&self) -> ProviderResult<()> {
        if !self.flags.has_provider_session()? {
            debug!("No cached provider session to announce");
            self.emit(ProviderEvent::StateChanged(None));
            return Ok(());
        }

        if self.flags.is_provider_session_expired()? {
            info!("Cached provider session expired, refreshing before announce");
            if let Err(error) = self.refresh_token().await {
                warn!(%error, "Session refresh failed on announce, clearing cached session");
                self.flags.clear_provider_session()?;
                self.emit(ProviderEvent::StateChanged(None));
                return Ok(());
            }
        }

        let identity = self.cached_identity()?;
        self.emit(ProviderEvent::StateChanged(identity));
        Ok(())
    }

    /// Refresh the cached token through the identity service.
    async fn refresh_token(&self) -> ProviderResult<String> {
        let refresh_token = self
            .flags
            .get_provider_refresh_token()?
            .ok_or(ProviderError::NotSignedIn)?;

        let url = self.refresh_url();
        debug!(url = %url, "Refreshing provider token");

        let response = self
            .http_client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&RefreshRequest { refresh_token })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, body = %body, "Provider token refresh failed");
            return Err(ProviderError::TokenRefresh(format!(
                "HTTP {}: {}",
                status, body
            )));
        }

        let data: RefreshResponse = response.json().await?;
        let expires_at = chrono::Utc::now() + chrono::Duration::seconds(data.expires_in);

        self.flags.set_provider_session(
            &data.access_token,
            &data.refresh_token,
            &ProviderSessionMeta {
                user_id: data.user.id.clone(),
                email: data.user.email.clone(),
                expires_at: expires_at.to_rfc3339(),
            },
        )?;

        debug!(user_id = %data.user.id, "Provider token refreshed");
        Ok(data.access_token)
    }
}

#[async_trait]
impl IdentityProvider for HostedProvider {
    fn subscribe(&self) -> mpsc::UnboundedReceiver<ProviderEvent> {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.listeners.lock().unwrap().push(sender);
        receiver
    }

    async fn sign_in_interactive(&self) -> ProviderResult<Identity> {
        let login_id = Uuid::new_v4().to_string();
        let login_url = self.login_url(&login_id);
        info!(login_url = %login_url, "Open the login page in a browser to continue");

        let status_url = self.status_url(&login_id);
        let deadline = tokio::time::Instant::now() + self.login_timeout;

        loop {
            if tokio::time::Instant::now() >= deadline {
                return Err(ProviderError::Timeout);
            }

            let response = self.http_client.get(&status_url).send().await?;
            let payload: LoginStatusResponse = response.json().await?;

            match payload.status.as_str() {
                "pending" => {
                    tokio::time::sleep(self.poll_interval).await;
                }
                "success" => {
                    let session = payload.session.ok_or_else(|| {
                        ProviderError::SignIn("Login completed without a session".to_string())
                    })?;

                    self.flags.set_provider_session(
                        &session.access_token,
                        &session.refresh_token,
                        &ProviderSessionMeta {
                            user_id: session.user_id.clone(),
                            email: session.email.clone(),
                            expires_at: session.expires_at.clone(),
                        },
                    )?;

                    let identity = Identity {
                        uid: session.user_id,
                        email: session.email,
                    };

                    info!(user_id = %identity.uid, "Interactive sign-in complete");
                    self.emit(ProviderEvent::StateChanged(Some(identity.clone())));
                    return Ok(identity);
                }
                "expired" => {
                    return Err(ProviderError::Timeout);
                }
                other => {
                    let error = payload.error.unwrap_or_else(|| "unknown error".to_string());
                    return Err(ProviderError::SignIn(format!("{}: {}", other, error)));
                }
            }
        }
    }

    async fn sign_out(&self) -> ProviderResult<()> {
        self.flags.clear_provider_session()?;
        info!("Provider session cleared");
        self.emit(ProviderEvent::StateChanged(None));
        Ok(())
    }

    async fn id_token(&self, force_refresh: bool) -> ProviderResult<Option<String>> {
        if !self.flags.has_provider_session()? {
            return Ok(None);
        }

        if !force_refresh && !self.flags.is_provider_session_expired()? {
            return Ok(self.flags.get_provider_access_token()?);
        }

        let token = self.refresh_token().await?;
        Ok(Some(token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_storage::MemoryFlagStore;

    fn test_provider() -> HostedProvider {
        let flags = Arc::new(PersistedFlags::new(Box::new(MemoryFlagStore::new())));
        HostedProvider::new("https://console.test/", "https://auth.test", flags)
    }

    #[test]
    fn url_building_strips_trailing_slash() {
        let provider = test_provider();
        assert_eq!(
            provider.login_url("abc"),
            "https://console.test/console-auth?login_id=abc"
        );
        assert_eq!(
            provider.status_url("abc"),
            "https://console.test/api/console-login-status?login_id=abc"
        );
        assert_eq!(
            provider.refresh_url(),
            "https://auth.test/v1/token?grant_type=refresh_token"
        );
    }

    #[tokio::test]
    async fn announce_without_session_emits_none() {
        let provider = test_provider();
        let mut events = provider.subscribe();

        provider.announce().await.unwrap();

        match events.recv().await {
            Some(ProviderEvent::StateChanged(None)) => {}
            other => panic!("Expected StateChanged(None), got {:?}", other),
        }
    }

    #[tokio::test]
    async fn announce_with_valid_session_emits_identity() {
        let provider = test_provider();
        let expires_at = (chrono::Utc::now() + chrono::Duration::hours(1)).to_rfc3339();
        provider
            .flags
            .set_provider_session(
                "access",
                "refresh",
                &ProviderSessionMeta {
                    user_id: "user-1".to_string(),
                    email: Some("a@warden.dev".to_string()),
                    expires_at,
                },
            )
            .unwrap();

        let mut events = provider.subscribe();
        provider.announce().await.unwrap();

        match events.recv().await {
            Some(ProviderEvent::StateChanged(Some(identity))) => {
                assert_eq!(identity.uid, "user-1");
                assert_eq!(identity.email.as_deref(), Some("a@warden.dev"));
            }
            other => panic!("Expected StateChanged(Some), got {:?}", other),
        }
    }

    #[tokio::test]
    async fn cached_token_is_returned_without_refresh() {
        let provider = test_provider();
        let expires_at = (chrono::Utc::now() + chrono::Duration::hours(1)).to_rfc3339();
        provider
            .flags
            .set_provider_session(
                "cached-token",
                "refresh",
                &ProviderSessionMeta {
                    user_id: "user-1".to_string(),
                    email: None,
                    expires_at,
                },
            )
            .unwrap();

        let token = provider.id_token(false).await.unwrap();
        assert_eq!(token.as_deref(), Some("cached-token"));
    }

    #[tokio::test]
    async fn id_token_without_session_is_none() {
        let provider = test_provider();
        assert_eq!(provider.id_token(false).await.unwrap(), None);
    }

    #[tokio::test]
    async fn sign_out_clears_session_and_notifies() {
        let provider = test_provider();
        let expires_at = (chrono::Utc::now() + chrono::Duration::hours(1)).to_rfc3339();
        provider
            .flags
            .set_provider_session(
                "access",
                "refresh",
                &ProviderSessionMeta {
                    user_id: "user-1".to_string(),
                    email: None,
                    expires_at,
                },
            )
            .unwrap();

        let mut events = provider.subscribe();
        provider.sign_out().await.unwrap();

        assert!(!provider.flags.has_provider_session().unwrap());
        match events.recv().await {
            Some(ProviderEvent::StateChanged(None)) => {}
            other => panic!("Expected StateChanged(None), got {:?}", other),
        }
    }
}
