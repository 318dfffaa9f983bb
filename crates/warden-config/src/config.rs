//! Configuration management for the auth engine.

use crate::{ConfigError, ConfigResult, Paths};
use serde::{Deserialize, Serialize};
use std::path::Path;
use url::Url;

/// Default backend API URL (can be overridden at compile time via WARDEN_BACKEND_API_URL).
pub const DEFAULT_BACKEND_API_URL: &str = match option_env!("WARDEN_BACKEND_API_URL") {
    Some(url) => url,
    None => "http://localhost:8001",
};

/// Default web app URL hosting the interactive login page
/// (can be overridden at compile time via WARDEN_WEB_APP_URL).
pub const DEFAULT_WEB_APP_URL: &str = match option_env!("WARDEN_WEB_APP_URL") {
    Some(url) => url,
    None => "https://console.warden.dev",
};

/// Default identity provider token API URL
/// (can be overridden at compile time via WARDEN_AUTH_API_URL).
pub const DEFAULT_AUTH_API_URL: &str = match option_env!("WARDEN_AUTH_API_URL") {
    Some(url) => url,
    None => "https://auth.warden.dev",
};

/// Default organizational email domain suffix accepted at sign-in.
pub const DEFAULT_EMAIL_DOMAIN: &str = match option_env!("WARDEN_ALLOWED_EMAIL_DOMAIN") {
    Some(domain) => domain,
    None => "@warden.dev",
};

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Default window after which a never-resolving provider forces an
/// unauthenticated status, in milliseconds.
pub const DEFAULT_LOADING_FALLBACK_MS: u64 = 2000;

/// Main configuration for the auth engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
    /// Backend accounts service URL (user sync + second factor endpoints).
    #[serde(default = "default_backend_api_url")]
    pub backend_api_url: String,
    /// Web app URL hosting the interactive login hand-off page.
    #[serde(default = "default_web_app_url")]
    pub web_app_url: String,
    /// Identity provider token API URL.
    #[serde(default = "default_auth_api_url")]
    pub auth_api_url: String,
    /// Email suffix a signed-in identity must carry (e.g. `@warden.dev`).
    #[serde(default = "default_email_domain")]
    pub allowed_email_domain: String,
    /// Milliseconds to wait for the first provider callback before the
    /// loading status is forced to unauthenticated.
    #[serde(default = "default_loading_fallback_ms")]
    pub loading_fallback_ms: u64,
}

fn default_backend_api_url() -> String {
    DEFAULT_BACKEND_API_URL.to_string()
}

fn default_web_app_url() -> String {
    DEFAULT_WEB_APP_URL.to_string()
}

fn default_auth_api_url() -> String {
    DEFAULT_AUTH_API_URL.to_string()
}

fn default_email_domain() -> String {
    DEFAULT_EMAIL_DOMAIN.to_string()
}

fn default_loading_fallback_ms() -> u64 {
    DEFAULT_LOADING_FALLBACK_MS
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            backend_api_url: DEFAULT_BACKEND_API_URL.to_string(),
            web_app_url: DEFAULT_WEB_APP_URL.to_string(),
            auth_api_url: DEFAULT_AUTH_API_URL.to_string(),
            allowed_email_domain: DEFAULT_EMAIL_DOMAIN.to_string(),
            loading_fallback_ms: DEFAULT_LOADING_FALLBACK_MS,
        }
    }
}

impl Config {
    /// Create a new Config with default values, then override from environment.
    pub fn new() -> Self {
        let mut config = Self::default();
        config.load_from_env();
        config
    }

    /// Load configuration from the config file, falling back to defaults.
    /// Environment variables override file values.
    pub fn load(paths: &Paths) -> ConfigResult<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            Self::default()
        };

        config.load_from_env();
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to the config file.
    pub fn save(&self, paths: &Paths) -> ConfigResult<()> {
        paths.ensure_base_dir()?;
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(paths.config_file(), content)?;
        Ok(())
    }

    /// Apply environment variable overrides.
    pub fn load_from_env(&mut self) {
        if let Some(level) = non_empty_env("WARDEN_LOG_LEVEL") {
            self.log_level = level;
        }
        if let Some(url) = non_empty_env("WARDEN_BACKEND_API_URL") {
            self.backend_api_url = url;
        }
        if let Some(url) = non_empty_env("WARDEN_WEB_APP_URL") {
            self.web_app_url = url;
        }
        if let Some(url) = non_empty_env("WARDEN_AUTH_API_URL") {
            self.auth_api_url = url;
        }
        if let Some(domain) = non_empty_env("WARDEN_ALLOWED_EMAIL_DOMAIN") {
            self.allowed_email_domain = domain;
        }
        if let Some(ms) = non_empty_env("WARDEN_LOADING_FALLBACK_MS") {
            if let Ok(parsed) = ms.parse::<u64>() {
                self.loading_fallback_ms = parsed;
            }
        }
    }

    /// Validate endpoint URLs and the domain suffix.
    pub fn validate(&self) -> ConfigResult<()> {
        Url::parse(&self.backend_api_url)?;
        Url::parse(&self.web_app_url)?;
        Url::parse(&self.auth_api_url)?;

        if !self.allowed_email_domain.starts_with('@') {
            return Err(ConfigError::Invalid(format!(
                "allowed_email_domain must start with '@', got '{}'",
                self.allowed_email_domain
            )));
        }

        Ok(())
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
