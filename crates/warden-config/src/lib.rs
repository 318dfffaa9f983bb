//! Configuration and shared utilities for the Warden auth engine.
//!
//! This crate provides:
//! - Configuration loading (compile-time defaults, config file, env overrides)
//! - File system paths for runtime state
//! - Logging initialization via `tracing`

mod config;
mod error;
mod logging;
mod paths;

pub use config::{
    Config, DEFAULT_AUTH_API_URL, DEFAULT_BACKEND_API_URL, DEFAULT_EMAIL_DOMAIN,
    DEFAULT_LOADING_FALLBACK_MS, DEFAULT_LOG_LEVEL, DEFAULT_WEB_APP_URL,
};
pub use error::{ConfigError, ConfigResult};
pub use logging::{init_logging, parse_level};
pub use paths::Paths;
