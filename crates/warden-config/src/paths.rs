//! File system paths for runtime state.

use crate::{ConfigError, ConfigResult};
use std::path::PathBuf;

/// Manages file system paths for the auth engine.
#[derive(Debug, Clone)]
pub struct Paths {
    /// Base directory for runtime files (~/.warden)
    base_dir: PathBuf,
}

impl Paths {
    /// Create a new Paths instance rooted at `~/.warden`.
    pub fn new() -> ConfigResult<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| ConfigError::Path("Could not determine home directory".to_string()))?;

        Ok(Self {
            base_dir: home.join(".warden"),
        })
    }

    /// Create a new Paths instance with a custom base directory.
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Get the base directory.
    pub fn base_dir(&self) -> &PathBuf {
        &self.base_dir
    }

    /// Get the config file path (`<base>/config.json`).
    pub fn config_file(&self) -> PathBuf {
        self.base_dir.join("config.json")
    }

    /// Get the persisted flag store path (`<base>/flags.json`).
    pub fn flags_file(&self) -> PathBuf {
        self.base_dir.join("flags.json")
    }

    /// Create the base directory if it does not exist.
    pub fn ensure_base_dir(&self) -> ConfigResult<()> {
        std::fs::create_dir_all(&self.base_dir)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn custom_base_dir_controls_file_locations() {
        let paths = Paths::with_base_dir(PathBuf::from("/tmp/warden-test"));
        assert_eq!(
            paths.config_file(),
            PathBuf::from("/tmp/warden-test/config.json")
        );
        assert_eq!(
            paths.flags_file(),
            PathBuf::from("/tmp/warden-test/flags.json")
        );
    }

    #[test]
    fn ensure_base_dir_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().join("nested"));
        paths.ensure_base_dir().unwrap();
        assert!(paths.base_dir().exists());
    }
}
