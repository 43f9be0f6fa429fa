//! Configuration management for Shellboot

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{ConfigError, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub bootstrap: BootstrapConfig,
}

/// Policy of a bootstrap session, fixed for its whole lifetime
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootstrapConfig {
    /// Block readiness on the mock network layer
    #[serde(default)]
    pub wait_for_msw: bool,

    /// Block readiness (and deferred registrations) on public data
    #[serde(default)]
    pub wait_for_public_data: bool,

    /// Block readiness on protected data while the active route is protected
    #[serde(default)]
    pub wait_for_protected_data: bool,

    /// Buffered lifecycle events per subscriber
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

fn default_event_capacity() -> usize {
    100
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            wait_for_msw: false,
            wait_for_public_data: false,
            wait_for_protected_data: false,
            event_capacity: default_event_capacity(),
        }
    }
}

impl Config {
    /// Load configuration from the default location
    ///
    /// A missing file at the default location yields the default
    /// configuration; an explicit `SHELLBOOT_CONFIG` must exist.
    pub fn load() -> Result<Self> {
        if let Ok(path) = std::env::var("SHELLBOOT_CONFIG") {
            let path = PathBuf::from(shellexpand::tilde(&path).to_string());
            return Self::load_from_path(&path);
        }

        let config_path = resolve_config_path()?;
        if !config_path.exists() {
            tracing::debug!(path = %config_path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        let config: Config = toml::from_str(&content).map_err(ConfigError::ParseError)?;
        Ok(config)
    }
}

/// Resolve the configuration file path following XDG Base Directory spec
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("SHELLBOOT_CONFIG") {
        return Ok(PathBuf::from(shellexpand::tilde(&path).to_string()));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("shellboot").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ShellbootError;
    use serial_test::serial;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_parse_full_config() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
[bootstrap]
wait_for_msw = true
wait_for_public_data = true
event_capacity = 16
"#,
        )
        .unwrap();

        let config = Config::load_from_path(&path).unwrap();

        assert!(config.bootstrap.wait_for_msw);
        assert!(config.bootstrap.wait_for_public_data);
        assert!(!config.bootstrap.wait_for_protected_data);
        assert_eq!(config.bootstrap.event_capacity, 16);
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        fs::write(&path, "").unwrap();

        let config = Config::load_from_path(&path).unwrap();

        assert_eq!(config, Config::default());
        assert_eq!(config.bootstrap.event_capacity, 100);
    }

    #[test]
    fn test_invalid_config_is_parse_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        fs::write(&path, "[bootstrap]\nwait_for_msw = \"maybe\"\n").unwrap();

        let result = Config::load_from_path(&path);

        assert!(matches!(
            result,
            Err(ShellbootError::Config(ConfigError::ParseError(_)))
        ));
    }

    #[test]
    #[serial]
    fn test_load_honors_env_override() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("custom.toml");
        fs::write(&path, "[bootstrap]\nwait_for_protected_data = true\n").unwrap();

        std::env::set_var("SHELLBOOT_CONFIG", &path);
        let config = Config::load();
        let resolved = resolve_config_path();
        std::env::remove_var("SHELLBOOT_CONFIG");

        assert!(config.unwrap().bootstrap.wait_for_protected_data);
        assert_eq!(resolved.unwrap(), path);
    }

    #[test]
    #[serial]
    fn test_missing_env_override_is_read_error() {
        std::env::set_var("SHELLBOOT_CONFIG", "/nonexistent/shellboot/config.toml");
        let result = Config::load();
        std::env::remove_var("SHELLBOOT_CONFIG");

        assert!(matches!(
            result,
            Err(ShellbootError::Config(ConfigError::ReadError(_)))
        ));
    }
}
