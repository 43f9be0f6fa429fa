//! Error types for Shellboot

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::registry::status::{ModuleOrigin, ModuleRegistrationStatus};

pub type Result<T> = std::result::Result<T, ShellbootError>;

#[derive(Error, Debug)]
pub enum ShellbootError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl ShellbootError {
    /// Returns the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            ShellbootError::InvalidInput(_) => 3,
            ShellbootError::Registry(_) => 2,
            ShellbootError::Config(_) => 1,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),
}

/// Misuse of a module registry or session.
///
/// These indicate a construction bug in the host application rather than a
/// runtime condition, so nothing in this crate recovers from them.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("{origin} registry: {operation} cannot be called while status is {status}")]
    InvalidOperation {
        origin: ModuleOrigin,
        operation: &'static str,
        status: ModuleRegistrationStatus,
    },

    #[error("bootstrap session {0} was already started")]
    AlreadyStarted(String),
}

/// A single module that failed to register.
///
/// Remote failures always carry the owning remote's name. Local modules all
/// share the host origin so they only carry an optional module name.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "origin", rename_all = "snake_case")]
pub enum RegistrationError {
    #[error("local module {} failed to register: {message}", display_name(.module_name))]
    Local {
        module_name: Option<String>,
        message: String,
    },

    #[error("remote module {} from {remote_name} failed to register: {message}", display_name(.module_name))]
    Remote {
        remote_name: String,
        module_name: Option<String>,
        message: String,
    },
}

impl RegistrationError {
    pub fn module_name(&self) -> Option<&str> {
        match self {
            RegistrationError::Local { module_name, .. }
            | RegistrationError::Remote { module_name, .. } => module_name.as_deref(),
        }
    }

    /// Name of the remote the failing module came from, `None` for local modules
    pub fn remote_name(&self) -> Option<&str> {
        match self {
            RegistrationError::Local { .. } => None,
            RegistrationError::Remote { remote_name, .. } => Some(remote_name),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            RegistrationError::Local { message, .. }
            | RegistrationError::Remote { message, .. } => message,
        }
    }
}

fn display_name(name: &Option<String>) -> &str {
    name.as_deref().unwrap_or("<unnamed>")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(ShellbootError::InvalidInput("x".to_string()).exit_code(), 3);
        assert_eq!(
            ShellbootError::Registry(RegistryError::AlreadyStarted("s".to_string())).exit_code(),
            2
        );
        assert_eq!(
            ShellbootError::Config(ConfigError::MissingField("f".to_string())).exit_code(),
            1
        );
    }

    #[test]
    fn test_local_error_has_no_remote_name() {
        let error = RegistrationError::Local {
            module_name: Some("shell".to_string()),
            message: "boom".to_string(),
        };

        assert_eq!(error.remote_name(), None);
        assert_eq!(error.module_name(), Some("shell"));
        assert_eq!(
            error.to_string(),
            "local module shell failed to register: boom"
        );
    }

    #[test]
    fn test_remote_error_display() {
        let error = RegistrationError::Remote {
            remote_name: "billing".to_string(),
            module_name: None,
            message: "unreachable".to_string(),
        };

        assert_eq!(error.remote_name(), Some("billing"));
        assert_eq!(
            error.to_string(),
            "remote module <unnamed> from billing failed to register: unreachable"
        );
    }

    #[test]
    fn test_registration_error_serialization() {
        let error = RegistrationError::Remote {
            remote_name: "billing".to_string(),
            module_name: Some("invoices".to_string()),
            message: "timeout".to_string(),
        };

        let json = serde_json::to_string(&error).unwrap();
        assert!(json.contains("\"origin\":\"remote\""));
        assert!(json.contains("billing"));
    }
}
