//! Core settings
//!
//! Settings are resolved once by the embedding application and handed to the
//! connection layer explicitly. Nothing here is process-global.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Login used when a host spec carries no `user@` part
pub const DEFAULT_USERNAME: &str = "root";

/// Settings errors
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// How file content travels between the local buffer and the remote host
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferMode {
    /// Whole-file copy over the SFTP subsystem
    #[default]
    Sftp,
    /// `cat` on the remote side, bytes carried over the exec channel
    Pipe,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Fallback login for host specs without a user
    #[serde(default = "default_user")]
    pub default_user: String,

    /// Use the local OS user name instead of `default_user`
    #[serde(default)]
    pub use_system_username: bool,

    #[serde(default)]
    pub transfer_mode: TransferMode,
}

fn default_user() -> String {
    DEFAULT_USERNAME.to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_user: default_user(),
            use_system_username: false,
            transfer_mode: TransferMode::default(),
        }
    }
}

impl Settings {
    /// Parse settings handed over by the configuration store.
    /// Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, SettingsError> {
        Ok(serde_json::from_str(json)?)
    }

    /// The login applied to host specs that do not name one.
    pub fn resolve_default_user(&self) -> String {
        if self.use_system_username {
            let name = whoami::username();
            if !name.is_empty() {
                return name;
            }
            tracing::warn!(
                "Could not determine the local user name, falling back to {}",
                self.default_user
            );
        }
        self.default_user.clone()
    }
}

/// What the caller wants to connect to
#[derive(Debug, Clone, Default)]
pub struct ConnectTarget {
    /// `user@host:port`, every part optional
    pub host_spec: String,
    pub password: String,
    /// Private key to authenticate with; `None` or a missing file selects
    /// `~/.ssh/id_ed25519`
    pub key_path: Option<PathBuf>,
}

impl ConnectTarget {
    pub fn new(host_spec: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            host_spec: host_spec.into(),
            password: password.into(),
            key_path: None,
        }
    }

    pub fn with_key_path(mut self, key_path: impl Into<PathBuf>) -> Self {
        self.key_path = Some(key_path.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.default_user, "root");
        assert!(!settings.use_system_username);
        assert_eq!(settings.transfer_mode, TransferMode::Sftp);
        assert_eq!(settings.resolve_default_user(), "root");
    }

    #[test]
    fn test_from_json_partial() {
        let settings = Settings::from_json(r#"{"transfer_mode": "pipe"}"#).unwrap();
        assert_eq!(settings.transfer_mode, TransferMode::Pipe);
        assert_eq!(settings.default_user, "root");

        let settings = Settings::from_json(r#"{"default_user": "admin"}"#).unwrap();
        assert_eq!(settings.resolve_default_user(), "admin");
    }

    #[test]
    fn test_from_json_rejects_unknown_mode() {
        assert!(Settings::from_json(r#"{"transfer_mode": "scp"}"#).is_err());
    }

    #[test]
    fn test_system_username() {
        let settings = Settings {
            use_system_username: true,
            ..Settings::default()
        };
        assert!(!settings.resolve_default_user().is_empty());
    }

    #[test]
    fn test_connect_target_builder() {
        let target = ConnectTarget::new("bob@box", "hunter2").with_key_path("/tmp/id");
        assert_eq!(target.host_spec, "bob@box");
        assert_eq!(target.key_path, Some(PathBuf::from("/tmp/id")));
    }
}
