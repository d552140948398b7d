//! SSH Error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SshError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Channel error: {0}")]
    ChannelError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("SSH protocol error: {0}")]
    ProtocolError(String),

    #[error("Key error: {0}")]
    KeyError(String),

    #[error("Disconnected")]
    Disconnected,

    /// Remote command ran to completion with a nonzero exit status
    #[error("Command `{command}` exited with status {exit_status}{}", stderr_suffix(.stderr))]
    CommandFailed {
        command: String,
        exit_status: u32,
        stderr: String,
    },

    /// Remote command was killed by a signal or its channel closed without an exit status
    #[error("Command `{command}` aborted: {reason}")]
    CommandAborted { command: String, reason: String },

    #[error("Transfer of {path} failed: {reason}")]
    TransferFailed { path: String, reason: String },
}

impl SshError {
    /// True for dial, handshake and authentication failures
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            SshError::ConnectionFailed(_) | SshError::AuthenticationFailed(_)
        )
    }

    pub(crate) fn transfer(path: &str, reason: impl ToString) -> Self {
        SshError::TransferFailed {
            path: path.to_string(),
            reason: reason.to_string(),
        }
    }
}

fn stderr_suffix(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!(": {}", trimmed)
    }
}

impl From<russh::Error> for SshError {
    fn from(err: russh::Error) -> Self {
        SshError::ProtocolError(err.to_string())
    }
}

impl From<russh::keys::Error> for SshError {
    fn from(err: russh::keys::Error) -> Self {
        SshError::KeyError(err.to_string())
    }
}

impl From<russh_sftp::client::error::Error> for SshError {
    fn from(err: russh_sftp::client::error::Error) -> Self {
        SshError::ProtocolError(format!("SFTP: {}", err))
    }
}

// Collaborators display errors verbatim
impl serde::Serialize for SshError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}
