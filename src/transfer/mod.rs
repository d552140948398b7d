//! Whole-file content transfer
//!
//! Two interchangeable strategies move a file's full contents between a local
//! buffer and the remote host:
//! - [`SftpTransfer`]: bulk copy over the SFTP subsystem (default)
//! - [`PipeTransfer`]: `cat` on the remote side, bytes over an exec channel
//!
//! The strategy is picked once from [`TransferMode`]. A failure in one never
//! falls back to the other.

mod pipe;
mod sftp;

use async_trait::async_trait;

use crate::config::TransferMode;
use crate::ssh::{SshError, SshSession};

pub use pipe::PipeTransfer;
pub use sftp::SftpTransfer;

/// Reads and overwrites entire remote files over a borrowed session
#[async_trait]
pub trait ContentTransfer: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Read the whole of `remote_path`
    async fn read(&self, session: &SshSession, remote_path: &str) -> Result<Vec<u8>, SshError>;

    /// Replace the contents of `remote_path` with `content`, creating it if needed
    async fn write(
        &self,
        session: &SshSession,
        content: &[u8],
        remote_path: &str,
    ) -> Result<(), SshError>;
}

/// Strategy for the configured mode
pub fn transfer_for(mode: TransferMode) -> Box<dyn ContentTransfer> {
    match mode {
        TransferMode::Sftp => Box::new(SftpTransfer),
        TransferMode::Pipe => Box::new(PipeTransfer),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transfer_for_mode() {
        assert_eq!(transfer_for(TransferMode::Sftp).name(), "sftp");
        assert_eq!(transfer_for(TransferMode::Pipe).name(), "pipe");
        assert_eq!(transfer_for(TransferMode::default()).name(), "sftp");
    }
}
