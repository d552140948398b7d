//! Bulk copy over SFTP

use async_trait::async_trait;
use russh_sftp::client::{Config as SftpConfig, SftpSession as RusshSftpSession};
use russh_sftp::protocol::OpenFlags;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info};

use super::ContentTransfer;
use crate::ssh::{close_channel, SshError, SshSession};

/// Client settings with no per-request deadline. A stalled server is waited
/// on, the same as a stalled `cat` in the pipe strategy.
fn sftp_config() -> SftpConfig {
    SftpConfig {
        request_timeout_secs: u64::MAX,
        ..SftpConfig::default()
    }
}

/// Opens a dedicated SFTP subsystem channel per transfer
#[derive(Debug, Clone, Copy, Default)]
pub struct SftpTransfer;

impl SftpTransfer {
    async fn open(session: &SshSession) -> Result<RusshSftpSession, SshError> {
        let channel = session.open_channel().await?;

        if let Err(e) = channel.request_subsystem(true, "sftp").await {
            close_channel(channel).await;
            return Err(SshError::ChannelError(format!(
                "Failed to request SFTP subsystem: {}",
                e
            )));
        }

        RusshSftpSession::new_with_config(channel.into_stream(), sftp_config())
            .await
            .map_err(|e| SshError::ChannelError(format!("SFTP subsystem unavailable: {}", e)))
    }

    async fn close(sftp: RusshSftpSession) {
        if let Err(e) = sftp.close().await {
            debug!("SFTP close error (non-fatal): {}", e);
        }
    }
}

async fn read_file(sftp: &RusshSftpSession, remote_path: &str) -> Result<Vec<u8>, SshError> {
    let mut file = sftp
        .open(remote_path)
        .await
        .map_err(|e| SshError::transfer(remote_path, e))?;

    let mut content = Vec::new();
    file.read_to_end(&mut content)
        .await
        .map_err(|e| SshError::transfer(remote_path, e))?;

    Ok(content)
}

async fn write_file(
    sftp: &RusshSftpSession,
    content: &[u8],
    remote_path: &str,
) -> Result<(), SshError> {
    let mut file = sftp
        .open_with_flags(
            remote_path,
            OpenFlags::CREATE | OpenFlags::TRUNCATE | OpenFlags::WRITE,
        )
        .await
        .map_err(|e| SshError::transfer(remote_path, e))?;

    file.write_all(content)
        .await
        .map_err(|e| SshError::transfer(remote_path, e))?;

    file.flush()
        .await
        .map_err(|e| SshError::transfer(remote_path, e))?;

    // Releases the remote handle
    file.shutdown()
        .await
        .map_err(|e| SshError::transfer(remote_path, e))?;

    Ok(())
}

#[async_trait]
impl ContentTransfer for SftpTransfer {
    fn name(&self) -> &'static str {
        "sftp"
    }

    async fn read(&self, session: &SshSession, remote_path: &str) -> Result<Vec<u8>, SshError> {
        let sftp = Self::open(session)
            .await
            .map_err(|e| SshError::transfer(remote_path, e))?;

        let result = read_file(&sftp, remote_path).await;
        Self::close(sftp).await;

        if let Ok(content) = &result {
            info!("Read {} bytes from {}", content.len(), remote_path);
        }
        result
    }

    async fn write(
        &self,
        session: &SshSession,
        content: &[u8],
        remote_path: &str,
    ) -> Result<(), SshError> {
        let sftp = Self::open(session)
            .await
            .map_err(|e| SshError::transfer(remote_path, e))?;

        let result = write_file(&sftp, content, remote_path).await;
        Self::close(sftp).await;

        if result.is_ok() {
            info!("Wrote {} bytes to {}", content.len(), remote_path);
        }
        result
    }
}
