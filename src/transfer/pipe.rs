//! Content transfer through a remote `cat`
//!
//! Needs a POSIX shell on the remote side.

use async_trait::async_trait;
use tracing::info;

use super::ContentTransfer;
use crate::ssh::exec::{self, shell_quote};
use crate::ssh::{SshError, SshSession};

#[derive(Debug, Clone, Copy, Default)]
pub struct PipeTransfer;

impl PipeTransfer {
    pub fn read_command(remote_path: &str) -> String {
        format!("cat {}", shell_quote(remote_path))
    }

    pub fn write_command(remote_path: &str) -> String {
        format!("cat > {}", shell_quote(remote_path))
    }
}

#[async_trait]
impl ContentTransfer for PipeTransfer {
    fn name(&self) -> &'static str {
        "pipe"
    }

    async fn read(&self, session: &SshSession, remote_path: &str) -> Result<Vec<u8>, SshError> {
        let content = exec::output_bytes(session, &Self::read_command(remote_path))
            .await
            .map_err(|e| SshError::transfer(remote_path, e))?;

        info!("Read {} bytes from {} via pipe", content.len(), remote_path);
        Ok(content)
    }

    async fn write(
        &self,
        session: &SshSession,
        content: &[u8],
        remote_path: &str,
    ) -> Result<(), SshError> {
        exec::run_with_input(session, &Self::write_command(remote_path), content)
            .await
            .map_err(|e| SshError::transfer(remote_path, e))?;

        info!("Wrote {} bytes to {} via pipe", content.len(), remote_path);
        Ok(())
    }
}
