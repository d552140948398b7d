//! SSH Session

use russh::client::{Handle, Msg};
use russh::Channel;
use tracing::debug;

use super::client::ClientHandler;
use super::error::SshError;

/// An authenticated connection.
///
/// Owned by the connection manager; transfers and commands borrow it for the
/// duration of one call and open their own channel on it.
pub struct SshSession {
    handle: Handle<ClientHandler>,
}

impl SshSession {
    pub fn new(handle: Handle<ClientHandler>) -> Self {
        Self { handle }
    }

    /// Open a fresh session channel
    pub async fn open_channel(&self) -> Result<Channel<Msg>, SshError> {
        let channel = self
            .handle
            .channel_open_session()
            .await
            .map_err(|e| SshError::ChannelError(format!("Failed to open channel: {}", e)))?;
        debug!("Opened channel {:?}", channel.id());
        Ok(channel)
    }
}

/// Close a channel, logging instead of failing.
pub async fn close_channel(channel: Channel<Msg>) {
    let id = channel.id();
    if let Err(e) = channel.close().await {
        debug!("Channel {:?} close error (non-fatal): {}", id, e);
    }
}
