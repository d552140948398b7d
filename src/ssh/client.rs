//! SSH Client implementation using russh

use std::net::ToSocketAddrs;
use std::sync::Arc;

use russh::client;
use russh::keys::key::PrivateKeyWithHashAlg;
use russh::keys::ssh_key::HashAlg;
use russh::keys::PublicKey;
use tracing::{debug, info, warn};

use super::error::SshError;
use super::host_spec::HostSpec;
use super::keystore::KeyMaterial;
use super::session::SshSession;

/// Dials one host and authenticates with whatever credentials are available
pub struct SshClient<'a> {
    spec: &'a HostSpec,
    password: &'a str,
    keys: &'a KeyMaterial,
}

impl<'a> SshClient<'a> {
    pub fn new(spec: &'a HostSpec, password: &'a str, keys: &'a KeyMaterial) -> Self {
        Self {
            spec,
            password,
            keys,
        }
    }

    /// Connect to the SSH server and return an authenticated session
    pub async fn connect(self) -> Result<SshSession, SshError> {
        let addr = self.spec.host_port();

        info!("Connecting to SSH server at {}", addr);

        let socket_addr = addr
            .to_socket_addrs()
            .map_err(|e| SshError::ConnectionFailed(format!("Failed to resolve address: {}", e)))?
            .next()
            .ok_or_else(|| SshError::ConnectionFailed("No address found".to_string()))?;

        // No inactivity timeout or keepalive: a stalled peer is waited on
        let ssh_config = client::Config {
            inactivity_timeout: None,
            ..Default::default()
        };

        let handler = ClientHandler::new(self.spec.host.clone(), self.spec.port);

        let mut handle = client::connect(Arc::new(ssh_config), socket_addr, handler)
            .await
            .map_err(|e| SshError::ConnectionFailed(e.to_string()))?;

        debug!("SSH handshake completed");

        if !self.authenticate(&mut handle).await? {
            return Err(SshError::AuthenticationFailed(
                "Authentication rejected by server".to_string(),
            ));
        }

        info!("SSH authentication successful for {}", self.spec);

        Ok(SshSession::new(handle))
    }

    /// Offer the key first (when one loaded) and the password second.
    async fn authenticate(
        &self,
        handle: &mut client::Handle<ClientHandler>,
    ) -> Result<bool, SshError> {
        let user = &self.spec.user;

        if let Some(key) = self.keys.signer() {
            debug!(
                "Offering public key {}",
                self.keys.fingerprint().unwrap_or_default()
            );
            let key_with_hash = PrivateKeyWithHashAlg::new(key.clone(), None);
            let result = handle
                .authenticate_publickey(user, key_with_hash)
                .await
                .map_err(|e| SshError::AuthenticationFailed(e.to_string()))?;

            if result.success() {
                debug!(
                    "Public key {} accepted",
                    self.keys.private_key_path().display()
                );
                return Ok(true);
            }
            debug!("Public key rejected, trying password");
        } else {
            debug!("No signer available, trying password only");
        }

        let result = handle
            .authenticate_password(user, self.password)
            .await
            .map_err(|e| SshError::AuthenticationFailed(e.to_string()))?;

        Ok(result.success())
    }
}

/// Client handler for russh callbacks
///
/// Every server host key is accepted. The fingerprint is logged so the
/// operator can at least see which key was trusted.
pub struct ClientHandler {
    host: String,
    port: u16,
}

impl ClientHandler {
    pub fn new(host: String, port: u16) -> Self {
        Self { host, port }
    }
}

impl client::Handler for ClientHandler {
    type Error = SshError;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        warn!(
            "Accepting unverified host key for {}:{} ({} {})",
            self.host,
            self.port,
            server_public_key.algorithm().as_str(),
            server_public_key.fingerprint(HashAlg::Sha256)
        );
        Ok(true)
    }
}
