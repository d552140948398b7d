//! Connection manager
//!
//! Owns the one SSH session to one host and exposes the operations the GUI
//! needs: connect, run, output, get/set content.
//!
//! # States
//!
//! ```text
//!   Disconnected ──connect──▶ Connecting ──ok──▶ Connected (terminal)
//!        ▲                        │
//!        └────────── error ───────┘
//! ```
//!
//! Every public operation goes through one guarded transition function, so
//! the first one to need the session dials it. A manager is bound to one
//! host spec for its whole life; to talk to another host, build a new one.
//!
//! The manager is not synchronized. It expects one owner issuing operations
//! one at a time, which `&mut self` enforces.

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use super::bootstrap;
use super::client::SshClient;
use super::error::SshError;
use super::exec;
use super::host_spec::{HostSpec, HostSpecParser};
use super::keystore::{get_key_store, KeyStore};
use super::os_detect::{detect_remote_os, RemoteOs};
use super::session::SshSession;
use crate::config::{ConnectTarget, Settings};
use crate::transfer::{transfer_for, ContentTransfer};

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// What exists once the handshake succeeded
struct Link {
    session: SshSession,
    os: RemoteOs,
}

enum Phase {
    Disconnected,
    Connecting,
    Connected(Link),
}

pub struct ConnectionManager {
    spec: HostSpec,
    password: String,
    key_path: Option<PathBuf>,
    key_store: Arc<KeyStore>,
    transfer: Box<dyn ContentTransfer>,
    phase: Phase,
}

impl ConnectionManager {
    /// Build a manager for `target`. Nothing is dialed until the first operation.
    pub fn new(target: ConnectTarget, settings: &Settings) -> Self {
        let parser = HostSpecParser::new(settings.resolve_default_user());
        Self {
            spec: parser.parse(&target.host_spec),
            password: target.password,
            key_path: target.key_path,
            key_store: get_key_store(),
            transfer: transfer_for(settings.transfer_mode),
            phase: Phase::Disconnected,
        }
    }

    /// Use `key_store` instead of the one for the current user's home
    pub fn with_key_store(mut self, key_store: Arc<KeyStore>) -> Self {
        self.key_store = key_store;
        self
    }

    /// Use `transfer` instead of the configured strategy
    pub fn with_transfer(mut self, transfer: Box<dyn ContentTransfer>) -> Self {
        self.transfer = transfer;
        self
    }

    /// The normalized target
    pub fn host_spec(&self) -> &HostSpec {
        &self.spec
    }

    pub fn state(&self) -> ConnectionState {
        match self.phase {
            Phase::Disconnected => ConnectionState::Disconnected,
            Phase::Connecting => ConnectionState::Connecting,
            Phase::Connected(_) => ConnectionState::Connected,
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.phase, Phase::Connected(_))
    }

    /// OS detected at connect time; `Unknown` before that
    pub fn remote_os(&self) -> RemoteOs {
        match &self.phase {
            Phase::Connected(link) => link.os,
            _ => RemoteOs::Unknown,
        }
    }

    /// Dial and authenticate. A no-op once connected.
    pub async fn connect(&mut self) -> Result<(), SshError> {
        self.ensure_connected().await.map(|_| ())
    }

    /// Run `command`, streaming its output to the local console.
    pub async fn run(&mut self, command: &str) -> Result<(), SshError> {
        let session = self.ensure_connected().await?;
        exec::run(session, command).await
    }

    /// Run `command` and return its stdout.
    pub async fn output(&mut self, command: &str) -> Result<String, SshError> {
        let session = self.ensure_connected().await?;
        exec::output(session, command).await
    }

    /// Read a remote text file.
    pub async fn get_content(&mut self, remote_path: &str) -> Result<String, SshError> {
        let bytes = self.get_bytes(remote_path).await?;
        String::from_utf8(bytes).map_err(|e| SshError::transfer(remote_path, e))
    }

    /// Overwrite a remote file with `text`.
    pub async fn set_content(&mut self, text: &str, remote_path: &str) -> Result<(), SshError> {
        self.set_bytes(text.as_bytes(), remote_path).await
    }

    pub async fn get_bytes(&mut self, remote_path: &str) -> Result<Vec<u8>, SshError> {
        let (session, transfer) = self.ensure_connected_ref().await?;
        debug!("Reading {} via {}", remote_path, transfer.name());
        transfer.read(session, remote_path).await
    }

    pub async fn set_bytes(&mut self, content: &[u8], remote_path: &str) -> Result<(), SshError> {
        let (session, transfer) = self.ensure_connected_ref().await?;
        debug!("Writing {} via {}", remote_path, transfer.name());
        transfer.write(session, content, remote_path).await
    }

    async fn ensure_connected(&mut self) -> Result<&SshSession, SshError> {
        self.ensure_connected_ref().await.map(|(session, _)| session)
    }

    /// The only path into `establish`, and so the only place a state
    /// transition happens.
    async fn ensure_connected_ref(
        &mut self,
    ) -> Result<(&SshSession, &dyn ContentTransfer), SshError> {
        if !self.is_connected() {
            self.establish().await?;
        }
        match &self.phase {
            Phase::Connected(link) => Ok((&link.session, self.transfer.as_ref())),
            _ => Err(SshError::Disconnected),
        }
    }

    async fn establish(&mut self) -> Result<(), SshError> {
        if matches!(self.phase, Phase::Connecting) {
            debug!("Previous connect to {} was interrupted, starting over", self.spec);
        }
        self.phase = Phase::Connecting;

        let keys = self.key_store.load(self.key_path.as_deref());

        let session = match SshClient::new(&self.spec, &self.password, &keys)
            .connect()
            .await
        {
            Ok(session) => session,
            Err(e) => {
                warn!("Connect to {} failed: {}", self.spec, e);
                self.phase = Phase::Disconnected;
                return Err(e);
            }
        };

        match keys.public_key_line() {
            Some(line) => bootstrap::authorize_key(&session, line).await,
            None => debug!("No public key available, skipping trust bootstrap"),
        }

        let os = detect_remote_os(&session).await;

        info!("Connected to {} ({})", self.spec, os);
        self.phase = Phase::Connected(Link { session, os });
        Ok(())
    }
}
