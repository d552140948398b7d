//! SSH module - the remote-access core
//!
//! This module provides the SSH functionality using the russh library.
//!
//! # Features
//! - `user@host:port` host spec parsing with defaults
//! - ed25519 key pair discovery and generation (`~/.ssh/id_ed25519`)
//! - Public key + password authentication
//! - Trust bootstrap into remote `authorized_keys`
//! - Remote OS detection
//! - Command execution (streamed or captured)
//!
//! Host keys are NOT verified. Any server key is accepted.

pub mod bootstrap;
mod client;
mod connection;
mod error;
pub mod exec;
mod host_spec;
pub mod keystore;
pub mod os_detect;
mod session;
#[cfg(test)]
pub(crate) mod test_server;

pub use client::{ClientHandler, SshClient};
pub use connection::{ConnectionManager, ConnectionState};
pub use error::SshError;
pub use host_spec::{HostSpec, HostSpecParser, DEFAULT_HOST, DEFAULT_PORT};
pub use keystore::{get_key_store, KeyCapability, KeyMaterial, KeyStore};
pub use os_detect::RemoteOs;
pub use session::{close_channel, SshSession};
