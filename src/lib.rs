//! sshtools - browse, edit and run commands on a remote host over SSH
//!
//! This crate is the remote-access core behind the GUI. The GUI builds a
//! [`ConnectionManager`] from the host field, password and key path, then
//! calls `connect`, `run`, `output`, `get_content` and `set_content` on it.

pub mod config;
pub mod ssh;
pub mod transfer;

pub use config::{ConnectTarget, Settings, TransferMode};
pub use ssh::{ConnectionManager, ConnectionState, HostSpec, HostSpecParser, RemoteOs, SshError};
pub use transfer::{ContentTransfer, PipeTransfer, SftpTransfer};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize logging from `RUST_LOG` (default `info`).
///
/// Safe to call more than once; only the first call installs a subscriber.
pub fn init_logging() {
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
