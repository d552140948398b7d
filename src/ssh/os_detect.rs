//! Remote OS detection
//!
//! One-shot probe run right after authentication. The probe tries the
//! Windows `ver` builtin first and falls back to `uname -a`; whichever banner
//! comes back is classified by substring.
//!
//! Detection never fails a connection. Any error leaves the result at
//! [`RemoteOs::Unknown`].

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::exec;
use super::session::SshSession;

/// Works in both `cmd.exe` and POSIX shells
pub const PROBE_CMD: &str = "cmd /c ver || uname -a";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteOs {
    #[default]
    Unknown,
    Linux,
    Darwin,
    Windows,
}

impl RemoteOs {
    /// Classify probe output. Case-insensitive, checked in the order
    /// Windows, Linux, Darwin.
    pub fn classify(banner: &str) -> Self {
        let lower = banner.to_lowercase();
        if lower.contains("windows") {
            RemoteOs::Windows
        } else if lower.contains("linux") {
            RemoteOs::Linux
        } else if lower.contains("darwin") {
            RemoteOs::Darwin
        } else {
            RemoteOs::Unknown
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RemoteOs::Unknown => "unknown",
            RemoteOs::Linux => "linux",
            RemoteOs::Darwin => "darwin",
            RemoteOs::Windows => "windows",
        }
    }
}

impl fmt::Display for RemoteOs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Run the probe over `session` and classify the result.
pub async fn detect_remote_os(session: &SshSession) -> RemoteOs {
    match exec::output(session, PROBE_CMD).await {
        Ok(banner) => {
            debug!("[OsDetect] Probe output: {}", banner.trim());
            let os = RemoteOs::classify(&banner);
            info!("[OsDetect] Remote OS: {}", os);
            os
        }
        Err(e) => {
            warn!("[OsDetect] Probe failed (non-fatal): {}", e);
            RemoteOs::Unknown
        }
    }
}
