//! Trust bootstrap
//!
//! After a successful login, append the local public key to the remote
//! `authorized_keys` files so later connections can use the key instead of
//! the password. Covers both OpenSSH (`~/.ssh`) and Dropbear (`/etc/dropbear`),
//! and only touches directories that already exist.
//!
//! Runs on every connect. The snippet is idempotent, so a repeat is a no-op.

use tracing::debug;

use super::exec::{self, shell_quote};
use super::session::SshSession;

/// Directories whose `authorized_keys` receive the key
pub const AUTHORIZED_KEY_DIRS: &[&str] = &["/etc/dropbear", "$HOME/.ssh"];

/// Build the remote shell snippet installing `public_key_line`.
pub fn authorize_key_script(public_key_line: &str) -> String {
    let dirs = AUTHORIZED_KEY_DIRS
        .iter()
        .map(|d| format!("\"{}\"", d))
        .collect::<Vec<_>>()
        .join(" ");

    let mut script = String::new();
    script.push_str(&format!("k={}; ", shell_quote(public_key_line)));
    script.push_str(&format!("for d in {}; do ", dirs));
    script.push_str("f=\"$d/authorized_keys\"; ");
    script.push_str("if [ -d \"$d\" ]; then ");
    script.push_str("[ -f \"$f\" ] || echo \"$k\" >> \"$f\"; ");
    script.push_str("grep -qF \"$k\" \"$f\" || echo \"$k\" >> \"$f\"; ");
    script.push_str("fi; done");
    script
}

/// Install `public_key_line` on the remote host. Failures are logged only.
pub async fn authorize_key(session: &SshSession, public_key_line: &str) {
    let script = authorize_key_script(public_key_line);
    match exec::output(session, &script).await {
        Ok(_) => debug!("[Bootstrap] Trust bootstrap ran"),
        Err(e) => debug!("[Bootstrap] Failed to install public key (ignored): {}", e),
    }
}
