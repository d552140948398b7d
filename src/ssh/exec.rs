//! Remote command execution
//!
//! Every call opens its own exec channel and closes it before returning,
//! whatever the outcome. There is no channel reuse.

use russh::client::Msg;
use russh::{Channel, ChannelMsg};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::debug;

use super::error::SshError;
use super::session::{close_channel, SshSession};

/// SSH extended data type for stderr
const SSH_EXTENDED_DATA_STDERR: u32 = 1;

/// How much trailing stderr a failed command reports
const STDERR_TAIL_LIMIT: usize = 8 * 1024;

/// Run `command`, streaming its stdout and stderr to the local console.
pub async fn run(session: &SshSession, command: &str) -> Result<(), SshError> {
    let mut stdout = tokio::io::stdout();
    let mut stderr = tokio::io::stderr();
    exec(session, command, None, &mut stdout, &mut stderr).await
}

/// Run `command` and return its stdout.
///
/// Invalid UTF-8 in the output is replaced rather than rejected.
pub async fn output(session: &SshSession, command: &str) -> Result<String, SshError> {
    let stdout = output_bytes(session, command).await?;
    Ok(String::from_utf8_lossy(&stdout).into_owned())
}

/// Run `command` and return its stdout unmodified.
pub async fn output_bytes(session: &SshSession, command: &str) -> Result<Vec<u8>, SshError> {
    let mut stdout = Vec::new();
    let mut stderr = tokio::io::sink();
    exec(session, command, None, &mut stdout, &mut stderr).await?;
    Ok(stdout)
}

/// Run `command` with `input` fed to its stdin, discarding its stdout.
pub async fn run_with_input(
    session: &SshSession,
    command: &str,
    input: &[u8],
) -> Result<(), SshError> {
    let mut stdout = tokio::io::sink();
    let mut stderr = tokio::io::sink();
    exec(session, command, Some(input), &mut stdout, &mut stderr).await
}

/// Quote `s` as a single POSIX shell word.
pub fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

async fn exec<O, E>(
    session: &SshSession,
    command: &str,
    input: Option<&[u8]>,
    stdout: &mut O,
    stderr: &mut E,
) -> Result<(), SshError>
where
    O: AsyncWrite + Unpin,
    E: AsyncWrite + Unpin,
{
    let mut channel = session.open_channel().await?;

    let result = drive(&mut channel, command, input, stdout, stderr).await;

    close_channel(channel).await;

    result
}

async fn drive<O, E>(
    channel: &mut Channel<Msg>,
    command: &str,
    input: Option<&[u8]>,
    stdout: &mut O,
    stderr: &mut E,
) -> Result<(), SshError>
where
    O: AsyncWrite + Unpin,
    E: AsyncWrite + Unpin,
{
    debug!("Executing remote command: {}", command);

    channel
        .exec(true, command)
        .await
        .map_err(|e| SshError::ChannelError(format!("Exec request failed: {}", e)))?;

    if let Some(input) = input {
        channel
            .data(input)
            .await
            .map_err(|e| SshError::ChannelError(format!("Failed to write stdin: {}", e)))?;
        channel
            .eof()
            .await
            .map_err(|e| SshError::ChannelError(format!("Failed to close stdin: {}", e)))?;
    }

    let mut exit = ExitState::default();
    let mut diagnostics = Vec::new();

    while let Some(msg) = channel.wait().await {
        match msg {
            ChannelMsg::Data { ref data } => {
                stdout.write_all(&data[..]).await?;
            }
            ChannelMsg::ExtendedData { ref data, ext } if ext == SSH_EXTENDED_DATA_STDERR => {
                stderr.write_all(&data[..]).await?;
                keep_tail(&mut diagnostics, &data[..]);
            }
            other => {
                if exit.absorb(other) == Flow::Stop {
                    break;
                }
            }
        }
    }

    stdout.flush().await?;
    stderr.flush().await?;

    exit.into_result(command, &diagnostics)
}

/// Append `data`, dropping the oldest bytes past `STDERR_TAIL_LIMIT`
fn keep_tail(buf: &mut Vec<u8>, data: &[u8]) {
    if data.len() >= STDERR_TAIL_LIMIT {
        buf.clear();
        buf.extend_from_slice(&data[data.len() - STDERR_TAIL_LIMIT..]);
        return;
    }
    buf.extend_from_slice(data);
    if buf.len() > STDERR_TAIL_LIMIT {
        let excess = buf.len() - STDERR_TAIL_LIMIT;
        buf.drain(..excess);
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

/// Tracks how the remote process ended
#[derive(Debug, Default)]
struct ExitState {
    status: Option<u32>,
    signal: Option<String>,
    rejected: bool,
}

impl ExitState {
    fn absorb(&mut self, msg: ChannelMsg) -> Flow {
        match msg {
            ChannelMsg::ExitStatus { exit_status } => {
                self.status = Some(exit_status);
                Flow::Continue
            }
            ChannelMsg::ExitSignal {
                signal_name,
                error_message,
                ..
            } => {
                let mut signal = format!("signal {:?}", signal_name);
                if !error_message.is_empty() {
                    signal = format!("{} ({})", signal, error_message);
                }
                self.signal = Some(signal);
                Flow::Continue
            }
            ChannelMsg::Failure => {
                self.rejected = true;
                Flow::Stop
            }
            // Exit status may still follow EOF
            ChannelMsg::Eof => Flow::Continue,
            ChannelMsg::Close => Flow::Stop,
            _ => Flow::Continue,
        }
    }

    fn into_result(self, command: &str, stderr: &[u8]) -> Result<(), SshError> {
        if self.rejected {
            return Err(SshError::CommandAborted {
                command: command.to_string(),
                reason: "exec request rejected by server".to_string(),
            });
        }
        match (self.status, self.signal) {
            (Some(0), _) => Ok(()),
            (Some(exit_status), _) => Err(SshError::CommandFailed {
                command: command.to_string(),
                exit_status,
                stderr: String::from_utf8_lossy(stderr).into_owned(),
            }),
            (None, Some(signal)) => Err(SshError::CommandAborted {
                command: command.to_string(),
                reason: format!("terminated by {}", signal),
            }),
            (None, None) => Err(SshError::CommandAborted {
                command: command.to_string(),
                reason: "channel closed without exit status".to_string(),
            }),
        }
    }
}
