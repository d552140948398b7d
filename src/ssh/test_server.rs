//! In-process SSH server for tests
//!
//! Accepts any credentials. Exec requests run through `sh -c` with `HOME`
//! pointed at a scratch directory, and the `sftp` subsystem serves the local
//! filesystem.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use rand::rngs::OsRng;
use rand::RngCore;
use russh::keys::ssh_key::private::Ed25519Keypair;
use russh::keys::{PrivateKey, PublicKey};
use russh::server::{self, Auth, Msg, Session};
use russh::{Channel, ChannelId, ChannelMsg};
use russh_sftp::protocol::{Data, FileAttributes, Handle, OpenFlags, Status, StatusCode};
use tempfile::TempDir;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;

/// How the server answers an `sftp` subsystem request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SftpMode {
    Serve,
    /// Accept the subsystem and never send a packet
    Stall,
}

pub struct TestServer {
    port: u16,
    home: TempDir,
}

impl TestServer {
    /// Listen on a loopback port. The remote home gets an empty `.ssh`.
    pub async fn start(sftp: SftpMode) -> Self {
        let home = tempfile::tempdir().unwrap();
        std::fs::create_dir(home.path().join(".ssh")).unwrap();

        let mut seed = [0u8; 32];
        OsRng.fill_bytes(&mut seed);
        let config = Arc::new(server::Config {
            keys: vec![PrivateKey::from(Ed25519Keypair::from_seed(&seed))],
            ..Default::default()
        });

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let remote_home = home.path().to_path_buf();

        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let handler = ServerHandler {
                    home: remote_home.clone(),
                    sftp,
                    channels: HashMap::new(),
                };
                let config = config.clone();
                tokio::spawn(async move {
                    if let Ok(session) = server::run_stream(config, stream, handler).await {
                        let _ = session.await;
                    }
                });
            }
        });

        Self { port, home }
    }

    pub fn host_spec(&self) -> String {
        format!("tester@127.0.0.1:{}", self.port)
    }

    /// `$HOME` of every remote command
    pub fn home(&self) -> &Path {
        self.home.path()
    }
}

struct ServerHandler {
    home: PathBuf,
    sftp: SftpMode,
    channels: HashMap<ChannelId, Channel<Msg>>,
}

impl server::Handler for ServerHandler {
    type Error = russh::Error;

    async fn auth_password(&mut self, _user: &str, _password: &str) -> Result<Auth, Self::Error> {
        Ok(Auth::Accept)
    }

    async fn auth_publickey(
        &mut self,
        _user: &str,
        _public_key: &PublicKey,
    ) -> Result<Auth, Self::Error> {
        Ok(Auth::Accept)
    }

    async fn channel_open_session(
        &mut self,
        channel: Channel<Msg>,
        _session: &mut Session,
    ) -> Result<bool, Self::Error> {
        self.channels.insert(channel.id(), channel);
        Ok(true)
    }

    async fn exec_request(
        &mut self,
        id: ChannelId,
        data: &[u8],
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        let Some(channel) = self.channels.remove(&id) else {
            session.channel_failure(id)?;
            return Ok(());
        };
        session.channel_success(id)?;
        let command = String::from_utf8_lossy(data).into_owned();
        tokio::spawn(run_command(channel, command, self.home.clone()));
        Ok(())
    }

    async fn subsystem_request(
        &mut self,
        id: ChannelId,
        name: &str,
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        if name != "sftp" {
            session.channel_failure(id)?;
            return Ok(());
        }
        match self.sftp {
            SftpMode::Serve => match self.channels.remove(&id) {
                Some(channel) => {
                    session.channel_success(id)?;
                    russh_sftp::server::run(channel.into_stream(), LocalFs::default()).await;
                }
                None => session.channel_failure(id)?,
            },
            // The channel stays parked in the map, unread
            SftpMode::Stall => session.channel_success(id)?,
        }
        Ok(())
    }
}

async fn run_command(channel: Channel<Msg>, command: String, home: PathBuf) {
    let (mut reader, writer) = channel.split();

    let child = tokio::process::Command::new("sh")
        .arg("-c")
        .arg(&command)
        .env("HOME", &home)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn();
    let mut child = match child {
        Ok(child) => child,
        Err(_) => {
            let _ = writer.exit_status(127).await;
            let _ = writer.close().await;
            return;
        }
    };

    let mut stdin = child.stdin.take();
    tokio::spawn(async move {
        while let Some(msg) = reader.wait().await {
            match msg {
                ChannelMsg::Data { data } => {
                    if let Some(pipe) = stdin.as_mut() {
                        let _ = pipe.write_all(&data[..]).await;
                    }
                }
                ChannelMsg::Eof => drop(stdin.take()),
                _ => {}
            }
        }
    });

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let forward_stdout = async {
        if let Some(pipe) = stdout {
            let _ = writer.data(pipe).await;
        }
    };
    let forward_stderr = async {
        if let Some(pipe) = stderr {
            let _ = writer.extended_data(1, pipe).await;
        }
    };
    tokio::join!(forward_stdout, forward_stderr);

    let status = child
        .wait()
        .await
        .ok()
        .and_then(|status| status.code())
        .unwrap_or(255);
    let _ = writer.exit_status(status as u32).await;
    let _ = writer.eof().await;
    let _ = writer.close().await;
}

/// Read/write/close on real files, enough for whole-file transfers
#[derive(Default)]
struct LocalFs {
    files: HashMap<String, File>,
    next_handle: u64,
}

fn status_code(err: std::io::Error) -> StatusCode {
    match err.kind() {
        ErrorKind::NotFound => StatusCode::NoSuchFile,
        ErrorKind::PermissionDenied => StatusCode::PermissionDenied,
        _ => StatusCode::Failure,
    }
}

fn ok_status(id: u32) -> Status {
    Status {
        id,
        status_code: StatusCode::Ok,
        error_message: "Ok".to_string(),
        language_tag: "en-US".to_string(),
    }
}

impl russh_sftp::server::Handler for LocalFs {
    type Error = StatusCode;

    fn unimplemented(&self) -> Self::Error {
        StatusCode::OpUnsupported
    }

    async fn open(
        &mut self,
        id: u32,
        filename: String,
        pflags: OpenFlags,
        _attrs: FileAttributes,
    ) -> Result<Handle, Self::Error> {
        let file = OpenOptions::new()
            .read(pflags.contains(OpenFlags::READ))
            .write(pflags.contains(OpenFlags::WRITE))
            .create(pflags.contains(OpenFlags::CREATE))
            .truncate(pflags.contains(OpenFlags::TRUNCATE))
            .open(&filename)
            .map_err(status_code)?;

        self.next_handle += 1;
        let handle = self.next_handle.to_string();
        self.files.insert(handle.clone(), file);
        Ok(Handle { id, handle })
    }

    async fn read(
        &mut self,
        id: u32,
        handle: String,
        offset: u64,
        len: u32,
    ) -> Result<Data, Self::Error> {
        let file = self.files.get_mut(&handle).ok_or(StatusCode::Failure)?;
        file.seek(SeekFrom::Start(offset)).map_err(status_code)?;

        let mut data = vec![0; len as usize];
        let n = file.read(&mut data).map_err(status_code)?;
        if n == 0 {
            return Err(StatusCode::Eof);
        }
        data.truncate(n);
        Ok(Data { id, data })
    }

    async fn write(
        &mut self,
        id: u32,
        handle: String,
        offset: u64,
        data: Vec<u8>,
    ) -> Result<Status, Self::Error> {
        let file = self.files.get_mut(&handle).ok_or(StatusCode::Failure)?;
        file.seek(SeekFrom::Start(offset)).map_err(status_code)?;
        file.write_all(&data).map_err(status_code)?;
        Ok(ok_status(id))
    }

    async fn close(&mut self, id: u32, handle: String) -> Result<Status, Self::Error> {
        self.files.remove(&handle);
        Ok(ok_status(id))
    }
}
