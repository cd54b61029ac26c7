// ABOUTME: In-process SSH server for exercising the russh client end to end.
// ABOUTME: Runs exec requests with `sh -c`, sending stdout as data and stderr as extended data.

use russh::keys::PrivateKey;
use russh::keys::ssh_key::{self, HashAlg};
use russh::server::{Auth, Handle, Msg, Server as _, Session};
use russh::{Channel, ChannelId, CryptoVec};
use sshrun::config::{ConnectionConfig, HostKeyPolicy};
use std::net::SocketAddr;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::net::TcpListener;
use tokio::process::Command;
use tokio::task::JoinHandle;

pub const USER: &str = "tester";
pub const PASSWORD: &str = "letmein";

/// Private key the server accepts for `USER`.
pub const CLIENT_KEY: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/test_key");

/// A well-formed private key the server does not authorize.
pub const UNAUTHORIZED_KEY: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/host_key");

const HOST_KEY: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/host_key");
const AUTHORIZED_KEY: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/test_key.pub");

/// How the server finishes a command's channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ending {
    /// EOF, exit status, close. The order OpenSSH uses.
    ExitStatus,
    /// EOF and close with no exit status, as when the remote side dies.
    NoStatus,
}

/// A running server bound to a random local port. Stops when dropped.
pub struct SshServer {
    port: u16,
    fingerprint: String,
    task: JoinHandle<()>,
}

impl SshServer {
    pub async fn start() -> Self {
        Self::start_with(Ending::ExitStatus).await
    }

    pub async fn start_with(ending: Ending) -> Self {
        let host_key = PrivateKey::read_openssh_file(Path::new(HOST_KEY)).unwrap();
        let fingerprint = host_key
            .public_key()
            .fingerprint(HashAlg::Sha256)
            .to_string();

        let authorized = std::fs::read_to_string(AUTHORIZED_KEY).unwrap();
        let authorized = ssh_key::PublicKey::from_openssh(authorized.trim()).unwrap();

        let config = Arc::new(russh::server::Config {
            keys: vec![host_key],
            auth_rejection_time: Duration::from_millis(10),
            auth_rejection_time_initial: Some(Duration::ZERO),
            ..Default::default()
        });

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let mut server = TestServer {
            authorized: Arc::new(authorized),
            ending,
        };
        let task = tokio::spawn(async move {
            if let Err(e) = server.run_on_socket(config, &listener).await {
                tracing::debug!("test server stopped: {}", e);
            }
        });

        Self {
            port,
            fingerprint,
            task,
        }
    }

    /// Settings that trust this server's host key, without credentials.
    pub fn config(&self, user: &str) -> ConnectionConfig {
        ConnectionConfig::new("127.0.0.1", user)
            .port(self.port)
            .host_key_policy(HostKeyPolicy::Fingerprint(self.fingerprint.clone()))
    }
}

impl Drop for SshServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[derive(Clone)]
struct TestServer {
    authorized: Arc<ssh_key::PublicKey>,
    ending: Ending,
}

impl russh::server::Server for TestServer {
    type Handler = TestHandler;

    fn new_client(&mut self, _peer_addr: Option<SocketAddr>) -> TestHandler {
        TestHandler {
            authorized: Arc::clone(&self.authorized),
            ending: self.ending,
        }
    }
}

struct TestHandler {
    authorized: Arc<ssh_key::PublicKey>,
    ending: Ending,
}

fn reject() -> Auth {
    Auth::Reject {
        proceed_with_methods: None,
        partial_success: false,
    }
}

impl russh::server::Handler for TestHandler {
    type Error = russh::Error;

    async fn auth_password(&mut self, user: &str, password: &str) -> Result<Auth, Self::Error> {
        if user == USER && password == PASSWORD {
            Ok(Auth::Accept)
        } else {
            Ok(reject())
        }
    }

    async fn auth_publickey(
        &mut self,
        user: &str,
        public_key: &ssh_key::PublicKey,
    ) -> Result<Auth, Self::Error> {
        if user == USER && public_key.key_data() == self.authorized.key_data() {
            Ok(Auth::Accept)
        } else {
            Ok(reject())
        }
    }

    fn channel_open_session(
        &mut self,
        _channel: Channel<Msg>,
        _session: &mut Session,
    ) -> impl std::future::Future<Output = Result<bool, Self::Error>> + Send {
        async { Ok(true) }
    }

    fn exec_request(
        &mut self,
        channel: ChannelId,
        data: &[u8],
        session: &mut Session,
    ) -> impl std::future::Future<Output = Result<(), Self::Error>> + Send {
        let command = String::from_utf8_lossy(data).into_owned();
        let _ = session.channel_success(channel);

        // The session does not send handle messages while a handler future
        // is pending, so the command runs on its own task.
        tokio::spawn(exec(session.handle(), channel, command, self.ending));
        async { Ok(()) }
    }
}

async fn exec(handle: Handle, channel: ChannelId, command: String, ending: Ending) {
    let spawned = Command::new("sh")
        .arg("-c")
        .arg(&command)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn();

    let code = match spawned {
        Ok(mut child) => {
            let stdout = child.stdout.take();
            let stderr = child.stderr.take();
            tokio::join!(
                forward(stdout, &handle, channel, None),
                forward(stderr, &handle, channel, Some(1)),
            );
            match child.wait().await {
                Ok(status) => status.code().unwrap_or(255),
                Err(_) => 255,
            }
        }
        Err(_) => 127,
    };

    let _ = handle.eof(channel).await;
    if ending == Ending::ExitStatus {
        let _ = handle.exit_status_request(channel, code as u32).await;
    }
    let _ = handle.close(channel).await;
}

/// Copy a pipe onto the channel, as stdout data or as extended data `ext`.
async fn forward<R>(output: Option<R>, handle: &Handle, channel: ChannelId, ext: Option<u32>)
where
    R: AsyncRead + Unpin,
{
    let Some(mut output) = output else {
        return;
    };
    let mut buf = [0u8; 4096];
    loop {
        let n = match output.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };
        let data = CryptoVec::from_slice(&buf[..n]);
        let sent = match ext {
            Some(ext) => handle.extended_data(channel, ext, data).await,
            None => handle.data(channel, data).await,
        };
        if sent.is_err() {
            break;
        }
    }
}
