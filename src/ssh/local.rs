// ABOUTME: Command sessions backed by the system's ssh binary.
// ABOUTME: Spawns `ssh -- <host> <command>` and streams the subprocess's stdout.

use super::error::{Error, Result};
use super::session::{CommandSession, ReadOutcome, SessionFactory};
use super::stream;
use async_trait::async_trait;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWrite};
use tokio::process::{Child, ChildStdout, Command};

const READ_CHUNK: usize = 8 * 1024;

/// A destination reached through the locally installed ssh client.
///
/// Authentication and host key checking are left to ssh and its own
/// configuration (~/.ssh/config, agent, known_hosts).
#[derive(Debug, Clone)]
pub struct LocalSsh {
    host: String,
    program: String,
    command_timeout: Option<Duration>,
}

impl LocalSsh {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            program: "ssh".to_string(),
            command_timeout: None,
        }
    }

    /// Use a different ssh executable.
    pub fn program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = Some(timeout);
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Run a command on the host, streaming its output into `sink`.
    pub async fn run<W>(&self, command: &str, sink: &mut W) -> Result<()>
    where
        W: AsyncWrite + Unpin + Send + ?Sized,
    {
        match self.command_timeout {
            Some(limit) => stream::run_with_timeout(self, command, sink, limit).await,
            None => stream::run(self, command, sink).await,
        }
    }
}

#[async_trait]
impl SessionFactory for LocalSsh {
    type Session = LocalSession;

    async fn new_session(&self) -> Result<LocalSession> {
        Ok(LocalSession {
            program: self.program.clone(),
            host: self.host.clone(),
            child: None,
            stdout: None,
            buf: vec![0u8; READ_CHUNK],
        })
    }
}

/// One ssh subprocess.
pub struct LocalSession {
    program: String,
    host: String,
    child: Option<Child>,
    stdout: Option<ChildStdout>,
    buf: Vec<u8>,
}

impl LocalSession {
    /// `<program> -- <host> <command>`. The `--` keeps a host such as
    /// `-oProxyCommand=...` from being read as an ssh option.
    fn command_line(&self, command: &str) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg("--").arg(&self.host).arg(command);
        cmd
    }
}

#[async_trait]
impl CommandSession for LocalSession {
    async fn start(&mut self, command: &str) -> Result<()> {
        let mut child = self
            .command_line(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::CommandStart(format!("{}: {}", self.program, e)))?;

        self.stdout = child.stdout.take();
        self.child = Some(child);
        Ok(())
    }

    async fn read_stdout(&mut self) -> ReadOutcome {
        let Some(stdout) = self.stdout.as_mut() else {
            return ReadOutcome::EndOfStream;
        };
        match stdout.read(&mut self.buf).await {
            Ok(0) => ReadOutcome::EndOfStream,
            Ok(n) => ReadOutcome::Data(self.buf[..n].to_vec()),
            Err(e) => ReadOutcome::Failed(e),
        }
    }

    async fn wait(&mut self) -> Result<()> {
        self.stdout = None;
        let child = self
            .child
            .as_mut()
            .ok_or_else(|| Error::CommandStart("command was never started".to_string()))?;
        let status = child.wait().await?;
        exit_result(status)
    }

    async fn close(&mut self) {
        self.stdout = None;
        let Some(mut child) = self.child.take() else {
            return;
        };
        match child.try_wait() {
            Ok(Some(_)) => {}
            _ => {
                tracing::debug!("killing ssh process for {}", self.host);
                if let Err(e) = child.kill().await {
                    tracing::debug!("failed to kill ssh process: {}", e);
                }
            }
        }
    }
}

fn exit_result(status: ExitStatus) -> Result<()> {
    if status.success() {
        return Ok(());
    }
    if let Some(code) = status.code() {
        return Err(Error::CommandExited { code });
    }
    Err(Error::CommandSignaled {
        signal: signal_name(status),
    })
}

#[cfg(unix)]
fn signal_name(status: ExitStatus) -> String {
    use std::os::unix::process::ExitStatusExt;
    status
        .signal()
        .map(|s| s.to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(not(unix))]
fn signal_name(_status: ExitStatus) -> String {
    "unknown".to_string()
}
