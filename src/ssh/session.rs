// ABOUTME: Command session abstraction shared by the russh and local ssh paths.
// ABOUTME: Also implements a session on top of a russh channel.

use super::error::{Error, Result};
use async_trait::async_trait;
use russh::{Channel, ChannelMsg, client};

/// Result of reading from a command's standard output.
#[derive(Debug)]
pub enum ReadOutcome {
    Data(Vec<u8>),
    EndOfStream,
    Failed(std::io::Error),
}

/// One command's execution context. Not reusable across commands.
#[async_trait]
pub trait CommandSession: Send {
    /// Start the command. Standard output is captured from the first byte.
    async fn start(&mut self, command: &str) -> Result<()>;

    /// Next chunk of standard output.
    async fn read_stdout(&mut self) -> ReadOutcome;

    /// Wait for the command to exit. Non-zero exits are errors.
    async fn wait(&mut self) -> Result<()>;

    /// Release the session's resources. Safe to call in any state.
    async fn close(&mut self);
}

/// Something that can open command sessions.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    type Session: CommandSession;

    async fn new_session(&self) -> Result<Self::Session>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Exit {
    Status(u32),
    Signal(String),
}

/// A command session running on a russh channel.
pub struct ChannelSession {
    channel: Channel<client::Msg>,
    exit: Option<Exit>,
    got_eof: bool,
    closed: bool,
}

impl ChannelSession {
    pub(crate) fn new(channel: Channel<client::Msg>) -> Self {
        Self {
            channel,
            exit: None,
            got_eof: false,
            closed: false,
        }
    }

    /// Record one channel message, returning stdout data if it carried any.
    fn record(&mut self, msg: Option<ChannelMsg>) -> Option<Vec<u8>> {
        match msg {
            Some(ChannelMsg::Data { data }) => return Some(data.to_vec()),
            Some(ChannelMsg::ExtendedData { data, ext }) => {
                tracing::trace!(ext, len = data.len(), "discarding extended data");
            }
            Some(ChannelMsg::ExitStatus { exit_status }) => {
                self.exit = Some(Exit::Status(exit_status));
            }
            Some(ChannelMsg::ExitSignal { signal_name, .. }) => {
                self.exit = Some(Exit::Signal(format!("{:?}", signal_name)));
            }
            Some(ChannelMsg::Eof) => self.got_eof = true,
            Some(ChannelMsg::Close) | None => self.closed = true,
            Some(_) => {}
        }
        None
    }
}

#[async_trait]
impl CommandSession for ChannelSession {
    async fn start(&mut self, command: &str) -> Result<()> {
        self.channel
            .exec(true, command)
            .await
            .map_err(|e| Error::CommandStart(e.to_string()))
    }

    async fn read_stdout(&mut self) -> ReadOutcome {
        while !self.got_eof && !self.closed {
            let msg = self.channel.wait().await;
            if let Some(data) = self.record(msg) {
                return ReadOutcome::Data(data);
            }
        }
        ReadOutcome::EndOfStream
    }

    async fn wait(&mut self) -> Result<()> {
        while !self.closed && !(self.got_eof && self.exit.is_some()) {
            let msg = self.channel.wait().await;
            if let Some(data) = self.record(msg) {
                tracing::trace!(len = data.len(), "discarding output received after end of stream");
            }
        }

        // A channel that closes without an exit status indicates abnormal
        // termination (e.g. connection loss)
        match self.exit.take() {
            Some(Exit::Status(0)) => Ok(()),
            Some(Exit::Status(code)) => Err(Error::CommandExited {
                code: i32::try_from(code).unwrap_or(i32::MAX),
            }),
            Some(Exit::Signal(signal)) => Err(Error::CommandSignaled { signal }),
            None => Err(Error::ChannelClosed),
        }
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        if let Err(e) = self.channel.close().await {
            tracing::debug!("failed to close channel: {}", e);
        }
        self.closed = true;
    }
}
