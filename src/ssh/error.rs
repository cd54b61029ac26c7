// ABOUTME: SSH-specific error types.
// ABOUTME: Covers credentials, connection, authentication, and streamed command execution.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("either a private key or a password must be configured")]
    MissingCredentials,

    #[error("cannot expand {0}: home directory is unknown")]
    HomeDirUnavailable(PathBuf),

    #[error("failed to load key from {path}: {reason}")]
    KeyLoadFailed { path: PathBuf, reason: String },

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("authentication failed for user {user}")]
    AuthenticationFailed { user: String },

    #[error("failed to open session: {0}")]
    SessionOpen(String),

    #[error("failed to start command: {0}")]
    CommandStart(String),

    #[error("failed to read command output: {0}")]
    OutputRead(#[source] std::io::Error),

    #[error("failed to write command output: {0}")]
    SinkWrite(#[source] std::io::Error),

    #[error("command exited with status {code}")]
    CommandExited { code: i32 },

    #[error("command terminated by signal {signal}")]
    CommandSignaled { signal: String },

    #[error("channel closed unexpectedly without exit status")]
    ChannelClosed,

    #[error("command timed out after {0:?}")]
    CommandTimeout(std::time::Duration),

    #[error("SSH protocol error: {0}")]
    Protocol(#[from] russh::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
