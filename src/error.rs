// ABOUTME: Application-wide error types for sshrun.
// ABOUTME: Uses thiserror for ergonomic error handling.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("hosts file not found in {0}")]
    ConfigNotFound(PathBuf),

    #[error("unknown host: {0}")]
    UnknownHost(String),

    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid target: {0}")]
    InvalidTarget(String),

    #[error(transparent)]
    Ssh(#[from] crate::ssh::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl Error {
    /// Process exit code for this error.
    ///
    /// A remote command's own non-zero status is passed through.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Ssh(crate::ssh::Error::CommandExited { code }) if (1..=255).contains(code) => {
                *code
            }
            _ => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
