// ABOUTME: SSH command execution with streamed output.
// ABOUTME: Runs commands over russh (key or password auth) or the local ssh binary.

mod client;
mod credentials;
mod error;
mod handler;
mod local;
mod session;
mod stream;

pub use client::{Client, join_host_port};
pub use credentials::{AuthMethod, expand_home, resolve};
pub use error::{Error, Result};
pub use local::{LocalSession, LocalSsh};
pub use session::{ChannelSession, CommandSession, ReadOutcome, SessionFactory};
pub use stream::{run, run_with_timeout};
