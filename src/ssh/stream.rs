// ABOUTME: Streaming command execution.
// ABOUTME: Forwards a command's stdout to a sink line by line while it runs, then waits for exit.

use super::error::{Error, Result};
use super::session::{CommandSession, ReadOutcome, SessionFactory};
use std::future::Future;
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::time::Instant;

/// Run `command` in a fresh session, forwarding each output line to `sink`.
///
/// Lines are written (newline included) and flushed one at a time, in the
/// order the command produced them. Output after the last newline is
/// dropped. Returns once the command has exited; a sink failure returns
/// immediately without waiting for the command.
pub async fn run<F, W>(factory: &F, command: &str, sink: &mut W) -> Result<()>
where
    F: SessionFactory + ?Sized,
    W: AsyncWrite + Unpin + Send + ?Sized,
{
    execute(factory, command, sink, None).await
}

/// Like [`run`], but gives up after `limit`, closing the session.
///
/// The limit covers the whole run, from opening the session to the exit.
pub async fn run_with_timeout<F, W>(
    factory: &F,
    command: &str,
    sink: &mut W,
    limit: Duration,
) -> Result<()>
where
    F: SessionFactory + ?Sized,
    W: AsyncWrite + Unpin + Send + ?Sized,
{
    execute(factory, command, sink, Some(limit)).await
}

async fn execute<F, W>(
    factory: &F,
    command: &str,
    sink: &mut W,
    limit: Option<Duration>,
) -> Result<()>
where
    F: SessionFactory + ?Sized,
    W: AsyncWrite + Unpin + Send + ?Sized,
{
    let deadline = limit.map(|limit| (Instant::now() + limit, limit));

    let mut session = within(deadline, command, factory.new_session()).await?;
    let result = within(deadline, command, drive(&mut session, command, sink)).await;

    session.close().await;
    result
}

/// Await `fut`, failing with `CommandTimeout` once the deadline has passed.
async fn within<T>(
    deadline: Option<(Instant, Duration)>,
    command: &str,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    let Some((at, limit)) = deadline else {
        return fut.await;
    };
    match tokio::time::timeout_at(at, fut).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!("command timed out after {:?}: {}", limit, command);
            Err(Error::CommandTimeout(limit))
        }
    }
}

async fn drive<S, W>(session: &mut S, command: &str, sink: &mut W) -> Result<()>
where
    S: CommandSession + ?Sized,
    W: AsyncWrite + Unpin + Send + ?Sized,
{
    tracing::debug!("starting command: {}", command);
    session.start(command).await?;

    let mut lines = LineBuffer::default();
    while let Some(line) = lines.next_line(session).await? {
        sink.write_all(&line).await.map_err(Error::SinkWrite)?;
        sink.flush().await.map_err(Error::SinkWrite)?;
    }

    session.wait().await
}

/// Accumulates output chunks and hands out complete lines.
///
/// Every byte is searched for a newline once, however many chunks a line
/// spans.
#[derive(Default)]
struct LineBuffer {
    pending: Vec<u8>,
    /// Start of the first line not yet handed out.
    start: usize,
    /// Bytes after `start` already known to hold no newline.
    scanned: usize,
}

impl LineBuffer {
    fn push(&mut self, data: &[u8]) {
        if self.start > 0 {
            self.pending.drain(..self.start);
            self.start = 0;
        }
        self.pending.extend_from_slice(data);
    }

    fn pop_line(&mut self) -> Option<Vec<u8>> {
        let from = self.start + self.scanned;
        match self.pending[from..].iter().position(|&b| b == b'\n') {
            Some(i) => {
                let end = from + i + 1;
                let line = self.pending[self.start..end].to_vec();
                self.start = end;
                self.scanned = 0;
                Some(line)
            }
            None => {
                self.scanned = self.pending.len() - self.start;
                None
            }
        }
    }

    fn remainder(&self) -> &[u8] {
        &self.pending[self.start..]
    }

    /// Next newline-terminated line, or None once the stream has ended.
    async fn next_line<S>(&mut self, session: &mut S) -> Result<Option<Vec<u8>>>
    where
        S: CommandSession + ?Sized,
    {
        loop {
            if let Some(line) = self.pop_line() {
                return Ok(Some(line));
            }
            match session.read_stdout().await {
                ReadOutcome::Data(data) => self.push(&data),
                ReadOutcome::EndOfStream => {
                    if !self.remainder().is_empty() {
                        tracing::debug!(
                            bytes = self.remainder().len(),
                            "dropping unterminated trailing output"
                        );
                    }
                    return Ok(None);
                }
                ReadOutcome::Failed(e) => return Err(Error::OutputRead(e)),
            }
        }
    }
}
