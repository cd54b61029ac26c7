// ABOUTME: Scripted command sessions and sinks.
// ABOUTME: Records which lifecycle calls the executor made so tests can assert on them.

use async_trait::async_trait;
use sshrun::ssh::{CommandSession, Error, ReadOutcome, Result, SessionFactory};
use std::collections::VecDeque;
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tokio::io::AsyncWrite;

/// What the executor did to a fake session.
#[derive(Debug, Default, Clone)]
pub struct Journal {
    pub started: Vec<String>,
    pub reads: usize,
    pub waited: bool,
    pub closed: bool,
}

/// A session whose output and results are scripted up front.
pub struct FakeSession {
    journal: Arc<Mutex<Journal>>,
    output: VecDeque<ReadOutcome>,
    start_error: Option<Error>,
    wait_error: Option<Error>,
    hang: bool,
}

impl FakeSession {
    pub fn new<C: AsRef<[u8]>>(chunks: &[C]) -> Self {
        Self {
            journal: Arc::default(),
            output: chunks
                .iter()
                .map(|c| ReadOutcome::Data(c.as_ref().to_vec()))
                .collect(),
            start_error: None,
            wait_error: None,
            hang: false,
        }
    }

    /// Make the read after the scripted chunks fail instead of ending.
    pub fn read_failure(mut self, err: io::Error) -> Self {
        self.output.push_back(ReadOutcome::Failed(err));
        self
    }

    pub fn start_error(mut self, err: Error) -> Self {
        self.start_error = Some(err);
        self
    }

    pub fn wait_error(mut self, err: Error) -> Self {
        self.wait_error = Some(err);
        self
    }

    /// Block forever once the scripted chunks are used up.
    pub fn hang(mut self) -> Self {
        self.hang = true;
        self
    }

    pub fn journal(&self) -> Arc<Mutex<Journal>> {
        Arc::clone(&self.journal)
    }
}

#[async_trait]
impl CommandSession for FakeSession {
    async fn start(&mut self, command: &str) -> Result<()> {
        self.journal.lock().unwrap().started.push(command.to_string());
        match self.start_error.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn read_stdout(&mut self) -> ReadOutcome {
        self.journal.lock().unwrap().reads += 1;
        match self.output.pop_front() {
            Some(outcome) => outcome,
            None if self.hang => std::future::pending().await,
            None => ReadOutcome::EndOfStream,
        }
    }

    async fn wait(&mut self) -> Result<()> {
        self.journal.lock().unwrap().waited = true;
        match self.wait_error.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn close(&mut self) {
        self.journal.lock().unwrap().closed = true;
    }
}

/// Hands out a single fake session.
pub struct FakeFactory {
    session: Mutex<Option<FakeSession>>,
    refuse: bool,
    stall: bool,
}

impl FakeFactory {
    pub fn new(session: FakeSession) -> Self {
        Self {
            session: Mutex::new(Some(session)),
            refuse: false,
            stall: false,
        }
    }

    /// A factory whose session can never be opened.
    pub fn refusing(session: FakeSession) -> Self {
        Self {
            session: Mutex::new(Some(session)),
            refuse: true,
            stall: false,
        }
    }

    /// A factory whose session open never gets an answer.
    pub fn stalled(session: FakeSession) -> Self {
        Self {
            session: Mutex::new(Some(session)),
            refuse: false,
            stall: true,
        }
    }
}

#[async_trait]
impl SessionFactory for FakeFactory {
    type Session = FakeSession;

    async fn new_session(&self) -> Result<FakeSession> {
        if self.stall {
            std::future::pending::<()>().await;
        }
        if self.refuse {
            return Err(Error::SessionOpen("administratively prohibited".to_string()));
        }
        let session = self.session.lock().unwrap().take();
        session.ok_or_else(|| Error::SessionOpen("fake session already used".to_string()))
    }
}

/// Sink recording each write separately, optionally failing the nth one.
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub writes: Vec<Vec<u8>>,
    pub flushes: usize,
    fail_on: Option<usize>,
    attempts: usize,
}

impl RecordingSink {
    pub fn failing_on(nth: usize) -> Self {
        Self {
            fail_on: Some(nth),
            ..Default::default()
        }
    }

    pub fn joined(&self) -> Vec<u8> {
        self.writes.concat()
    }
}

impl AsyncWrite for RecordingSink {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        this.attempts += 1;
        if this.fail_on == Some(this.attempts) {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "sink closed",
            )));
        }
        this.writes.push(buf.to_vec());
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.get_mut().flushes += 1;
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}
