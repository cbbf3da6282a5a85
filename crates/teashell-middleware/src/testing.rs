//! In-memory session and recording program for tests.
//!
//! Public so downstream crates can exercise their own handlers and models
//! against the supervisor without a real transport.

use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};

use async_trait::async_trait;
use tokio::io::{AsyncWrite, AsyncWriteExt, DuplexStream};
use tokio::sync::{mpsc, Notify};
use tokio_util::sync::CancellationToken;

use teashell_core::{Environ, Error, Msg, Pty, Result, SessionId, WindowSize};

use crate::context::SessionContext;
use crate::program::Program;
use crate::session::{Session, SessionReader, SessionWriter, WindowChanges};

/// Output sink that keeps everything written to it.
#[derive(Debug, Clone, Default)]
pub struct CapturedOutput(Arc<Mutex<Vec<u8>>>);

impl CapturedOutput {
    /// Everything written so far, lossily decoded.
    pub fn contents(&self) -> String {
        let bytes = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

impl AsyncWrite for CapturedOutput {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

/// Output sink whose client has gone away.
#[derive(Debug, Clone, Copy, Default)]
pub struct BrokenOutput;

impl AsyncWrite for BrokenOutput {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Poll::Ready(Err(io::Error::new(io::ErrorKind::BrokenPipe, "client gone")))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

/// Output sink whose client stopped reading: every write stays pending.
#[derive(Debug, Clone, Copy, Default)]
pub struct StalledOutput;

impl AsyncWrite for StalledOutput {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Poll::Pending
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Pending
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Pending
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum OutputMode {
    #[default]
    Captured,
    Broken,
    Stalled,
}

/// A session backed by in-memory streams.
pub struct TestSession {
    id: SessionId,
    context: SessionContext,
    environ: Environ,
    pty: Option<Pty>,
    changes: Mutex<Option<WindowChanges>>,
    reader: SessionReader,
    writer: SessionWriter,
}

impl TestSession {
    /// Start building a session. Without [`TestSessionBuilder::pty`] the
    /// session has no terminal.
    pub fn builder() -> TestSessionBuilder {
        TestSessionBuilder::default()
    }
}

impl Session for TestSession {
    fn id(&self) -> SessionId {
        self.id
    }

    fn reader(&self) -> SessionReader {
        self.reader.clone()
    }

    fn writer(&self) -> SessionWriter {
        self.writer.clone()
    }

    fn context(&self) -> &SessionContext {
        &self.context
    }

    fn environ(&self) -> Environ {
        self.environ.clone()
    }

    fn pty(&self) -> Option<Pty> {
        self.pty.clone()
    }

    fn window_changes(&self) -> Option<WindowChanges> {
        self.changes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

/// Builder for [`TestSession`].
#[derive(Debug, Default)]
pub struct TestSessionBuilder {
    env: Vec<String>,
    pty: Option<Pty>,
    output: OutputMode,
}

impl TestSessionBuilder {
    /// Add a client environment variable.
    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.env.push(format!("{key}={value}"));
        self
    }

    /// Allocate a terminal.
    pub fn pty(mut self, term: &str, window: WindowSize) -> Self {
        self.pty = Some(Pty::new(term, window));
        self
    }

    /// Make every write to the session output fail.
    pub fn broken_output(mut self) -> Self {
        self.output = OutputMode::Broken;
        self
    }

    /// Make every write to the session output block forever.
    pub fn stalled_output(mut self) -> Self {
        self.output = OutputMode::Stalled;
        self
    }

    /// Build the session and the client end driving it.
    pub fn build(self) -> (Arc<TestSession>, TestClient) {
        let (client_input, session_input) = tokio::io::duplex(4096);
        let output = CapturedOutput::default();
        let writer = match self.output {
            OutputMode::Captured => SessionWriter::new(output.clone()),
            OutputMode::Broken => SessionWriter::new(BrokenOutput),
            OutputMode::Stalled => SessionWriter::new(StalledOutput),
        };

        let (resizes, changes) = if self.pty.is_some() {
            let (tx, rx) = mpsc::channel(64);
            (Some(tx), Some(rx))
        } else {
            (None, None)
        };

        let session = TestSession {
            id: SessionId::new(),
            context: SessionContext::new(),
            environ: Environ::new(self.env),
            pty: self.pty,
            changes: Mutex::new(changes),
            reader: SessionReader::new(session_input),
            writer,
        };
        let client = TestClient {
            resizes,
            input: client_input,
            output,
        };
        (Arc::new(session), client)
    }
}

/// The remote end of a [`TestSession`].
#[derive(Debug)]
pub struct TestClient {
    resizes: Option<mpsc::Sender<WindowSize>>,
    input: DuplexStream,
    output: CapturedOutput,
}

impl TestClient {
    /// Report a terminal resize. Returns false if nobody holds the feed.
    pub async fn resize(&self, width: u16, height: u16) -> bool {
        match &self.resizes {
            Some(tx) => tx.send(WindowSize::new(width, height)).await.is_ok(),
            None => false,
        }
    }

    /// Whether the session's resize feed has been dropped by its consumer.
    pub fn resize_feed_closed(&self) -> bool {
        self.resizes.as_ref().map_or(true, |tx| tx.is_closed())
    }

    /// Close the resize feed, as a transport does when the client leaves.
    pub fn close_resizes(&mut self) {
        self.resizes = None;
    }

    /// Type bytes into the session input.
    pub async fn type_input(&mut self, bytes: &[u8]) {
        // A closed pipe just means the program stopped reading.
        let _ = self.input.write_all(bytes).await;
    }

    /// Everything the session wrote so far.
    pub fn output(&self) -> String {
        self.output.contents()
    }
}

/// How a [`MockProgram`] behaves when run.
#[derive(Debug, Clone)]
pub enum MockBehavior {
    /// Run until quit (Ok) or kill (Err)
    UntilStopped,
    /// Return Ok once this many messages arrived
    AfterMessages(usize),
    /// Fail immediately with this message
    Fail(String),
    /// Panic immediately with this message
    Panic(String),
}

/// Program that records every call made to it.
#[derive(Debug)]
pub struct MockProgram {
    behavior: MockBehavior,
    messages: Mutex<Vec<Msg>>,
    arrived: Notify,
    started: CancellationToken,
    quit: CancellationToken,
    killed: CancellationToken,
    finished: CancellationToken,
    run_calls: AtomicUsize,
    quit_calls: AtomicUsize,
    kill_calls: AtomicUsize,
    late_sends: AtomicUsize,
}

impl MockProgram {
    /// Create a mock with the given behavior.
    pub fn new(behavior: MockBehavior) -> Arc<Self> {
        Arc::new(Self {
            behavior,
            messages: Mutex::new(Vec::new()),
            arrived: Notify::new(),
            started: CancellationToken::new(),
            quit: CancellationToken::new(),
            killed: CancellationToken::new(),
            finished: CancellationToken::new(),
            run_calls: AtomicUsize::new(0),
            quit_calls: AtomicUsize::new(0),
            kill_calls: AtomicUsize::new(0),
            late_sends: AtomicUsize::new(0),
        })
    }

    fn received(&self) -> usize {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Messages delivered while the program was not finished.
    pub fn messages(&self) -> Vec<Msg> {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Window sizes among the delivered messages, in order.
    pub fn window_sizes(&self) -> Vec<WindowSize> {
        self.messages()
            .into_iter()
            .filter_map(|msg| match msg {
                Msg::WindowSize(size) => Some(size),
                _ => None,
            })
            .collect()
    }

    /// Wait until `run` has been entered.
    pub async fn wait_started(&self) {
        self.started.cancelled().await;
    }

    /// Wait until at least `count` messages were delivered.
    pub async fn wait_for_messages(&self, count: usize) {
        loop {
            let notified = self.arrived.notified();
            if self.received() >= count {
                return;
            }
            notified.await;
        }
    }

    /// Number of `run` calls.
    pub fn run_count(&self) -> usize {
        self.run_calls.load(Ordering::SeqCst)
    }

    /// Number of `quit` calls.
    pub fn quit_count(&self) -> usize {
        self.quit_calls.load(Ordering::SeqCst)
    }

    /// Number of `kill` calls.
    pub fn kill_count(&self) -> usize {
        self.kill_calls.load(Ordering::SeqCst)
    }

    /// Number of sends that arrived after `run` returned.
    pub fn late_sends(&self) -> usize {
        self.late_sends.load(Ordering::SeqCst)
    }

    async fn behave(&self) -> Result<()> {
        match &self.behavior {
            MockBehavior::Fail(message) => Err(Error::Other(message.clone())),
            MockBehavior::Panic(message) => panic!("{message}"),
            MockBehavior::UntilStopped => {
                tokio::select! {
                    biased;
                    _ = self.killed.cancelled() => Err(Error::ProgramKilled),
                    _ = self.quit.cancelled() => Ok(()),
                }
            }
            MockBehavior::AfterMessages(count) => {
                tokio::select! {
                    biased;
                    _ = self.killed.cancelled() => Err(Error::ProgramKilled),
                    _ = self.quit.cancelled() => Ok(()),
                    _ = self.wait_for_messages(*count) => Ok(()),
                }
            }
        }
    }
}

#[async_trait]
impl Program for MockProgram {
    async fn run(&self) -> Result<()> {
        self.run_calls.fetch_add(1, Ordering::SeqCst);
        self.started.cancel();
        let result = self.behave().await;
        self.finished.cancel();
        result
    }

    async fn send(&self, msg: Msg) {
        if self.finished.is_cancelled() {
            self.late_sends.fetch_add(1, Ordering::SeqCst);
            return;
        }
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(msg);
        self.arrived.notify_waiters();
    }

    fn quit(&self) {
        self.quit_calls.fetch_add(1, Ordering::SeqCst);
        self.quit.cancel();
    }

    fn kill(&self) {
        self.kill_calls.fetch_add(1, Ordering::SeqCst);
        self.killed.cancel();
    }
}
