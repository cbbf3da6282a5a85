//! Programs bound to a session, and the event loop that runs a [`Model`].

use std::future::Future;
use std::ops::ControlFlow;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use teashell_core::{Error, Msg, Result, WindowSize};

use crate::session::{Session, SessionReader, SessionWriter};

/// Default capacity of a program's inbound message channel.
pub const DEFAULT_MESSAGE_BUFFER: usize = 32;

const HIDE_CURSOR: &str = "\x1b[?25l";
const SHOW_CURSOR: &str = "\x1b[?25h";
const ENTER_ALT_SCREEN: &str = "\x1b[?1049h";
const EXIT_ALT_SCREEN: &str = "\x1b[?1049l";
const CLEAR_SCREEN: &str = "\x1b[H\x1b[2J";

/// How long a stopped program waits for its terminal restore to be written.
const RESTORE_TIMEOUT: Duration = Duration::from_millis(250);

/// A running interactive program owned by one session.
#[async_trait]
pub trait Program: Send + Sync {
    /// Run until the program finishes, is asked to quit, or is killed.
    async fn run(&self) -> Result<()>;

    /// Deliver a message. Waits for channel capacity; does nothing once the
    /// program has finished.
    async fn send(&self, msg: Msg);

    /// Ask the program to stop gracefully.
    fn quit(&self);

    /// Stop the program immediately and restore the terminal. Safe to call
    /// any number of times, including after the program already stopped.
    fn kill(&self);
}

/// What the event loop should do after an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Command {
    /// Keep running
    #[default]
    None,
    /// Stop the program
    Quit,
}

/// Application state driven by [`EventLoop`].
pub trait Model: Send + 'static {
    /// Called once before the first render.
    fn init(&mut self) -> Command {
        Command::None
    }

    /// Apply a message.
    fn update(&mut self, msg: &Msg) -> Command;

    /// Render the current state. Lines are separated by `\n`.
    fn view(&self) -> String;
}

/// Stream bindings and settings for a program.
#[derive(Debug, Clone, Default)]
pub struct ProgramOptions {
    /// Stream the program reads client input from
    pub input: Option<SessionReader>,
    /// Stream the program renders to
    pub output: Option<SessionWriter>,
    /// Window size delivered as the first message
    pub initial_size: Option<WindowSize>,
    /// Render on the alternate screen
    pub alt_screen: bool,
    /// Inbound message channel capacity
    pub message_buffer: Option<usize>,
}

impl ProgramOptions {
    /// Empty options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Read input from `reader`.
    pub fn with_input(mut self, reader: SessionReader) -> Self {
        self.input = Some(reader);
        self
    }

    /// Render to `writer`.
    pub fn with_output(mut self, writer: SessionWriter) -> Self {
        self.output = Some(writer);
        self
    }

    /// Start with a known window size.
    pub fn with_initial_size(mut self, size: WindowSize) -> Self {
        self.initial_size = Some(size);
        self
    }

    /// Use the alternate screen.
    pub fn with_alt_screen(mut self) -> Self {
        self.alt_screen = true;
        self
    }

    /// Set the inbound message channel capacity.
    pub fn with_message_buffer(mut self, capacity: usize) -> Self {
        self.message_buffer = Some(capacity);
        self
    }

    /// Overlay `other` on top of `self`; fields set in `other` win.
    pub fn merge(self, other: ProgramOptions) -> Self {
        Self {
            input: other.input.or(self.input),
            output: other.output.or(self.output),
            initial_size: other.initial_size.or(self.initial_size),
            alt_screen: self.alt_screen || other.alt_screen,
            message_buffer: other.message_buffer.or(self.message_buffer),
        }
    }
}

/// Options binding a program to the session's streams and terminal size.
///
/// A program built without these reads and writes nothing useful; programs
/// built directly by a handler must include them.
pub fn make_options(session: &dyn Session) -> ProgramOptions {
    let options = ProgramOptions::new()
        .with_input(session.reader())
        .with_output(session.writer());
    match session.pty() {
        Some(pty) => options.with_initial_size(pty.window),
        None => options,
    }
}

/// Minimal runtime that drives a [`Model`] against session streams.
///
/// Every update re-renders the full view; there is no diffing.
pub struct EventLoop<M: Model> {
    model: Mutex<Option<M>>,
    inbox: Mutex<Option<mpsc::Receiver<Msg>>>,
    sender: mpsc::Sender<Msg>,
    input: SessionReader,
    output: SessionWriter,
    initial_size: Option<WindowSize>,
    alt_screen: bool,
    quit: CancellationToken,
    killed: CancellationToken,
    finished: CancellationToken,
}

impl<M: Model> EventLoop<M> {
    /// Build a program. Fails if the input or output stream is not bound.
    pub fn new(model: M, options: ProgramOptions) -> Result<Self> {
        let input = options.input.ok_or(Error::MissingStream("input"))?;
        let output = options.output.ok_or(Error::MissingStream("output"))?;
        let capacity = options
            .message_buffer
            .unwrap_or(DEFAULT_MESSAGE_BUFFER)
            .max(1);
        let (sender, inbox) = mpsc::channel(capacity);

        Ok(Self {
            model: Mutex::new(Some(model)),
            inbox: Mutex::new(Some(inbox)),
            sender,
            input,
            output,
            initial_size: options.initial_size,
            alt_screen: options.alt_screen,
            quit: CancellationToken::new(),
            killed: CancellationToken::new(),
            finished: CancellationToken::new(),
        })
    }

    /// Whether `run` has returned.
    pub fn is_finished(&self) -> bool {
        self.finished.is_cancelled()
    }

    fn take_state(&self) -> Option<(M, mpsc::Receiver<Msg>)> {
        let model = self
            .model
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()?;
        let inbox = self
            .inbox
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()?;
        Some((model, inbox))
    }

    async fn render(&self, view: String) -> Result<()> {
        let mut frame = String::with_capacity(CLEAR_SCREEN.len() + view.len() + 16);
        frame.push_str(CLEAR_SCREEN);
        for (i, line) in view.split('\n').enumerate() {
            if i > 0 {
                frame.push_str("\r\n");
            }
            frame.push_str(line.trim_end_matches('\r'));
        }
        self.output.write_str(&frame).await?;
        Ok(())
    }

    async fn setup_terminal(&self) -> Result<()> {
        let mut seq = String::from(HIDE_CURSOR);
        if self.alt_screen {
            seq.push_str(ENTER_ALT_SCREEN);
        }
        self.output.write_str(&seq).await?;
        Ok(())
    }

    async fn restore_terminal(&self) -> Result<()> {
        let mut seq = String::from(SHOW_CURSOR);
        if self.alt_screen {
            seq.push_str(EXIT_ALT_SCREEN);
        }
        self.output.write_str(&seq).await?;
        Ok(())
    }

    /// Resolves once the program is quit or killed, with what `run` returns.
    async fn stopped(&self) -> Result<()> {
        tokio::select! {
            biased;
            _ = self.killed.cancelled() => Err(Error::ProgramKilled),
            _ = self.quit.cancelled() => Ok(()),
        }
    }

    /// Drive an output write unless the program is stopped first. A client
    /// that stops reading must not keep the program from stopping.
    async fn guarded(&self, write: impl Future<Output = Result<()>>) -> ControlFlow<Result<()>> {
        tokio::select! {
            biased;
            result = self.stopped() => ControlFlow::Break(result),
            written = write => match written {
                Ok(()) => ControlFlow::Continue(()),
                Err(e) => ControlFlow::Break(Err(e)),
            },
        }
    }

    fn spawn_input_pump(&self) -> JoinHandle<()> {
        let input = self.input.clone();
        let sender = self.sender.clone();
        let done = self.finished.clone();

        tokio::spawn(async move {
            let mut buf = [0u8; 1024];
            loop {
                let n = tokio::select! {
                    biased;
                    _ = done.cancelled() => break,
                    read = input.read(&mut buf) => match read {
                        Ok(0) => {
                            debug!("Program input reached end of stream");
                            break;
                        }
                        Ok(n) => n,
                        Err(e) => {
                            debug!("Program input read failed: {}", e);
                            break;
                        }
                    },
                };
                tokio::select! {
                    biased;
                    _ = done.cancelled() => break,
                    sent = sender.send(Msg::Input(buf[..n].to_vec())) => {
                        if sent.is_err() {
                            break;
                        }
                    }
                }
            }
        })
    }

    async fn event_loop(&self, model: &mut M, inbox: &mut mpsc::Receiver<Msg>) -> Result<()> {
        if model.init() == Command::Quit {
            return Ok(());
        }
        if let Some(size) = self.initial_size {
            if model.update(&Msg::WindowSize(size)) == Command::Quit {
                return Ok(());
            }
        }
        if let ControlFlow::Break(result) = self.guarded(self.render(model.view())).await {
            return result;
        }

        loop {
            let msg = tokio::select! {
                biased;
                result = self.stopped() => return result,
                msg = inbox.recv() => match msg {
                    Some(msg) => msg,
                    None => return Ok(()),
                },
            };

            let command = model.update(&msg);
            if let ControlFlow::Break(result) = self.guarded(self.render(model.view())).await {
                return result;
            }
            if command == Command::Quit {
                return Ok(());
            }
        }
    }
}

#[async_trait]
impl<M: Model> Program for EventLoop<M> {
    async fn run(&self) -> Result<()> {
        let Some((mut model, mut inbox)) = self.take_state() else {
            return Err(Error::AlreadyRunning);
        };
        if self.killed.is_cancelled() {
            self.finished.cancel();
            return Err(Error::ProgramKilled);
        }

        let result = match self.guarded(self.setup_terminal()).await {
            ControlFlow::Continue(()) => {
                let pump = self.spawn_input_pump();
                let result = self.event_loop(&mut model, &mut inbox).await;
                self.finished.cancel();
                if let Err(e) = pump.await {
                    warn!("Program input task failed: {}", e);
                }
                result
            }
            ControlFlow::Break(result) => result,
        };
        self.finished.cancel();

        let restored = match tokio::time::timeout(RESTORE_TIMEOUT, self.restore_terminal()).await {
            Ok(restored) => restored,
            Err(_) => {
                warn!("Terminal restore not written within {:?}", RESTORE_TIMEOUT);
                Ok(())
            }
        };
        result.and(restored)
    }

    async fn send(&self, msg: Msg) {
        if self.finished.is_cancelled() {
            return;
        }
        tokio::select! {
            biased;
            _ = self.finished.cancelled() => {}
            _ = self.sender.send(msg) => {}
        }
    }

    fn quit(&self) {
        self.quit.cancel();
    }

    fn kill(&self) {
        self.killed.cancel();
    }
}
