//! A session over the process's own terminal.
//!
//! stdin and stdout are the session streams; SIGWINCH feeds window changes.
//! When stdin or stdout is not a terminal the session has no pty and the
//! supervisor passes it straight through.

use std::io::IsTerminal;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;
use tracing::debug;

use teashell_core::{Environ, Pty, SessionId, TerminalSettings, WindowSize};
use teashell_middleware::{Session, SessionContext, SessionReader, SessionWriter, WindowChanges};

/// Capacity of the window change feed.
const RESIZE_BUFFER: usize = 16;

/// The local terminal as a session.
pub struct LocalSession {
    id: SessionId,
    context: SessionContext,
    environ: Environ,
    pty: Option<Pty>,
    changes: Mutex<Option<WindowChanges>>,
    reader: SessionReader,
    writer: SessionWriter,
}

impl LocalSession {
    /// Open the local terminal. Must be called inside a tokio runtime; the
    /// resize watcher runs until the session context is cancelled.
    pub fn open(settings: &TerminalSettings) -> anyhow::Result<Arc<Self>> {
        let interactive = std::io::stdin().is_terminal() && std::io::stdout().is_terminal();
        let environ: Environ = std::env::vars().collect();

        let pty = interactive.then(|| {
            local_pty(
                std::env::var("TERM").ok(),
                terminal_size(),
                settings,
            )
        });

        let context = SessionContext::new();
        let changes = match &pty {
            Some(_) => {
                let (tx, rx) = mpsc::channel(RESIZE_BUFFER);
                watch_resizes(tx, &context)?;
                Some(rx)
            }
            None => None,
        };

        Ok(Arc::new(Self {
            id: SessionId::new(),
            context,
            environ,
            pty,
            changes: Mutex::new(changes),
            reader: SessionReader::new(tokio::io::stdin()),
            writer: SessionWriter::new(tokio::io::stdout()),
        }))
    }
}

impl Session for LocalSession {
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

/// Pty description for the local terminal, falling back to configured
/// values for whatever the terminal does not report.
pub fn local_pty(
    term: Option<String>,
    size: Option<WindowSize>,
    settings: &TerminalSettings,
) -> Pty {
    let term = term
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| settings.term.clone());
    let window = size
        .filter(|s| s.width > 0 && s.height > 0)
        .unwrap_or_else(|| settings.default_size());
    Pty::new(term, window)
}

/// Current size of the terminal on stdout.
#[cfg(unix)]
pub fn terminal_size() -> Option<WindowSize> {
    let mut ws = libc::winsize {
        ws_row: 0,
        ws_col: 0,
        ws_xpixel: 0,
        ws_ypixel: 0,
    };
    // SAFETY: TIOCGWINSZ writes a winsize into the pointer we pass, which
    // points at a live local of that type.
    let ret = unsafe { libc::ioctl(libc::STDOUT_FILENO, libc::TIOCGWINSZ, &mut ws) };
    if ret == -1 {
        return None;
    }
    // Some terminals report 0x0 before they are mapped.
    WindowSize::checked(ws.ws_col, ws.ws_row).ok()
}

/// Current size of the terminal on stdout.
#[cfg(not(unix))]
pub fn terminal_size() -> Option<WindowSize> {
    None
}

#[cfg(unix)]
fn watch_resizes(
    tx: mpsc::Sender<WindowSize>,
    context: &SessionContext,
) -> anyhow::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigwinch = signal(SignalKind::window_change())?;
    let cancel = context.cancellation_token().clone();

    tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                received = sigwinch.recv() => {
                    if received.is_none() {
                        break;
                    }
                    let Some(size) = terminal_size() else { continue };
                    if tx.send(size).await.is_err() {
                        break;
                    }
                }
            }
        }
        debug!("Resize watcher stopped");
    });
    Ok(())
}

#[cfg(not(unix))]
fn watch_resizes(
    _tx: mpsc::Sender<WindowSize>,
    _context: &SessionContext,
) -> anyhow::Result<()> {
    Ok(())
}

/// Puts the terminal on stdin in raw mode and restores it on drop.
#[cfg(unix)]
pub struct RawMode {
    original: libc::termios,
}

#[cfg(unix)]
impl RawMode {
    /// Enter raw mode. Returns `None` if stdin is not a terminal.
    pub fn enable() -> Option<Self> {
        // SAFETY: termios is plain data; tcgetattr fills it in.
        let mut original: libc::termios = unsafe { std::mem::zeroed() };
        // SAFETY: `original` is a valid termios for the call to fill in.
        if unsafe { libc::tcgetattr(libc::STDIN_FILENO, &mut original) } != 0 {
            return None;
        }

        let mut raw = original;
        // SAFETY: cfmakeraw only edits the flags of the termios it is given.
        unsafe { libc::cfmakeraw(&mut raw) };
        // SAFETY: `raw` is a fully initialized termios from tcgetattr.
        if unsafe { libc::tcsetattr(libc::STDIN_FILENO, libc::TCSANOW, &raw) } != 0 {
            return None;
        }
        Some(Self { original })
    }
}

#[cfg(unix)]
impl Drop for RawMode {
    fn drop(&mut self) {
        // SAFETY: `original` was filled in by a successful tcgetattr.
        unsafe { libc::tcsetattr(libc::STDIN_FILENO, libc::TCSANOW, &self.original) };
    }
}

/// Raw mode is not supported on this platform.
#[cfg(not(unix))]
pub struct RawMode;

#[cfg(not(unix))]
impl RawMode {
    /// Always `None` on this platform.
    pub fn enable() -> Option<Self> {
        None
    }
}
