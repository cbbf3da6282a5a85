//! The session abstraction consumed from the remote-shell transport.

use std::io;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, Mutex};

use teashell_core::{Environ, Pty, SessionId, WindowSize};

use crate::context::SessionContext;

/// Feed of window-size changes for one session. Closed when the session ends.
pub type WindowChanges = mpsc::Receiver<WindowSize>;

type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Shared handle to a session's input stream.
#[derive(Clone)]
pub struct SessionReader(Arc<Mutex<BoxedReader>>);

impl SessionReader {
    /// Wrap an async reader.
    pub fn new<R>(reader: R) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        Self(Arc::new(Mutex::new(Box::new(reader))))
    }

    /// Read available bytes into `buf`. Returns 0 at end of stream.
    pub async fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        let mut reader = self.0.lock().await;
        reader.read(buf).await
    }
}

impl std::fmt::Debug for SessionReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionReader").finish_non_exhaustive()
    }
}

/// Shared handle to a session's output stream.
///
/// Every write is flushed; concurrent writers are serialized per call.
#[derive(Clone)]
pub struct SessionWriter(Arc<Mutex<BoxedWriter>>);

impl SessionWriter {
    /// Wrap an async writer.
    pub fn new<W>(writer: W) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self(Arc::new(Mutex::new(Box::new(writer))))
    }

    /// Write all bytes and flush.
    pub async fn write_all(&self, bytes: &[u8]) -> io::Result<()> {
        let mut writer = self.0.lock().await;
        writer.write_all(bytes).await?;
        writer.flush().await
    }

    /// Write a string and flush.
    pub async fn write_str(&self, text: &str) -> io::Result<()> {
        self.write_all(text.as_bytes()).await
    }
}

impl std::fmt::Debug for SessionWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionWriter").finish_non_exhaustive()
    }
}

/// One connected remote client.
///
/// Implemented by the transport layer. The supervisor only uses this narrow
/// contract and never outlives the session it was handed.
pub trait Session: Send + Sync {
    /// Session identifier.
    fn id(&self) -> SessionId;

    /// Client input stream.
    fn reader(&self) -> SessionReader;

    /// Client output stream.
    fn writer(&self) -> SessionWriter;

    /// Cancellation signal and typed value store scoped to this session.
    fn context(&self) -> &SessionContext;

    /// Environment variables sent by the client.
    fn environ(&self) -> Environ;

    /// The allocated pseudo-terminal, or `None` if the client did not request one.
    fn pty(&self) -> Option<Pty>;

    /// Take the window-change feed.
    ///
    /// The feed can be claimed once; later calls return `None`. Whoever holds
    /// it owns the session's terminal.
    fn window_changes(&self) -> Option<WindowChanges>;
}
