//! Terminal geometry types.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Size of a client terminal window, in character cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct WindowSize {
    /// Number of columns
    pub width: u16,
    /// Number of rows
    pub height: u16,
}

impl WindowSize {
    /// Create a new window size.
    pub fn new(width: u16, height: u16) -> Self {
        Self { width, height }
    }

    /// Create a window size, rejecting zero dimensions.
    pub fn checked(width: u16, height: u16) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(Error::InvalidWindowSize { width, height });
        }
        Ok(Self { width, height })
    }
}

impl Default for WindowSize {
    fn default() -> Self {
        Self::new(80, 24)
    }
}

impl std::fmt::Display for WindowSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// A pseudo-terminal allocated for a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Pty {
    /// Terminal type requested by the client (e.g. "xterm-256color")
    pub term: String,
    /// Window size at allocation time
    pub window: WindowSize,
}

impl Pty {
    /// Create a new pty description.
    pub fn new(term: impl Into<String>, window: WindowSize) -> Self {
        Self {
            term: term.into(),
            window,
        }
    }
}
