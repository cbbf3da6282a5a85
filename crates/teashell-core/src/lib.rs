//! # teashell-core
//!
//! Core types shared by the teashell crates.
//!
//! This crate contains all fundamental types with **no internal dependencies**
//! on other teashell crates. It provides:
//!
//! - Geometry types (WindowSize, Pty)
//! - Session identity and lifecycle phases (SessionId, SessionPhase)
//! - Color profiles and colors
//! - Messages delivered to running programs
//! - Client environment lookup
//! - Configuration and error types
//!
//! ## Architecture
//!
//! This is Layer 0 in the architecture - all other crates depend on this one,
//! but this crate has no dependencies on other teashell crates.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod color;
pub mod config;
pub mod environ;
pub mod error;
pub mod geometry;
pub mod msg;
pub mod session;

// Re-export commonly used types
pub use color::{Color, ColorProfile};
pub use config::{ServerConfig, ServerSettings, SupervisorSettings, TerminalSettings};
pub use environ::Environ;
pub use error::{Error, Result};
pub use geometry::{Pty, WindowSize};
pub use msg::Msg;
pub use session::{SessionId, SessionPhase};
