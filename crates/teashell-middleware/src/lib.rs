//! # teashell-middleware
//!
//! Runs one interactive terminal program per remote session.
//!
//! This crate provides:
//! - The session abstraction handlers are written against
//! - Color profile negotiation between client and application
//! - Program construction from per-session handlers
//! - Resize relaying from the client terminal into the program
//! - The supervisor tying these together, plus a registry of live sessions
//!
//! ## Architecture
//!
//! This is Layer 1 in the architecture - it depends on teashell-core and is
//! used by the teashell binary and by applications embedding the middleware.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod context;
pub mod factory;
pub mod handler;
pub mod profile;
pub mod program;
pub mod registry;
pub mod relay;
pub mod renderer;
pub mod session;
pub mod supervisor;
pub mod testing;

// Re-export commonly used types
pub use context::SessionContext;
pub use factory::{ModelHandler, ProgramFactory, ProgramHandler};
pub use handler::{chain, handler_fn, Handler, Middleware, Noop};
pub use profile::{negotiate, negotiated_profile, EnvProfileDetector, ProfileDetector};
pub use program::{make_options, Command, EventLoop, Model, Program, ProgramOptions};
pub use registry::{RegistryConfig, SessionInfo, SessionRegistry};
pub use relay::spawn_relay;
pub use renderer::{make_renderer, Renderer};
pub use session::{Session, SessionReader, SessionWriter, WindowChanges};
pub use supervisor::{
    middleware, middleware_with_color_profile, middleware_with_program_handler, ProgramMiddleware,
};
