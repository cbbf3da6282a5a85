//! # teashell
//!
//! Runs the supervised demo program on the local terminal.
//!
//! ## Architecture
//!
//! This is Layer 2 - the binary crate that ties together:
//! - teashell-core: Core types and configuration
//! - teashell-middleware: Session supervision

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod demo;
pub mod local;
pub mod logging;

use std::sync::Arc;

use tracing::info;

use teashell_core::ServerConfig;
use teashell_middleware::{
    handler_fn, make_renderer, Handler, ModelHandler, ProgramMiddleware, ProgramOptions, Session,
    SessionRegistry,
};

use crate::demo::CounterModel;
use crate::local::{LocalSession, RawMode};

const NOT_INTERACTIVE: &str = "teashell needs an interactive terminal\n";

/// Build the handler chain: the supervisor running [`CounterModel`], then a
/// fallback that explains why nothing ran on non-interactive sessions.
pub fn build_handler(config: &ServerConfig, registry: Arc<SessionRegistry>) -> Arc<dyn Handler> {
    let message_buffer = config.supervisor.message_buffer;
    let factory = ModelHandler::new(move |session: &Arc<dyn Session>| {
        let model = CounterModel::new(make_renderer(session.as_ref()));
        let options = ProgramOptions::new()
            .with_alt_screen()
            .with_message_buffer(message_buffer);
        Some((model, options))
    });

    let fallback = handler_fn(|session: Arc<dyn Session>| async move {
        if session.pty().is_none() {
            let _ = session.writer().write_str(NOT_INTERACTIVE).await;
        }
    });

    ProgramMiddleware::from_settings(factory, &config.supervisor)
        .registry(registry)
        .wrap(fallback)
}

/// Supervise one session on the local terminal until its program exits or
/// the process receives Ctrl-C.
pub async fn run_local(config: ServerConfig) -> anyhow::Result<()> {
    let registry = Arc::new(SessionRegistry::with_max_sessions(
        config.server.max_sessions,
    ));
    let handler = build_handler(&config, registry);
    let session = LocalSession::open(&config.terminal)?;

    match session.pty() {
        Some(pty) => info!("Local terminal: TERM={}, size={}", pty.term, pty.window),
        None => info!("Local streams are not a terminal"),
    }

    let cancel = session.context().cancellation_token().clone();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, stopping program");
            cancel.cancel();
        }
    });

    {
        let _raw = session.pty().and_then(|_| RawMode::enable());
        handler.handle(Arc::clone(&session) as Arc<dyn Session>).await;
    }

    interrupt.abort();
    session.context().cancel();
    Ok(())
}
