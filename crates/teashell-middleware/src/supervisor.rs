//! Per-session program supervisor.
//!
//! For every session with a terminal, the supervisor negotiates the color
//! profile, builds a program, runs it alongside a resize relay, and then
//! force-stops it before handing the session to the next handler:
//!
//! ```text
//! Idle → Negotiating → Running → Stopping → Done
//!   └──────────┴─────────── decline ──────────┘
//! ```
//!
//! Kill and relay cancellation always happen after `run` returns, whether
//! it returned cleanly, with an error, or by panicking.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use teashell_core::{ColorProfile, SessionId, SessionPhase, SupervisorSettings};

use crate::factory::{ModelHandler, ProgramFactory, ProgramHandler};
use crate::handler::{Handler, Middleware};
use crate::profile::{negotiate_with, EnvProfileDetector, ProfileDetector};
use crate::program::{Model, Program, ProgramOptions};
use crate::registry::SessionRegistry;
use crate::relay::spawn_relay;
use crate::session::Session;

const SESSION_LIMIT_NOTICE: &str = "Too many active sessions, try again later\r\n";

/// Builder for the program supervisor middleware.
pub struct ProgramMiddleware {
    factory: Arc<dyn ProgramFactory>,
    ceiling: ColorProfile,
    detector: Arc<dyn ProfileDetector>,
    registry: Option<Arc<SessionRegistry>>,
}

impl ProgramMiddleware {
    /// Supervise programs built by `factory`, with no color ceiling.
    pub fn new(factory: impl ProgramFactory + 'static) -> Self {
        Self {
            factory: Arc::new(factory),
            ceiling: ColorProfile::TrueColor,
            detector: Arc::new(EnvProfileDetector),
            registry: None,
        }
    }

    /// Build from configuration.
    pub fn from_settings(
        factory: impl ProgramFactory + 'static,
        settings: &SupervisorSettings,
    ) -> Self {
        Self::new(factory).color_profile(settings.color_profile)
    }

    /// Highest color profile the application renders with. Clients above it
    /// are told and forced down.
    pub fn color_profile(mut self, ceiling: ColorProfile) -> Self {
        self.ceiling = ceiling;
        self
    }

    /// Replace the client profile detector.
    pub fn detector(mut self, detector: impl ProfileDetector + 'static) -> Self {
        self.detector = Arc::new(detector);
        self
    }

    /// Track supervised sessions in `registry`, honoring its session limit.
    pub fn registry(mut self, registry: Arc<SessionRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Wrap `next`, which runs after each session's program is cleaned up.
    pub fn wrap(self, next: Arc<dyn Handler>) -> Arc<dyn Handler> {
        Arc::new(Supervisor {
            factory: self.factory,
            ceiling: self.ceiling,
            detector: self.detector,
            registry: self.registry,
            next,
        })
    }

    /// Turn the builder into a composable middleware.
    pub fn into_middleware(self) -> Middleware {
        Box::new(move |next| self.wrap(next))
    }
}

/// Middleware running a model-based program per session.
pub fn middleware<F, M>(handler: F) -> Middleware
where
    F: Fn(&Arc<dyn Session>) -> Option<(M, ProgramOptions)> + Send + Sync + 'static,
    M: Model,
{
    ProgramMiddleware::new(ModelHandler::new(handler)).into_middleware()
}

/// Like [`middleware`], capping client color profiles at `ceiling`.
pub fn middleware_with_color_profile<F, M>(handler: F, ceiling: ColorProfile) -> Middleware
where
    F: Fn(&Arc<dyn Session>) -> Option<(M, ProgramOptions)> + Send + Sync + 'static,
    M: Model,
{
    ProgramMiddleware::new(ModelHandler::new(handler))
        .color_profile(ceiling)
        .into_middleware()
}

/// Middleware for handlers that build the program themselves.
///
/// The handler must bind the session streams, normally with
/// [`make_options`](crate::program::make_options).
pub fn middleware_with_program_handler<F>(handler: F, ceiling: ColorProfile) -> Middleware
where
    F: Fn(&Arc<dyn Session>) -> Option<Arc<dyn Program>> + Send + Sync + 'static,
{
    ProgramMiddleware::new(ProgramHandler::new(handler))
        .color_profile(ceiling)
        .into_middleware()
}

/// The supervising handler. Built by [`ProgramMiddleware::wrap`].
pub struct Supervisor {
    factory: Arc<dyn ProgramFactory>,
    ceiling: ColorProfile,
    detector: Arc<dyn ProfileDetector>,
    registry: Option<Arc<SessionRegistry>>,
    next: Arc<dyn Handler>,
}

#[async_trait]
impl Handler for Supervisor {
    async fn handle(&self, session: Arc<dyn Session>) {
        self.supervise(&session).await;
        self.next.handle(session).await;
    }
}

impl Supervisor {
    /// Drive one session from `Idle` to `Done`.
    async fn supervise(&self, session: &Arc<dyn Session>) {
        let session_id = session.id();

        if session.pty().is_none() {
            debug!(session = %session_id, "No active terminal, skipping");
            return;
        }

        if let Some(registry) = &self.registry {
            if let Err(e) = registry.register(session_id) {
                warn!(session = %session_id, "{}", e);
                notify(session.as_ref(), SESSION_LIMIT_NOTICE).await;
                return;
            }
        }
        let mut lifecycle = Lifecycle::new(session_id, self.registry.clone());

        lifecycle.advance(SessionPhase::Negotiating);
        let profile = negotiate_with(session.as_ref(), self.ceiling, self.detector.as_ref()).await;
        lifecycle.record_profile(profile);

        let Some(program) = self.factory.build(session) else {
            debug!(session = %session_id, "Handler declined session");
            lifecycle.advance(SessionPhase::Done);
            return;
        };
        // The feed is only claimed once there is a program to feed.
        let Some(changes) = session.window_changes() else {
            warn!(session = %session_id, "Terminal already claimed by another program, skipping");
            lifecycle.advance(SessionPhase::Done);
            return;
        };

        lifecycle.advance(SessionPhase::Running);
        let relay_cancel = session.context().cancellation_token().child_token();
        let relay = spawn_relay(Arc::clone(&program), changes, relay_cancel.clone());
        let stop = StopGuard {
            program: Arc::clone(&program),
            relay_cancel,
        };

        info!(session = %session_id, profile = %profile, "Program started");
        match AssertUnwindSafe(program.run()).catch_unwind().await {
            Ok(Ok(())) => info!(session = %session_id, "Program exited"),
            Ok(Err(e)) => error!(session = %session_id, error = %e, "Program exited with error"),
            Err(panic) => error!(
                session = %session_id,
                error = %panic_message(panic.as_ref()),
                "Program panicked"
            ),
        }

        lifecycle.advance(SessionPhase::Stopping);
        drop(stop);
        match relay.await {
            Ok(forwarded) => debug!(session = %session_id, forwarded, "Resize relay stopped"),
            Err(e) => warn!(session = %session_id, "Resize relay failed: {}", e),
        }

        lifecycle.advance(SessionPhase::Done);
    }
}

/// Best-effort one-line notice; gives up if the session is cancelled first.
async fn notify(session: &dyn Session, text: &str) {
    let writer = session.writer();
    tokio::select! {
        biased;
        _ = session.context().done() => {}
        written = writer.write_str(text) => {
            if let Err(e) = written {
                debug!(session = %session.id(), "Could not deliver notice: {}", e);
            }
        }
    }
}

/// Kills the program and cancels its relay when dropped.
///
/// Dropped right after `run` returns; also fires if the supervising future is
/// itself dropped mid-run.
struct StopGuard {
    program: Arc<dyn Program>,
    relay_cancel: CancellationToken,
}

impl Drop for StopGuard {
    fn drop(&mut self) {
        self.program.kill();
        self.relay_cancel.cancel();
    }
}

/// Phase bookkeeping for one session.
struct Lifecycle {
    session_id: SessionId,
    phase: SessionPhase,
    registry: Option<Arc<SessionRegistry>>,
}

impl Lifecycle {
    fn new(session_id: SessionId, registry: Option<Arc<SessionRegistry>>) -> Self {
        Self {
            session_id,
            phase: SessionPhase::Idle,
            registry,
        }
    }

    fn advance(&mut self, next: SessionPhase) {
        debug_assert!(
            self.phase.can_advance_to(next),
            "illegal phase change {} → {}",
            self.phase,
            next
        );
        debug!(
            "Session phase changed: id={}, {} → {}",
            self.session_id, self.phase, next
        );
        self.phase = next;

        if let Some(registry) = &self.registry {
            if next == SessionPhase::Done {
                registry.remove(&self.session_id);
            } else {
                registry.set_phase(&self.session_id, next);
            }
        }
    }

    fn record_profile(&self, profile: ColorProfile) {
        if let Some(registry) = &self.registry {
            registry.set_profile(&self.session_id, profile);
        }
    }
}

impl Drop for Lifecycle {
    fn drop(&mut self) {
        if self.phase != SessionPhase::Done {
            if let Some(registry) = &self.registry {
                registry.remove(&self.session_id);
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
