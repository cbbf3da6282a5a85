//! Building a program for a session.
//!
//! Two handler shapes are supported and both produce an `Arc<dyn Program>`:
//!
//! - [`ModelHandler`]: the handler returns a [`Model`] and [`ProgramOptions`];
//!   the factory binds the session streams and runs the model on an
//!   [`EventLoop`].
//! - [`ProgramHandler`]: the handler builds the program itself. It must bind
//!   the session streams with [`make_options`].

use std::marker::PhantomData;
use std::sync::Arc;

use tracing::error;

use crate::program::{make_options, EventLoop, Model, Program, ProgramOptions};
use crate::session::Session;

/// Builds the program for a session, or declines it by returning `None`.
///
/// Building must not perform I/O; the supervisor starts the program.
pub trait ProgramFactory: Send + Sync {
    /// Build a program bound to `session`.
    fn build(&self, session: &Arc<dyn Session>) -> Option<Arc<dyn Program>>;
}

/// Factory for handlers returning a model and options.
pub struct ModelHandler<F, M> {
    handler: F,
    _model: PhantomData<fn() -> M>,
}

impl<F, M> ModelHandler<F, M>
where
    F: Fn(&Arc<dyn Session>) -> Option<(M, ProgramOptions)> + Send + Sync,
    M: Model,
{
    /// Wrap a model handler.
    pub fn new(handler: F) -> Self {
        Self {
            handler,
            _model: PhantomData,
        }
    }
}

impl<F, M> ProgramFactory for ModelHandler<F, M>
where
    F: Fn(&Arc<dyn Session>) -> Option<(M, ProgramOptions)> + Send + Sync,
    M: Model,
{
    fn build(&self, session: &Arc<dyn Session>) -> Option<Arc<dyn Program>> {
        let (model, options) = (self.handler)(session)?;
        // Session streams override whatever the handler set.
        let options = options.merge(make_options(session.as_ref()));
        match EventLoop::new(model, options) {
            Ok(program) => Some(Arc::new(program)),
            Err(e) => {
                error!(session = %session.id(), error = %e, "Failed to build program");
                None
            }
        }
    }
}

/// Factory for handlers that construct the program directly.
pub struct ProgramHandler<F> {
    handler: F,
}

impl<F> ProgramHandler<F>
where
    F: Fn(&Arc<dyn Session>) -> Option<Arc<dyn Program>> + Send + Sync,
{
    /// Wrap a program handler.
    pub fn new(handler: F) -> Self {
        Self { handler }
    }
}

impl<F> ProgramFactory for ProgramHandler<F>
where
    F: Fn(&Arc<dyn Session>) -> Option<Arc<dyn Program>> + Send + Sync,
{
    fn build(&self, session: &Arc<dyn Session>) -> Option<Arc<dyn Program>> {
        (self.handler)(session)
    }
}
