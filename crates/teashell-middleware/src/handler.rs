//! Session handlers and middleware composition.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::session::Session;

/// Handles one session. Handlers are chained: a middleware does its work and
/// then calls the handler it wraps.
#[async_trait]
pub trait Handler: Send + Sync {
    /// Handle the session.
    async fn handle(&self, session: Arc<dyn Session>);
}

/// Wraps a handler in another handler.
pub type Middleware = Box<dyn FnOnce(Arc<dyn Handler>) -> Arc<dyn Handler> + Send>;

/// Handler backed by an async closure.
pub struct HandlerFn<F>(F);

#[async_trait]
impl<F, Fut> Handler for HandlerFn<F>
where
    F: Fn(Arc<dyn Session>) -> Fut + Send + Sync,
    Fut: Future<Output = ()> + Send,
{
    async fn handle(&self, session: Arc<dyn Session>) {
        (self.0)(session).await
    }
}

/// Create a handler from an async closure.
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn Handler>
where
    F: Fn(Arc<dyn Session>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(HandlerFn(f))
}

/// Handler that does nothing; the usual end of a chain.
#[derive(Debug, Clone, Copy, Default)]
pub struct Noop;

#[async_trait]
impl Handler for Noop {
    async fn handle(&self, _session: Arc<dyn Session>) {}
}

/// Wrap `base` in `middlewares`. The first middleware is innermost, so the
/// last one sees the session first.
pub fn chain(base: Arc<dyn Handler>, middlewares: Vec<Middleware>) -> Arc<dyn Handler> {
    middlewares
        .into_iter()
        .fold(base, |next, middleware| middleware(next))
}
