//! Per-session context: cancellation plus a typed value store.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use tokio_util::sync::CancellationToken;

/// Context carried by a session for its whole lifetime.
///
/// Values are keyed by their type, so each middleware defines its own key
/// type and concurrent sessions never share entries.
#[derive(Debug, Default)]
pub struct SessionContext {
    cancel: CancellationToken,
    values: RwLock<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>,
}

impl SessionContext {
    /// Create a context with a fresh cancellation token.
    pub fn new() -> Self {
        Self::default()
    }

    /// The session's cancellation token.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Cancel the session.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Whether the session has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Wait until the session is cancelled.
    pub async fn done(&self) {
        self.cancel.cancelled().await;
    }

    /// Store a value under its type, replacing any previous one.
    pub fn set_value<T: Any + Send + Sync>(&self, value: T) {
        self.values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(TypeId::of::<T>(), Arc::new(value));
    }

    /// Fetch a copy of the value stored under `T`.
    pub fn value<T: Any + Send + Sync + Clone>(&self) -> Option<T> {
        self.values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&TypeId::of::<T>())
            .and_then(|value| value.downcast_ref::<T>())
            .cloned()
    }
}
