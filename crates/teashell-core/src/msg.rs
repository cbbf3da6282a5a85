//! Messages delivered to a running program.

use std::any::Any;
use std::sync::Arc;

use crate::WindowSize;

/// A message for a program's update loop.
#[derive(Clone)]
pub enum Msg {
    /// The client terminal was resized
    WindowSize(WindowSize),

    /// Raw bytes typed by the client
    Input(Vec<u8>),

    /// Application-defined payload sent by outer middleware
    Custom(Arc<dyn Any + Send + Sync>),
}

impl Msg {
    /// Wrap an application value as a custom message.
    pub fn custom<T: Any + Send + Sync>(value: T) -> Self {
        Msg::Custom(Arc::new(value))
    }

    /// Borrow a custom payload as `T`, if this is a custom message of that type.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        match self {
            Msg::Custom(value) => value.downcast_ref::<T>(),
            _ => None,
        }
    }
}

impl std::fmt::Debug for Msg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Msg::WindowSize(size) => f.debug_tuple("WindowSize").field(size).finish(),
            Msg::Input(bytes) => f.debug_tuple("Input").field(bytes).finish(),
            Msg::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}
