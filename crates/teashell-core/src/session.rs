//! Session identity and supervisor lifecycle phases.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a connected client session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Create a new random session ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Phase of the program lifecycle for one session.
///
/// Phases only move forward: `Idle → Negotiating → Running → Stopping → Done`.
/// A declined session skips straight from `Idle` or `Negotiating` to `Done`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// Session arrived, nothing decided yet
    Idle,
    /// Color profile is being negotiated
    Negotiating,
    /// Program is running
    Running,
    /// Program returned; kill and relay shutdown in progress
    Stopping,
    /// Cleanup finished, control handed to the next handler
    Done,
}

impl SessionPhase {
    /// Whether moving from `self` to `next` is a legal transition.
    pub fn can_advance_to(self, next: SessionPhase) -> bool {
        use SessionPhase::*;
        matches!(
            (self, next),
            (Idle, Negotiating)
                | (Idle, Done)
                | (Negotiating, Running)
                | (Negotiating, Done)
                | (Running, Stopping)
                | (Stopping, Done)
        )
    }
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionPhase::Idle => "idle",
            SessionPhase::Negotiating => "negotiating",
            SessionPhase::Running => "running",
            SessionPhase::Stopping => "stopping",
            SessionPhase::Done => "done",
        };
        f.write_str(name)
    }
}
