//! Registry of sessions currently under supervision.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use tracing::debug;

use teashell_core::{ColorProfile, Error, Result, SessionId, SessionPhase};

/// Configuration for the session registry.
#[derive(Debug, Clone, Default)]
pub struct RegistryConfig {
    /// Maximum number of supervised sessions (0 = unlimited)
    pub max_sessions: usize,
}

/// Information about a supervised session.
#[derive(Debug, Clone)]
pub struct SessionInfo {
    /// Session ID
    pub session_id: SessionId,

    /// Current lifecycle phase
    pub phase: SessionPhase,

    /// Negotiated color profile, once known
    pub profile: Option<ColorProfile>,

    /// When supervision started
    pub started_at: DateTime<Utc>,
}

/// Tracks sessions from negotiation until cleanup finishes.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<SessionId, SessionInfo>>,
    config: RegistryConfig,
}

impl SessionRegistry {
    /// Create an unlimited registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with custom configuration.
    pub fn with_config(config: RegistryConfig) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// Create a registry admitting at most `max_sessions` (0 = unlimited).
    pub fn with_max_sessions(max_sessions: usize) -> Self {
        Self::with_config(RegistryConfig { max_sessions })
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<SessionId, SessionInfo>> {
        self.sessions.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<SessionId, SessionInfo>> {
        self.sessions.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Admit a session in the `Negotiating` phase.
    pub fn register(&self, session_id: SessionId) -> Result<()> {
        let mut sessions = self.write();
        if self.config.max_sessions > 0 && sessions.len() >= self.config.max_sessions {
            return Err(Error::SessionLimitReached(self.config.max_sessions));
        }

        sessions.insert(
            session_id,
            SessionInfo {
                session_id,
                phase: SessionPhase::Negotiating,
                profile: None,
                started_at: Utc::now(),
            },
        );
        debug!("Session registered: id={}, active={}", session_id, sessions.len());
        Ok(())
    }

    /// Record a phase change.
    pub fn set_phase(&self, session_id: &SessionId, phase: SessionPhase) {
        if let Some(info) = self.write().get_mut(session_id) {
            info.phase = phase;
        }
    }

    /// Record the negotiated profile.
    pub fn set_profile(&self, session_id: &SessionId, profile: ColorProfile) {
        if let Some(info) = self.write().get_mut(session_id) {
            info.profile = Some(profile);
        }
    }

    /// Remove a session.
    pub fn remove(&self, session_id: &SessionId) -> Option<SessionInfo> {
        let removed = self.write().remove(session_id);
        if removed.is_some() {
            debug!("Session unregistered: id={}", session_id);
        }
        removed
    }

    /// Get a session's info.
    pub fn get(&self, session_id: &SessionId) -> Option<SessionInfo> {
        self.read().get(session_id).cloned()
    }

    /// List all supervised sessions.
    pub fn list(&self) -> Vec<SessionInfo> {
        self.read().values().cloned().collect()
    }

    /// Number of supervised sessions.
    pub fn session_count(&self) -> usize {
        self.read().len()
    }
}
