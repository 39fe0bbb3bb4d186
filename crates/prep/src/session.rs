//! Session tracking seam.
//!
//! The prepare stage never expires sessions itself; it asks a
//! [`SessionTracker`] whether a session is alive and owned by the submitting
//! connection, registers new sessions, and flags closing ones.

use std::collections::HashMap;

use arbor_types::{KeeperError, SessionId};
use parking_lot::Mutex;
use tracing::debug;

/// Identity of the connection currently owning a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct SessionOwner(u64);

impl SessionOwner {
    /// Creates an owner token.
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw token.
    pub const fn value(self) -> u64 {
        self.0
    }
}

/// Liveness and ownership checks for client sessions.
pub trait SessionTracker: Send + Sync {
    /// Fails unless `session` is live and owned by `owner`.
    ///
    /// # Errors
    ///
    /// `SessionExpired` for unknown or closing sessions, `SessionMoved` when
    /// another connection owns the session.
    fn check_session(&self, session: SessionId, owner: SessionOwner) -> Result<(), KeeperError>;

    /// As [`SessionTracker::check_session`], additionally requiring a global
    /// (replicated) session.
    ///
    /// # Errors
    ///
    /// `EphemeralOnLocalSession` for local sessions.
    fn check_global_session(
        &self,
        session: SessionId,
        owner: SessionOwner,
    ) -> Result<(), KeeperError>;

    /// Registers a session with its timeout. Returns `false` if it was
    /// already tracked.
    fn track_session(&self, session: SessionId, timeout: i32) -> bool;

    /// Binds `session` to `owner`.
    ///
    /// # Errors
    ///
    /// `SessionExpired` for unknown sessions.
    fn set_owner(&self, session: SessionId, owner: SessionOwner) -> Result<(), KeeperError>;

    /// Marks `session` as closing; later checks fail with `SessionExpired`.
    fn set_session_closing(&self, session: SessionId);
}

#[derive(Debug, Clone)]
struct SessionState {
    timeout: i32,
    owner: Option<SessionOwner>,
    closing: bool,
    local: bool,
}

/// In-process session tracker.
#[derive(Debug, Default)]
pub struct InMemorySessionTracker {
    sessions: Mutex<HashMap<SessionId, SessionState>>,
}

impl InMemorySessionTracker {
    /// Creates an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a session that lives only on this server.
    pub fn track_local_session(&self, session: SessionId, timeout: i32) {
        self.sessions
            .lock()
            .insert(session, SessionState { timeout, owner: None, closing: false, local: true });
    }

    /// Whether `session` is tracked and not closing.
    pub fn is_live(&self, session: SessionId) -> bool {
        self.sessions.lock().get(&session).is_some_and(|s| !s.closing)
    }

    /// Whether `session` has been marked closing.
    pub fn is_closing(&self, session: SessionId) -> bool {
        self.sessions.lock().get(&session).is_some_and(|s| s.closing)
    }

    /// Timeout registered for `session`.
    pub fn timeout(&self, session: SessionId) -> Option<i32> {
        self.sessions.lock().get(&session).map(|s| s.timeout)
    }
}

impl SessionTracker for InMemorySessionTracker {
    fn check_session(&self, session: SessionId, owner: SessionOwner) -> Result<(), KeeperError> {
        let mut sessions = self.sessions.lock();
        let state = sessions
            .get_mut(&session)
            .filter(|s| !s.closing)
            .ok_or(KeeperError::SessionExpired { session_id: session.value() })?;
        match state.owner {
            None => {
                state.owner = Some(owner);
                Ok(())
            },
            Some(current) if current == owner => Ok(()),
            Some(_) => Err(KeeperError::SessionMoved { session_id: session.value() }),
        }
    }

    fn check_global_session(
        &self,
        session: SessionId,
        owner: SessionOwner,
    ) -> Result<(), KeeperError> {
        let local = self.sessions.lock().get(&session).is_some_and(|s| s.local);
        if local {
            return Err(KeeperError::EphemeralOnLocalSession { session_id: session.value() });
        }
        self.check_session(session, owner)
    }

    fn track_session(&self, session: SessionId, timeout: i32) -> bool {
        let mut sessions = self.sessions.lock();
        if sessions.contains_key(&session) {
            return false;
        }
        debug!(session = %session, timeout, "Tracking session");
        sessions.insert(session, SessionState { timeout, owner: None, closing: false, local: false });
        true
    }

    fn set_owner(&self, session: SessionId, owner: SessionOwner) -> Result<(), KeeperError> {
        let mut sessions = self.sessions.lock();
        let state = sessions
            .get_mut(&session)
            .ok_or(KeeperError::SessionExpired { session_id: session.value() })?;
        state.owner = Some(owner);
        Ok(())
    }

    fn set_session_closing(&self, session: SessionId) {
        if let Some(state) = self.sessions.lock().get_mut(&session) {
            state.closing = true;
        }
    }
}
