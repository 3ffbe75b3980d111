//! Process-wide list of live sessions.

use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::ssh::{Session, SessionId};

/// Sessions that currently have an open shell, in insertion order.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: Mutex<Vec<Session>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn sessions(&self) -> MutexGuard<'_, Vec<Session>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert `session`, replacing any record with the same id in place.
    pub fn add(&self, session: Session) {
        let mut sessions = self.sessions();
        match sessions.iter_mut().find(|s| s.id == session.id) {
            Some(existing) => *existing = session,
            None => sessions.push(session),
        }
    }

    pub fn remove(&self, id: &SessionId) -> Option<Session> {
        let mut sessions = self.sessions();
        let index = sessions.iter().position(|s| &s.id == id)?;
        Some(sessions.remove(index))
    }

    pub fn get(&self, id: &SessionId) -> Option<Session> {
        self.sessions().iter().find(|s| &s.id == id).cloned()
    }

    pub fn contains(&self, id: &SessionId) -> bool {
        self.sessions().iter().any(|s| &s.id == id)
    }

    /// Snapshot of the live sessions.
    pub fn list(&self) -> Vec<Session> {
        self.sessions().clone()
    }

    pub fn len(&self) -> usize {
        self.sessions().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions().is_empty()
    }
}
