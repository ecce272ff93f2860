// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Session persistence.
//!
//! [`SessionStore`] is the seam for alternative backends; the gateway ships
//! the bounded in-process [`InMemorySessionStore`].

use std::num::NonZeroUsize;
use std::sync::Mutex;

use chrono::Utc;
use lru::LruCache;
use tracing::debug;

use super::types::{Session, SessionId};

#[derive(Debug, thiserror::Error)]
pub enum SessionStoreError {
    #[error("session store lock poisoned")]
    Poisoned,
}

/// Storage for browser sessions.
///
/// Implementations never return expired sessions.
pub trait SessionStore: Send + Sync {
    fn get(&self, id: &SessionId) -> Result<Option<Session>, SessionStoreError>;

    /// Insert or replace a session.
    fn put(&self, session: Session) -> Result<(), SessionStoreError>;

    /// Remove a session, returning it if it existed.
    fn delete(&self, id: &SessionId) -> Result<Option<Session>, SessionStoreError>;

    /// Record an access and return the updated session.
    fn touch(&self, id: &SessionId) -> Result<Option<Session>, SessionStoreError>;

    /// Drop all expired sessions, returning how many were removed.
    fn purge_expired(&self) -> Result<usize, SessionStoreError>;

    fn len(&self) -> Result<usize, SessionStoreError>;
}

/// In-process LRU session store.
///
/// When full, the least recently used session is evicted.
pub struct InMemorySessionStore {
    sessions: Mutex<LruCache<SessionId, Session>>,
}

impl InMemorySessionStore {
    /// Create a new store holding at most `capacity` sessions.
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            sessions: Mutex::new(LruCache::new(capacity)),
        }
    }
}

impl SessionStore for InMemorySessionStore {
    fn get(&self, id: &SessionId) -> Result<Option<Session>, SessionStoreError> {
        let mut sessions = self.sessions.lock().map_err(|_| SessionStoreError::Poisoned)?;
        let expired = match sessions.get(id) {
            Some(session) => session.is_expired(Utc::now()),
            None => return Ok(None),
        };
        if expired {
            sessions.pop(id);
            return Ok(None);
        }
        Ok(sessions.peek(id).cloned())
    }

    fn put(&self, session: Session) -> Result<(), SessionStoreError> {
        let mut sessions = self.sessions.lock().map_err(|_| SessionStoreError::Poisoned)?;
        let id = session.id.clone();
        if let Some((evicted, _)) = sessions.push(id.clone(), session) {
            if evicted != id {
                debug!(session = %evicted, "Session evicted, store at capacity");
            }
        }
        Ok(())
    }

    fn delete(&self, id: &SessionId) -> Result<Option<Session>, SessionStoreError> {
        let mut sessions = self.sessions.lock().map_err(|_| SessionStoreError::Poisoned)?;
        Ok(sessions.pop(id))
    }

    fn touch(&self, id: &SessionId) -> Result<Option<Session>, SessionStoreError> {
        let now = Utc::now();
        let mut sessions = self.sessions.lock().map_err(|_| SessionStoreError::Poisoned)?;
        let expired = match sessions.get(id) {
            Some(session) => session.is_expired(now),
            None => return Ok(None),
        };
        if expired {
            sessions.pop(id);
            return Ok(None);
        }
        Ok(sessions.get_mut(id).map(|session| {
            session.touch(now);
            session.clone()
        }))
    }

    fn purge_expired(&self) -> Result<usize, SessionStoreError> {
        let now = Utc::now();
        let mut sessions = self.sessions.lock().map_err(|_| SessionStoreError::Poisoned)?;
        let expired: Vec<SessionId> = sessions
            .iter()
            .filter(|(_, session)| session.is_expired(now))
            .map(|(id, _)| id.clone())
            .collect();
        for id in &expired {
            sessions.pop(id);
        }
        Ok(expired.len())
    }

    fn len(&self) -> Result<usize, SessionStoreError> {
        let sessions = self.sessions.lock().map_err(|_| SessionStoreError::Poisoned)?;
        Ok(sessions.len())
    }
}
