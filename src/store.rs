//! Session Store: committed result sets of completed batches.
//!
//! An entry appears only when its batch completes and is never modified
//! afterwards. Reads distinguish an unknown (or still running) session from
//! a completed session without any successful record.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;

use crate::error::{Error, Result};
use crate::types::{ResultPreview, Session, SessionId};

/// Maximum number of records returned by [`SessionStore::preview`]
pub const PREVIEW_LIMIT: usize = 5;

struct StoredSession {
    session: Arc<Session>,
    last_access: StdMutex<Instant>,
}

impl StoredSession {
    fn touch(&self) {
        match self.last_access.lock() {
            Ok(mut at) => *at = Instant::now(),
            Err(poisoned) => *poisoned.into_inner() = Instant::now(),
        }
    }

    fn idle_for(&self) -> Duration {
        match self.last_access.lock() {
            Ok(at) => at.elapsed(),
            Err(poisoned) => poisoned.into_inner().elapsed(),
        }
    }
}

/// Concurrency-safe map from session id to its committed results
#[derive(Clone, Default)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<SessionId, StoredSession>>>,
}

impl SessionStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Commit the final result set of a session
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyCommitted`] if the session already has results;
    /// the existing entry is left untouched.
    pub async fn commit(&self, session: Session) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(&session.id) {
            return Err(Error::AlreadyCommitted(session.id));
        }

        tracing::debug!(
            session_id = %session.id,
            results = session.results.len(),
            "Committed session results"
        );
        sessions.insert(
            session.id,
            StoredSession {
                session: Arc::new(session),
                last_access: StdMutex::new(Instant::now()),
            },
        );
        Ok(())
    }

    /// Full committed session, empty or not
    ///
    /// Returns [`Error::SessionNotFound`] for unknown, evicted, or still
    /// running sessions.
    pub async fn get(&self, session_id: SessionId) -> Result<Arc<Session>> {
        let sessions = self.sessions.read().await;
        let stored = sessions
            .get(&session_id)
            .ok_or(Error::SessionNotFound(session_id))?;
        stored.touch();
        Ok(Arc::clone(&stored.session))
    }

    /// First [`PREVIEW_LIMIT`] records and the total count
    ///
    /// A session without successful records is reported as [`Error::NoData`].
    pub async fn preview(&self, session_id: SessionId) -> Result<ResultPreview> {
        let session = self.export(session_id).await?;
        let data: Vec<_> = session
            .results
            .iter()
            .take(PREVIEW_LIMIT)
            .cloned()
            .collect();

        Ok(ResultPreview {
            preview_count: data.len(),
            total_results: session.results.len(),
            data,
        })
    }

    /// Full result set for export, with the same not-found and no-data rules as [`preview`](Self::preview)
    pub async fn export(&self, session_id: SessionId) -> Result<Arc<Session>> {
        let session = self.get(session_id).await?;
        if session.results.is_empty() {
            return Err(Error::NoData(session_id));
        }
        Ok(session)
    }

    /// Whether results were committed for the session
    pub async fn contains(&self, session_id: SessionId) -> bool {
        self.sessions.read().await.contains_key(&session_id)
    }

    /// Number of stored sessions
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Whether the store is empty
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Evict sessions that have not been committed or read for at least `ttl`
    ///
    /// Returns the evicted session ids.
    pub async fn evict_idle(&self, ttl: Duration) -> Vec<SessionId> {
        let mut sessions = self.sessions.write().await;
        let expired: Vec<SessionId> = sessions
            .iter()
            .filter(|(_, stored)| stored.idle_for() >= ttl)
            .map(|(id, _)| *id)
            .collect();

        for id in &expired {
            sessions.remove(id);
        }
        expired
    }
}
