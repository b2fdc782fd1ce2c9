//! Session lookup tables, one per transport kind

use std::{collections::HashMap, sync::Arc};

use chrono::Utc;
use tokio::sync::RwLock;
use tracing::debug;

use super::{Session, TransportKind};

/// Map from session id to live session for a single transport kind.
///
/// The registry is the only owner of session lookups: an entry is inserted once the
/// session is fully established and removed when the session closes.
#[derive(Debug)]
pub struct SessionRegistry {
    kind: TransportKind,
    sessions: RwLock<HashMap<Arc<str>, Session>>,
}

impl SessionRegistry {
    pub fn new(kind: TransportKind) -> Self {
        Self {
            kind,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub async fn get(&self, id: &str) -> Option<Session> {
        self.sessions.read().await.get(id).cloned()
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.sessions.read().await.contains_key(id)
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Inserts `session` and arranges for its removal when it closes.
    ///
    /// Fails with the already registered session if the id is taken; the caller decides
    /// what to do with the loser.
    pub async fn register(self: &Arc<Self>, session: Session) -> Result<(), Session> {
        debug_assert_eq!(session.kind(), self.kind);
        {
            let mut sessions = self.sessions.write().await;
            if let Some(existing) = sessions.get(session.id().as_ref()) {
                return Err(existing.clone());
            }
            sessions.insert(session.id().clone(), session.clone());
        }
        debug!(session_id = %session.id(), kind = %self.kind, "session registered");

        let registry = Arc::clone(self);
        tokio::spawn(async move {
            session.closed().await;
            registry.remove(&session).await;
        });

        Ok(())
    }

    /// Removes `session` if it is still the entry registered under its id.
    pub async fn remove(&self, session: &Session) -> bool {
        let mut sessions = self.sessions.write().await;
        let is_current = sessions
            .get(session.id().as_ref())
            .is_some_and(|current| current.same_as(session));
        if is_current {
            sessions.remove(session.id().as_ref());
            debug!(
                session_id = %session.id(),
                kind = %session.kind(),
                age_secs = (Utc::now() - session.created_at()).num_seconds(),
                "session removed"
            );
        }
        is_current
    }
}

/// The two disjoint registries owned by one listener.
#[derive(Debug)]
pub struct Sessions {
    pub sse: Arc<SessionRegistry>,
    pub streamable: Arc<SessionRegistry>,
}

impl Default for Sessions {
    fn default() -> Self {
        Self {
            sse: Arc::new(SessionRegistry::new(TransportKind::Sse)),
            streamable: Arc::new(SessionRegistry::new(TransportKind::Streamable)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionCounts {
    pub sse: usize,
    pub streamable: usize,
}

impl SessionCounts {
    pub fn total(&self) -> usize {
        self.sse + self.streamable
    }
}

impl Sessions {
    pub async fn counts(&self) -> SessionCounts {
        SessionCounts {
            sse: self.sse.len().await,
            streamable: self.streamable.len().await,
        }
    }
}
