use std::{collections::HashMap, sync::Arc};

use chrono::{DateTime, Utc};
use portcullis_auth::{Session, SessionManager, SessionStatus};
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

pub type SessionId = String;

/// In-memory sessions keyed by the id carried in the session cookie.
///
/// Each session sits behind its own mutex, so one user's callback never
/// waits on another user's. Only `PendingAuth` and `Authenticated` sessions
/// are worth keeping; everything else is swept on the next insert.
#[derive(Debug, Default, Clone)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<SessionId, Arc<Mutex<Session>>>>>,
}

impl SessionStore {
    /// Store `session` under a fresh id, evicting dead sessions first.
    pub async fn insert(&self, session: Session, auth: &SessionManager) -> SessionId {
        let session_id = Uuid::new_v4().to_string();
        let mut sessions = self.sessions.write().await;
        evict(&mut sessions, auth, Utc::now());
        sessions.insert(session_id.clone(), Arc::new(Mutex::new(session)));
        session_id
    }

    pub async fn get(&self, session_id: &str) -> Option<Arc<Mutex<Session>>> {
        self.sessions.read().await.get(session_id).cloned()
    }

    /// Move a session to a new id. The old id stops resolving.
    pub async fn rotate(&self, session_id: &str) -> Option<SessionId> {
        let mut sessions = self.sessions.write().await;
        let session = sessions.remove(session_id)?;
        let fresh = Uuid::new_v4().to_string();
        sessions.insert(fresh.clone(), session);
        Some(fresh)
    }

    pub async fn remove(&self, session_id: &str) -> Option<Arc<Mutex<Session>>> {
        self.sessions.write().await.remove(session_id)
    }

    /// Drop sessions that are anonymous, expired, or hold a stale login
    /// request as of `now`. Returns how many were removed.
    pub async fn evict_stale_at(&self, auth: &SessionManager, now: DateTime<Utc>) -> usize {
        evict(&mut *self.sessions.write().await, auth, now)
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

fn evict(
    sessions: &mut HashMap<SessionId, Arc<Mutex<Session>>>,
    auth: &SessionManager,
    now: DateTime<Utc>,
) -> usize {
    let before = sessions.len();
    sessions.retain(|_, session| match session.try_lock() {
        Ok(mut session) => matches!(
            auth.check_session_at(&mut session, now),
            SessionStatus::PendingAuth | SessionStatus::Authenticated
        ),
        // in use by a request right now
        Err(_) => true,
    });
    let evicted = before - sessions.len();
    if evicted > 0 {
        tracing::debug!(evicted, remaining = sessions.len(), "evicted stale sessions");
    }
    evicted
}
