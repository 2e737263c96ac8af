// src/services/session_manager.rs
use std::{
    collections::HashMap,
    fmt::Debug,
    sync::Arc,
    time::{Duration, Instant},
};

use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::agents::Event;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct SessionKey {
    app_name: String,
    user_id: String,
    session_id: String,
}

impl SessionKey {
    fn new(app_name: &str, user_id: &str, session_id: &str) -> Self {
        Self {
            app_name: app_name.to_string(),
            user_id: user_id.to_string(),
            session_id: session_id.to_string(),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub app_name: String,
    pub user_id: String,
    pub state: Map<String, Value>,
    pub events: Vec<Event>,
    #[serde(skip)]
    pub last_active: Instant,
}

impl Session {
    pub fn new(app_name: &str, user_id: &str, id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            app_name: app_name.to_string(),
            user_id: user_id.to_string(),
            state: Map::new(),
            events: Vec::new(),
            last_active: Instant::now(),
        }
    }

    /// Apply an event's state delta and keep it in the history.
    fn apply(&mut self, event: Event) {
        for (k, v) in &event.actions.state_delta {
            self.state.insert(k.clone(), v.clone());
        }
        self.events.push(event);
        self.last_active = Instant::now();
    }
}

#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<RwLock<HashMap<SessionKey, Session>>>,
    ttl: Duration,
}

impl Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl SessionManager {
    // Create a new manager
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
            ttl,
        }
    }

    /// Create a session, generating an id when none is given. An existing
    /// session with the same id is replaced.
    pub async fn create_session(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: Option<&str>,
        state: Map<String, Value>,
    ) -> Session {
        let id = session_id
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let mut session = Session::new(app_name, user_id, id.clone());
        session.state = state;

        let mut guard = self.inner.write().await;
        guard.insert(SessionKey::new(app_name, user_id, &id), session.clone());
        session
    }

    // Ensure there's a session with this id.
    pub async fn ensure_session(&self, app_name: &str, user_id: &str, session_id: &str) -> Session {
        let key = SessionKey::new(app_name, user_id, session_id);
        {
            let guard = self.inner.read().await;
            if let Some(session) = guard.get(&key) {
                return session.clone();
            }
        }
        let mut guard = self.inner.write().await;
        guard
            .entry(key)
            .or_insert_with(|| Session::new(app_name, user_id, session_id))
            .clone()
    }

    pub async fn get_session(&self, app_name: &str, user_id: &str, session_id: &str) -> Option<Session> {
        let guard = self.inner.read().await;
        guard.get(&SessionKey::new(app_name, user_id, session_id)).cloned()
    }

    /// Sessions for one user of one app, oldest activity first.
    pub async fn list_sessions(&self, app_name: &str, user_id: &str) -> Vec<Session> {
        let guard = self.inner.read().await;
        let mut sessions: Vec<Session> = guard
            .iter()
            .filter(|(k, _)| k.app_name == app_name && k.user_id == user_id)
            .map(|(_, s)| s.clone())
            .collect();
        sessions.sort_by_key(|s| s.last_active);
        sessions
    }

    // Append an event to a session's history and touch last_active.
    pub async fn append_event(&self, app_name: &str, user_id: &str, session_id: &str, event: Event) -> usize {
        let mut guard = self.inner.write().await;
        let entry = guard
            .entry(SessionKey::new(app_name, user_id, session_id))
            .or_insert_with(|| Session::new(app_name, user_id, session_id));
        entry.apply(event);
        entry.events.len()
    }

    /// Merge values into a session's state.
    pub async fn update_state(&self, app_name: &str, user_id: &str, session_id: &str, delta: Map<String, Value>) -> bool {
        let mut guard = self.inner.write().await;
        match guard.get_mut(&SessionKey::new(app_name, user_id, session_id)) {
            Some(session) => {
                session.state.extend(delta);
                session.last_active = Instant::now();
                true
            }
            None => false,
        }
    }

    /// Remove a session by id
    pub async fn delete_session(&self, app_name: &str, user_id: &str, session_id: &str) -> bool {
        let mut guard = self.inner.write().await;
        guard.remove(&SessionKey::new(app_name, user_id, session_id)).is_some()
    }

    /// Remove sessions idle longer than ttl. Returns number removed.
    pub async fn purge_expired(&self) -> usize {
        let mut guard = self.inner.write().await;
        let now = Instant::now();
        let before = guard.len();
        guard.retain(|_, s| now.duration_since(s.last_active) < self.ttl);
        before - guard.len()
    }

    /// Number of sessions
    pub async fn len(&self) -> usize {
        let guard = self.inner.read().await;
        guard.len()
    }
}
