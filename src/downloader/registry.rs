// Download session registry
//
// The only shared mutable structure in the engine. Every mutation of a
// session goes through here; monitoring loops hold session ids, never
// references. Performs no I/O and holds locks only for map mutations.

use std::collections::HashMap;

use tokio::sync::RwLock;

use super::models::DownloadSession;

#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, DownloadSession>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Register a session under its id.
    pub async fn insert(&self, session: DownloadSession) {
        self.sessions
            .write()
            .await
            .insert(session.id.clone(), session);
    }

    /// Snapshot of a session, if it still exists.
    pub async fn get(&self, id: &str) -> Option<DownloadSession> {
        self.sessions.read().await.get(id).cloned()
    }

    /// Apply a mutation to a session. A missing id is a no-op: monitoring
    /// loops may race with terminal cleanup.
    pub async fn update<F>(&self, id: &str, f: F)
    where
        F: FnOnce(&mut DownloadSession),
    {
        if let Some(session) = self.sessions.write().await.get_mut(id) {
            f(session);
        }
    }

    /// Remove a session. Idempotent.
    pub async fn remove(&self, id: &str) {
        self.sessions.write().await.remove(id);
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Ids of all active sessions.
    pub async fn ids(&self) -> Vec<String> {
        self.sessions.read().await.keys().cloned().collect()
    }
}
