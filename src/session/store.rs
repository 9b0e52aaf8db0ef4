//! One pipeline state per session

use super::PipelineState;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::info;
use uuid::Uuid;

pub type SessionId = Uuid;

/// A session's state, locked for the duration of each action
pub type SharedState = Arc<Mutex<PipelineState>>;

/// Sessions by id. Cloning shares the same map.
#[derive(Clone, Default)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<SessionId, SharedState>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a fresh, empty session
    pub async fn create(&self) -> SessionId {
        let id = Uuid::new_v4();
        let mut sessions = self.sessions.write().await;
        sessions.insert(id, Arc::new(Mutex::new(PipelineState::new())));
        info!(session = %id, active = sessions.len(), "Session created");
        id
    }

    pub async fn get(&self, id: &SessionId) -> Option<SharedState> {
        self.sessions.read().await.get(id).cloned()
    }

    /// Drop a session; `false` when it did not exist
    pub async fn remove(&self, id: &SessionId) -> bool {
        let mut sessions = self.sessions.write().await;
        let removed = sessions.remove(id).is_some();
        if removed {
            info!(session = %id, active = sessions.len(), "Session removed");
        }
        removed
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{Dataset, Stage};
    use polars::prelude::*;

    #[tokio::test]
    async fn test_sessions_are_isolated() {
        let store = SessionStore::new();
        let a = store.create().await;
        let b = store.create().await;
        assert_ne!(a, b);
        assert_eq!(store.len().await, 2);

        let table = df!("v" => &[1i64, 2]).unwrap();
        store.get(&a).await.unwrap().lock().await.load_raw(Dataset::new("a.csv", table));

        assert_eq!(store.get(&a).await.unwrap().lock().await.stage(), Stage::RawLoaded);
        assert_eq!(store.get(&b).await.unwrap().lock().await.stage(), Stage::Empty);
    }

    #[tokio::test]
    async fn test_remove() {
        let store = SessionStore::new();
        let id = store.create().await;
        assert!(store.remove(&id).await);
        assert!(!store.remove(&id).await);
        assert!(store.get(&id).await.is_none());
        assert!(store.is_empty().await);
    }
}
