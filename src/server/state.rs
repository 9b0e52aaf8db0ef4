//! Application state management

use super::ServerConfig;
use crate::session::SessionStore;
use chrono::{DateTime, Utc};

/// Application state shared across handlers
pub struct AppState {
    pub config: ServerConfig,
    pub sessions: SessionStore,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            sessions: SessionStore::new(),
            started_at: Utc::now(),
        }
    }
}
