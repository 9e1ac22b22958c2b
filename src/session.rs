//! Chat session manager
//!
//! Each session owns its conversation history exclusively. The per-session
//! mutex is what makes turns strictly sequential: a turn's model and
//! database calls finish (or fail) before the next turn in the same session
//! starts. Independent sessions run concurrently without shared mutable
//! state.

use crate::history::ConversationHistory;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};
use uuid::Uuid;

/// One user chat session.
pub struct Session {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    /// Locked for the full duration of a turn
    pub history: Mutex<ConversationHistory>,
}

/// Summary returned by the session listing endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub turns: usize,
}

/// Registry of live sessions.
pub struct SessionManager {
    sessions: RwLock<HashMap<Uuid, Arc<Session>>>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub async fn create(&self) -> Arc<Session> {
        let session = Arc::new(Session {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            history: Mutex::new(ConversationHistory::new()),
        });

        self.sessions
            .write()
            .await
            .insert(session.id, session.clone());

        info!("Created session {}", session.id);
        session
    }

    pub async fn get(&self, id: Uuid) -> Option<Arc<Session>> {
        self.sessions.read().await.get(&id).cloned()
    }

    pub async fn list(&self) -> Vec<SessionInfo> {
        let sessions = self.sessions.read().await;
        let mut infos = Vec::with_capacity(sessions.len());
        for session in sessions.values() {
            infos.push(SessionInfo {
                id: session.id,
                created_at: session.created_at,
                turns: session.history.lock().await.len(),
            });
        }
        infos.sort_by_key(|info| info.created_at);
        infos
    }

    pub async fn remove(&self, id: Uuid) -> bool {
        let removed = self.sessions.write().await.remove(&id).is_some();
        if removed {
            debug!("Removed session {}", id);
        }
        removed
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}
