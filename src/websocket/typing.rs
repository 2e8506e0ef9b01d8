use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use uuid::Uuid;

/// An in-progress typing signal, owned by one connection. At most one per
/// connection; a new start replaces the old conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypingState {
    pub conversation_id: Uuid,
    pub user_id: Uuid,
}

/// Connection-scoped typing state. Keyed by connection id so the single
/// disconnect cleanup routine can clear it without knowing what the client
/// was doing, which is what keeps the peer's indicator from sticking.
#[derive(Default, Clone)]
pub struct TypingTracker {
    inner: Arc<Mutex<HashMap<Uuid, TypingState>>>,
}

impl TypingTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn start(&self, conn_id: Uuid, state: TypingState) {
        self.inner.lock().await.insert(conn_id, state);
    }

    /// Remove and return the connection's typing state. Second and later
    /// calls return `None`, so every exit path can invoke this safely.
    pub async fn stop(&self, conn_id: Uuid) -> Option<TypingState> {
        self.inner.lock().await.remove(&conn_id)
    }

    pub async fn get(&self, conn_id: Uuid) -> Option<TypingState> {
        self.inner.lock().await.get(&conn_id).copied()
    }
}
