use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use uuid::Uuid;

use super::ConnectionHandle;

/// Who is online right now. One live connection per user; registering a
/// second connection for the same user replaces the first.
///
/// Entries live only in this process and vanish on restart; they are never
/// persisted.
#[derive(Default, Clone)]
pub struct PresenceRegistry {
    inner: Arc<RwLock<HashMap<Uuid, ConnectionHandle>>>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, user_id: Uuid, handle: ConnectionHandle) {
        self.inner.write().await.insert(user_id, handle);
    }

    /// Remove the user's entry, but only if it still belongs to the
    /// disconnecting connection. A stale connection's cleanup must not
    /// evict the connection that replaced it. Safe to call twice.
    pub async fn unregister(&self, user_id: Uuid, conn_id: Uuid) -> bool {
        let mut guard = self.inner.write().await;
        match guard.get(&user_id) {
            Some(handle) if handle.conn_id() == conn_id => {
                guard.remove(&user_id);
                true
            }
            _ => false,
        }
    }

    pub async fn lookup(&self, user_id: Uuid) -> Option<ConnectionHandle> {
        self.inner.read().await.get(&user_id).cloned()
    }

    pub async fn is_online(&self, user_id: Uuid) -> bool {
        self.inner.read().await.contains_key(&user_id)
    }

    pub async fn list_online(&self) -> Vec<Uuid> {
        let mut users: Vec<Uuid> = self.inner.read().await.keys().copied().collect();
        users.sort();
        users
    }

    pub async fn handles(&self) -> Vec<ConnectionHandle> {
        self.inner.read().await.values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::unbounded_channel;

    fn handle(conn_id: Uuid) -> ConnectionHandle {
        let (tx, _rx) = unbounded_channel();
        ConnectionHandle::new(conn_id, tx)
    }

    #[tokio::test]
    async fn last_registration_wins() {
        let registry = PresenceRegistry::new();
        let user = Uuid::new_v4();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();

        registry.register(user, handle(first)).await;
        registry.register(user, handle(second)).await;

        let current = registry.lookup(user).await.unwrap();
        assert_eq!(current.conn_id(), second);
        assert_eq!(registry.list_online().await, vec![user]);
    }

    #[tokio::test]
    async fn stale_connection_cannot_evict_its_replacement() {
        let registry = PresenceRegistry::new();
        let user = Uuid::new_v4();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();

        registry.register(user, handle(first)).await;
        registry.register(user, handle(second)).await;

        assert!(!registry.unregister(user, first).await);
        assert!(registry.is_online(user).await);

        assert!(registry.unregister(user, second).await);
        assert!(!registry.is_online(user).await);

        // duplicate disconnect signals are a no-op
        assert!(!registry.unregister(user, second).await);
    }
}
