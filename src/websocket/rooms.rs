use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use uuid::Uuid;

use super::events::ServerEvent;
use super::ConnectionHandle;

#[derive(Debug, Clone)]
struct RoomMember {
    user_id: Uuid,
    handle: ConnectionHandle,
}

/// Conversation-keyed channel membership. Connections join a room to
/// receive events scoped to that conversation (typing, edits, deletes).
#[derive(Default, Clone)]
pub struct RoomRegistry {
    inner: Arc<RwLock<HashMap<Uuid, Vec<RoomMember>>>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn join(&self, conversation_id: Uuid, user_id: Uuid, handle: ConnectionHandle) {
        let mut guard = self.inner.write().await;
        let members = guard.entry(conversation_id).or_default();
        members.retain(|member| member.handle.conn_id() != handle.conn_id());
        members.push(RoomMember { user_id, handle });
    }

    pub async fn leave(&self, conversation_id: Uuid, conn_id: Uuid) {
        let mut guard = self.inner.write().await;
        if let Some(members) = guard.get_mut(&conversation_id) {
            members.retain(|member| member.handle.conn_id() != conn_id);
            if members.is_empty() {
                guard.remove(&conversation_id);
            }
        }
    }

    pub async fn leave_all(&self, conn_id: Uuid) {
        let mut guard = self.inner.write().await;
        guard.retain(|_, members| {
            members.retain(|member| member.handle.conn_id() != conn_id);
            !members.is_empty()
        });
    }

    /// Forward an event to every member of the room, except an optional
    /// originating connection. Members whose socket task is gone are
    /// dropped on the way.
    pub async fn broadcast(
        &self,
        conversation_id: Uuid,
        except_conn: Option<Uuid>,
        event: &ServerEvent,
    ) {
        let mut guard = self.inner.write().await;
        if let Some(members) = guard.get_mut(&conversation_id) {
            members.retain(|member| {
                if Some(member.handle.conn_id()) == except_conn {
                    return true;
                }
                member.handle.send(event.clone())
            });
            if members.is_empty() {
                guard.remove(&conversation_id);
            }
        }
    }

    pub async fn members_of(&self, conversation_id: Uuid) -> Vec<Uuid> {
        self.inner
            .read()
            .await
            .get(&conversation_id)
            .map(|members| members.iter().map(|m| m.user_id).collect())
            .unwrap_or_default()
    }
}
