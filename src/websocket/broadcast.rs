use uuid::Uuid;

use super::events::ServerEvent;
use super::presence::PresenceRegistry;
use super::rooms::RoomRegistry;

/// Resolves a user or conversation to live connections and forwards
/// events. Delivery to an offline target is a silent no-op; absence from
/// the presence map is an expected outcome, not a failure.
#[derive(Clone)]
pub struct BroadcastRouter {
    presence: PresenceRegistry,
    rooms: RoomRegistry,
}

impl BroadcastRouter {
    pub fn new(presence: PresenceRegistry, rooms: RoomRegistry) -> Self {
        Self { presence, rooms }
    }

    pub async fn is_online(&self, user_id: Uuid) -> bool {
        self.presence.is_online(user_id).await
    }

    /// Forward to the user's personal channel. Returns whether a live
    /// connection accepted the event.
    pub async fn to_user(&self, user_id: Uuid, event: ServerEvent) -> bool {
        match self.presence.lookup(user_id).await {
            Some(handle) => handle.send(event),
            // offline: nothing to do
            None => false,
        }
    }

    pub async fn to_room(
        &self,
        conversation_id: Uuid,
        except_conn: Option<Uuid>,
        event: &ServerEvent,
    ) {
        self.rooms
            .broadcast(conversation_id, except_conn, event)
            .await;
    }

    pub async fn to_all_online(&self, event: &ServerEvent) {
        for handle in self.presence.handles().await {
            // stale handles are cleaned up by their own disconnect path
            let _ = handle.send(event.clone());
        }
    }

    /// Push the current "who is online" snapshot to every connection.
    pub async fn broadcast_presence(&self) {
        let event = ServerEvent::OnlineUsersUpdated {
            user_ids: self.presence.list_online().await,
        };
        self.to_all_online(&event).await;
    }
}
