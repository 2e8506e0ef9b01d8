pub mod broadcast;
pub mod events;
pub mod handlers;
pub mod presence;
pub mod rooms;
pub mod session;
pub mod typing;

use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

use events::ServerEvent;

pub use broadcast::BroadcastRouter;
pub use presence::PresenceRegistry;
pub use rooms::RoomRegistry;
pub use typing::{TypingState, TypingTracker};

/// Address of one live connection: its id plus the channel drained by the
/// connection's socket task.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    conn_id: Uuid,
    sender: UnboundedSender<ServerEvent>,
}

impl ConnectionHandle {
    pub fn new(conn_id: Uuid, sender: UnboundedSender<ServerEvent>) -> Self {
        Self { conn_id, sender }
    }

    pub fn conn_id(&self) -> Uuid {
        self.conn_id
    }

    /// Queue an event for this connection. `false` means the socket task
    /// is gone and the handle is stale.
    pub fn send(&self, event: ServerEvent) -> bool {
        self.sender.send(event).is_ok()
    }
}
