//! Shared harness: an AppState wired to the in-memory store, media, and
//! directory, plus a fake connection that records what the server pushes.

use std::sync::Arc;

use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};
use uuid::Uuid;

use chat_service::config::Config;
use chat_service::repository::MemoryConversationStore;
use chat_service::services::directory::StaticUserDirectory;
use chat_service::services::media::MemoryMediaStore;
use chat_service::state::AppState;
use chat_service::websocket::events::ServerEvent;
use chat_service::websocket::{session, ConnectionHandle};

pub struct TestEnv {
    pub state: AppState,
    pub store: Arc<MemoryConversationStore>,
    pub media: Arc<MemoryMediaStore>,
    pub directory: Arc<StaticUserDirectory>,
}

pub fn test_env() -> TestEnv {
    let store = Arc::new(MemoryConversationStore::new());
    let media = Arc::new(MemoryMediaStore::new());
    let directory = Arc::new(StaticUserDirectory::new());
    let config = Arc::new(Config {
        database_url: "postgres://unused".into(),
        port: 0,
        media_bucket: "test-bucket".into(),
        media_base_url: "memory://test-bucket".into(),
    });
    let state = AppState::new(
        config,
        store.clone(),
        media.clone(),
        directory.clone(),
    );
    TestEnv {
        state,
        store,
        media,
        directory,
    }
}

pub struct TestClient {
    pub user_id: Uuid,
    pub conn_id: Uuid,
    pub handle: ConnectionHandle,
    pub rx: UnboundedReceiver<ServerEvent>,
}

impl TestClient {
    /// Drain everything received so far.
    pub fn events(&mut self) -> Vec<ServerEvent> {
        let mut out = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            out.push(event);
        }
        out
    }

    /// Discard everything received so far.
    pub fn drain(&mut self) {
        while self.rx.try_recv().is_ok() {}
    }
}

/// Registers presence, runs catch-up sync, and broadcasts the presence
/// snapshot, mirroring the connect path of the session manager.
pub async fn connect(state: &AppState, user_id: Uuid) -> TestClient {
    let conn_id = Uuid::new_v4();
    let (tx, rx) = unbounded_channel();
    let handle = ConnectionHandle::new(conn_id, tx);

    state.presence.register(user_id, handle.clone()).await;
    state
        .pipeline
        .run_catchup_sync(user_id)
        .await
        .expect("catch-up sync");
    state.router.broadcast_presence().await;

    TestClient {
        user_id,
        conn_id,
        handle,
        rx,
    }
}

pub async fn disconnect(state: &AppState, client: &TestClient) {
    session::cleanup(state, client.conn_id, client.user_id).await;
}

pub async fn join_room(state: &AppState, client: &TestClient, conversation_id: Uuid) {
    state
        .rooms
        .join(conversation_id, client.user_id, client.handle.clone())
        .await;
}
