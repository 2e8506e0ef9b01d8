use std::sync::Arc;

use crate::config::Config;
use crate::repository::ConversationStore;
use crate::services::directory::UserDirectory;
use crate::services::media::MediaStore;
use crate::services::pipeline::MessagePipeline;
use crate::websocket::{BroadcastRouter, PresenceRegistry, RoomRegistry, TypingTracker};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn ConversationStore>,
    pub directory: Arc<dyn UserDirectory>,
    pub presence: PresenceRegistry,
    pub rooms: RoomRegistry,
    pub typing: TypingTracker,
    pub router: BroadcastRouter,
    pub pipeline: Arc<MessagePipeline>,
}

impl AppState {
    pub fn new(
        config: Arc<Config>,
        store: Arc<dyn ConversationStore>,
        media: Arc<dyn MediaStore>,
        directory: Arc<dyn UserDirectory>,
    ) -> Self {
        let presence = PresenceRegistry::new();
        let rooms = RoomRegistry::new();
        let typing = TypingTracker::new();
        let router = BroadcastRouter::new(presence.clone(), rooms.clone());
        let pipeline = Arc::new(MessagePipeline::new(
            Arc::clone(&store),
            media,
            Arc::clone(&directory),
            router.clone(),
        ));
        Self {
            config,
            store,
            directory,
            presence,
            rooms,
            typing,
            router,
            pipeline,
        }
    }
}
