pub mod conversation;
pub mod message;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use conversation::{canonical_pair, Conversation, ConversationSummary};
pub use message::{
    AttachmentRef, GeoPoint, ListingRef, Message, MessageState, MessageView, ReplyRef,
};

/// Display fields of a chat participant, read from the marketplace's user
/// directory when building wire payloads.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub id: Uuid,
    pub username: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
}
