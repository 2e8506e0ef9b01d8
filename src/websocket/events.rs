//! Wire protocol of the chat transport.
//!
//! Every frame is a tagged JSON object; the `type` field carries the
//! event name and the remaining fields are flattened alongside it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{
    ConversationSummary, GeoPoint, ListingRef, MessageView, Participant, ReplyRef,
};
use crate::services::media::AttachmentUpload;

/// Events a client may send.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    #[serde(rename_all = "camelCase")]
    SendMessage {
        sender_id: Uuid,
        receiver_id: Uuid,
        #[serde(default)]
        message: Option<String>,
        #[serde(default)]
        images: Option<Vec<AttachmentUpload>>,
        #[serde(default)]
        location: Option<GeoPoint>,
        #[serde(default)]
        reply_to: Option<ReplyRef>,
        #[serde(default)]
        product_reference: Option<ListingRef>,
    },
    #[serde(rename_all = "camelCase")]
    EditMessage {
        chat_room_id: Uuid,
        message_id: Uuid,
        message: String,
    },
    #[serde(rename_all = "camelCase")]
    DeleteMessage { chat_room_id: Uuid, message_id: Uuid },
    #[serde(rename_all = "camelCase")]
    TypingStart { chat_room_id: Uuid, user_id: Uuid },
    #[serde(rename_all = "camelCase")]
    TypingStop { chat_room_id: Uuid, user_id: Uuid },
    #[serde(rename_all = "camelCase")]
    MarkMessagesRead { chat_room_id: Uuid, user_id: Uuid },
    #[serde(rename_all = "camelCase")]
    JoinChatRoom { chat_room_id: Uuid },
    #[serde(rename_all = "camelCase")]
    LeaveChatRoom { chat_room_id: Uuid },
}

/// Compact payload accompanying a forwarded message, for clients that only
/// surface a banner while the conversation view is closed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MessageNotification {
    pub from: Participant,
    pub preview: String,
}

/// Events the server may push.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    #[serde(rename_all = "camelCase")]
    ConnectionSuccess { user_id: Uuid },
    Error { message: String },
    #[serde(rename_all = "camelCase")]
    MessageSent { message: MessageView },
    #[serde(rename_all = "camelCase")]
    NewMessage {
        message: MessageView,
        notification: MessageNotification,
    },
    #[serde(rename_all = "camelCase")]
    MessageDelivered {
        chat_room_id: Uuid,
        message_ids: Vec<Uuid>,
        delivered_at: DateTime<Utc>,
    },
    #[serde(rename_all = "camelCase")]
    MessageEdited {
        chat_room_id: Uuid,
        message: MessageView,
    },
    #[serde(rename_all = "camelCase")]
    MessageDeleted { chat_room_id: Uuid, message_id: Uuid },
    #[serde(rename_all = "camelCase")]
    MessagesRead {
        chat_room_id: Uuid,
        message_ids: Vec<Uuid>,
    },
    #[serde(rename_all = "camelCase")]
    ChatRoomUpdated { chat_room: ConversationSummary },
    #[serde(rename_all = "camelCase")]
    UserTyping {
        chat_room_id: Uuid,
        user_id: Uuid,
        is_typing: bool,
    },
    #[serde(rename_all = "camelCase")]
    OnlineUsersUpdated { user_ids: Vec<Uuid> },
}
