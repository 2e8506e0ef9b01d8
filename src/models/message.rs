use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Participant;

/// Message lifecycle. A deleted message keeps its row; only the state tag
/// changes, so delivery and read timestamps survive both transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageState {
    Active,
    Edited,
    Deleted,
}

impl MessageState {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageState::Active => "active",
            MessageState::Edited => "edited",
            MessageState::Deleted => "deleted",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "edited" => MessageState::Edited,
            "deleted" => MessageState::Deleted,
            _ => MessageState::Active,
        }
    }
}

/// Stable reference to an uploaded attachment, as returned by the media
/// store and persisted with the message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentRef {
    pub key: String,
    pub url: String,
    pub content_type: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReplyRef {
    pub message_id: Uuid,
    pub text: String,
    pub user_id: Uuid,
}

/// Reference to the marketplace listing a conversation was started from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ListingRef {
    pub item_id: Uuid,
    pub title: String,
    pub price: Option<f64>,
    pub image: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub author_id: Uuid,
    pub body: Option<String>,
    pub attachments: Vec<AttachmentRef>,
    pub location: Option<GeoPoint>,
    pub reply_to: Option<ReplyRef>,
    pub listing_ref: Option<ListingRef>,
    pub state: MessageState,
    pub created_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub read_at: Option<DateTime<Utc>>,
}

/// Wire shape of a message: the stored row plus the author's display
/// fields.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MessageView {
    pub id: Uuid,
    pub chat_room_id: Uuid,
    pub author: Participant,
    pub body: Option<String>,
    pub attachments: Vec<AttachmentRef>,
    pub location: Option<GeoPoint>,
    pub reply_to: Option<ReplyRef>,
    pub product_reference: Option<ListingRef>,
    pub state: MessageState,
    pub created_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub read_at: Option<DateTime<Utc>>,
}

impl MessageView {
    pub fn new(message: &Message, author: Participant) -> Self {
        Self {
            id: message.id,
            chat_room_id: message.conversation_id,
            author,
            body: message.body.clone(),
            attachments: message.attachments.clone(),
            location: message.location,
            reply_to: message.reply_to.clone(),
            product_reference: message.listing_ref.clone(),
            state: message.state,
            created_at: message.created_at,
            delivered_at: message.delivered_at,
            read_at: message.read_at,
        }
    }
}
