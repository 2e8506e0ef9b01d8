pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::{Conversation, Message};

pub use memory::MemoryConversationStore;
pub use postgres::PgConversationStore;

/// Durable store for two-party conversations and their messages.
///
/// Injectable so the chat core can run against Postgres in production and
/// an in-memory map in tests.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Atomic find-or-create on the canonical participant pair. Two
    /// near-simultaneous first messages between the same pair must resolve
    /// to the same conversation.
    async fn find_or_create(&self, a: Uuid, b: Uuid) -> AppResult<Conversation>;

    async fn get(&self, conversation_id: Uuid) -> AppResult<Option<Conversation>>;

    async fn conversations_for_user(&self, user_id: Uuid) -> AppResult<Vec<Conversation>>;

    /// Append a message and refresh the conversation's denormalized
    /// snapshot (last message, unread counter) in one transaction.
    async fn append_message(&self, message: &Message, last_message: &str) -> AppResult<()>;

    async fn get_message(
        &self,
        conversation_id: Uuid,
        message_id: Uuid,
    ) -> AppResult<Option<Message>>;

    /// Set delivery time on messages that do not have one yet.
    async fn mark_delivered(&self, message_ids: &[Uuid], at: DateTime<Utc>) -> AppResult<()>;

    /// Messages addressed to `user_id` that were never delivered, oldest
    /// first. Feeds the catch-up sync at connect time.
    async fn undelivered_for(&self, user_id: Uuid) -> AppResult<Vec<Message>>;

    /// Mark every message authored by the peer as read, reset the unread
    /// counter, and return the ids that flipped. A message read before a
    /// delivery receipt was recorded is considered delivered at the same
    /// instant, keeping read_at >= delivered_at.
    async fn mark_read(
        &self,
        conversation_id: Uuid,
        reader_id: Uuid,
        at: DateTime<Utc>,
    ) -> AppResult<Vec<Uuid>>;

    /// Replace the body and tag the message as edited.
    async fn set_body_edited(&self, message_id: Uuid, body: &str) -> AppResult<()>;

    /// Soft delete: the row is retained, only the state tag changes.
    async fn set_deleted(&self, message_id: Uuid) -> AppResult<()>;
}
