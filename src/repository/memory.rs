use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::{canonical_pair, Conversation, Message, MessageState};

use super::ConversationStore;

#[derive(Default)]
struct Inner {
    by_pair: HashMap<(Uuid, Uuid), Uuid>,
    conversations: HashMap<Uuid, Conversation>,
    // insertion order doubles as chronological order
    messages: HashMap<Uuid, Vec<Message>>,
}

/// Map-backed store used by the test suite. Mirrors the Postgres
/// implementation's semantics, including the canonical-pair uniqueness.
#[derive(Default)]
pub struct MemoryConversationStore {
    inner: Mutex<Inner>,
}

impl MemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn message_count(&self) -> usize {
        let inner = self.inner.lock().await;
        inner.messages.values().map(Vec::len).sum()
    }

    pub async fn conversation_count(&self) -> usize {
        self.inner.lock().await.conversations.len()
    }
}

#[async_trait]
impl ConversationStore for MemoryConversationStore {
    async fn find_or_create(&self, a: Uuid, b: Uuid) -> AppResult<Conversation> {
        let pair = canonical_pair(a, b);
        let mut inner = self.inner.lock().await;
        if let Some(id) = inner.by_pair.get(&pair) {
            return Ok(inner.conversations[id].clone());
        }
        let now = Utc::now();
        let conversation = Conversation {
            id: Uuid::new_v4(),
            user_low: pair.0,
            user_high: pair.1,
            last_message: None,
            last_message_at: None,
            unread_count: 0,
            created_at: now,
            updated_at: now,
        };
        inner.by_pair.insert(pair, conversation.id);
        inner.messages.insert(conversation.id, Vec::new());
        inner
            .conversations
            .insert(conversation.id, conversation.clone());
        Ok(conversation)
    }

    async fn get(&self, conversation_id: Uuid) -> AppResult<Option<Conversation>> {
        let inner = self.inner.lock().await;
        Ok(inner.conversations.get(&conversation_id).cloned())
    }

    async fn conversations_for_user(&self, user_id: Uuid) -> AppResult<Vec<Conversation>> {
        let inner = self.inner.lock().await;
        let mut out: Vec<Conversation> = inner
            .conversations
            .values()
            .filter(|c| c.is_participant(user_id))
            .cloned()
            .collect();
        out.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(out)
    }

    async fn append_message(&self, message: &Message, last_message: &str) -> AppResult<()> {
        let mut inner = self.inner.lock().await;
        inner
            .messages
            .entry(message.conversation_id)
            .or_default()
            .push(message.clone());
        if let Some(conversation) = inner.conversations.get_mut(&message.conversation_id) {
            conversation.last_message = Some(last_message.to_string());
            conversation.last_message_at = Some(message.created_at);
            conversation.unread_count += 1;
            conversation.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn get_message(
        &self,
        conversation_id: Uuid,
        message_id: Uuid,
    ) -> AppResult<Option<Message>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .messages
            .get(&conversation_id)
            .and_then(|messages| messages.iter().find(|m| m.id == message_id))
            .cloned())
    }

    async fn mark_delivered(&self, message_ids: &[Uuid], at: DateTime<Utc>) -> AppResult<()> {
        let mut inner = self.inner.lock().await;
        for messages in inner.messages.values_mut() {
            for message in messages.iter_mut() {
                if message.delivered_at.is_none() && message_ids.contains(&message.id) {
                    message.delivered_at = Some(at);
                }
            }
        }
        Ok(())
    }

    async fn undelivered_for(&self, user_id: Uuid) -> AppResult<Vec<Message>> {
        let inner = self.inner.lock().await;
        let mut out: Vec<Message> = inner
            .conversations
            .values()
            .filter(|c| c.is_participant(user_id))
            .flat_map(|c| inner.messages.get(&c.id).into_iter().flatten())
            .filter(|m| m.author_id != user_id && m.delivered_at.is_none())
            .cloned()
            .collect();
        out.sort_by_key(|m| m.created_at);
        Ok(out)
    }

    async fn mark_read(
        &self,
        conversation_id: Uuid,
        reader_id: Uuid,
        at: DateTime<Utc>,
    ) -> AppResult<Vec<Uuid>> {
        let mut inner = self.inner.lock().await;
        let mut flipped = Vec::new();
        if let Some(messages) = inner.messages.get_mut(&conversation_id) {
            for message in messages.iter_mut() {
                if message.author_id != reader_id && message.read_at.is_none() {
                    message.read_at = Some(at);
                    message.delivered_at.get_or_insert(at);
                    flipped.push(message.id);
                }
            }
        }
        if let Some(conversation) = inner.conversations.get_mut(&conversation_id) {
            conversation.unread_count = 0;
            conversation.updated_at = Utc::now();
        }
        Ok(flipped)
    }

    async fn set_body_edited(&self, message_id: Uuid, body: &str) -> AppResult<()> {
        let mut inner = self.inner.lock().await;
        for messages in inner.messages.values_mut() {
            if let Some(message) = messages.iter_mut().find(|m| m.id == message_id) {
                message.body = Some(body.to_string());
                message.state = MessageState::Edited;
            }
        }
        Ok(())
    }

    async fn set_deleted(&self, message_id: Uuid) -> AppResult<()> {
        let mut inner = self.inner.lock().await;
        for messages in inner.messages.values_mut() {
            if let Some(message) = messages.iter_mut().find(|m| m.id == message_id) {
                message.state = MessageState::Deleted;
            }
        }
        Ok(())
    }
}
