use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::{canonical_pair, Conversation, Message, MessageState};

use super::ConversationStore;

const MESSAGE_COLUMNS: &str = "id, conversation_id, author_id, body, attachments, location, \
     reply_to, listing_ref, state, created_at, delivered_at, read_at";

const CONVERSATION_COLUMNS: &str = "id, user_low, user_high, last_message, last_message_at, \
     unread_count, created_at, updated_at";

pub struct PgConversationStore {
    pool: Pool<Postgres>,
}

impl PgConversationStore {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

fn conversation_from_row(row: &PgRow) -> Conversation {
    Conversation {
        id: row.get("id"),
        user_low: row.get("user_low"),
        user_high: row.get("user_high"),
        last_message: row.get("last_message"),
        last_message_at: row.get("last_message_at"),
        unread_count: row.get("unread_count"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn message_from_row(row: &PgRow) -> AppResult<Message> {
    let attachments: serde_json::Value = row.get("attachments");
    let location: Option<serde_json::Value> = row.get("location");
    let reply_to: Option<serde_json::Value> = row.get("reply_to");
    let listing_ref: Option<serde_json::Value> = row.get("listing_ref");
    let state: String = row.get("state");

    Ok(Message {
        id: row.get("id"),
        conversation_id: row.get("conversation_id"),
        author_id: row.get("author_id"),
        body: row.get("body"),
        attachments: serde_json::from_value(attachments)?,
        location: location.map(serde_json::from_value).transpose()?,
        reply_to: reply_to.map(serde_json::from_value).transpose()?,
        listing_ref: listing_ref.map(serde_json::from_value).transpose()?,
        state: MessageState::parse(&state),
        created_at: row.get("created_at"),
        delivered_at: row.get("delivered_at"),
        read_at: row.get("read_at"),
    })
}

#[async_trait]
impl ConversationStore for PgConversationStore {
    async fn find_or_create(&self, a: Uuid, b: Uuid) -> AppResult<Conversation> {
        let (low, high) = canonical_pair(a, b);

        // Concurrent first messages race here; the unique pair key makes
        // the losing insert a no-op and the re-select converges both
        // callers on one row.
        sqlx::query(
            "INSERT INTO conversations (id, user_low, user_high) VALUES ($1, $2, $3) \
             ON CONFLICT (user_low, user_high) DO NOTHING",
        )
        .bind(Uuid::new_v4())
        .bind(low)
        .bind(high)
        .execute(&self.pool)
        .await?;

        let row = sqlx::query(&format!(
            "SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE user_low = $1 AND user_high = $2"
        ))
        .bind(low)
        .bind(high)
        .fetch_one(&self.pool)
        .await?;

        Ok(conversation_from_row(&row))
    }

    async fn get(&self, conversation_id: Uuid) -> AppResult<Option<Conversation>> {
        let row = sqlx::query(&format!(
            "SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE id = $1"
        ))
        .bind(conversation_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(conversation_from_row))
    }

    async fn conversations_for_user(&self, user_id: Uuid) -> AppResult<Vec<Conversation>> {
        let rows = sqlx::query(&format!(
            "SELECT {CONVERSATION_COLUMNS} FROM conversations \
             WHERE user_low = $1 OR user_high = $1 \
             ORDER BY updated_at DESC \
             LIMIT 100"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(conversation_from_row).collect())
    }

    async fn append_message(&self, message: &Message, last_message: &str) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO messages (id, conversation_id, author_id, body, attachments, location, \
             reply_to, listing_ref, state, created_at, delivered_at, read_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
        )
        .bind(message.id)
        .bind(message.conversation_id)
        .bind(message.author_id)
        .bind(&message.body)
        .bind(serde_json::to_value(&message.attachments)?)
        .bind(
            message
                .location
                .as_ref()
                .map(serde_json::to_value)
                .transpose()?,
        )
        .bind(
            message
                .reply_to
                .as_ref()
                .map(serde_json::to_value)
                .transpose()?,
        )
        .bind(
            message
                .listing_ref
                .as_ref()
                .map(serde_json::to_value)
                .transpose()?,
        )
        .bind(message.state.as_str())
        .bind(message.created_at)
        .bind(message.delivered_at)
        .bind(message.read_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "UPDATE conversations \
             SET last_message = $2, last_message_at = $3, unread_count = unread_count + 1, \
                 updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(message.conversation_id)
        .bind(last_message)
        .bind(message.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn get_message(
        &self,
        conversation_id: Uuid,
        message_id: Uuid,
    ) -> AppResult<Option<Message>> {
        let row = sqlx::query(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = $1 AND conversation_id = $2"
        ))
        .bind(message_id)
        .bind(conversation_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(message_from_row).transpose()
    }

    async fn mark_delivered(&self, message_ids: &[Uuid], at: DateTime<Utc>) -> AppResult<()> {
        if message_ids.is_empty() {
            return Ok(());
        }
        sqlx::query(
            "UPDATE messages SET delivered_at = $2 WHERE id = ANY($1) AND delivered_at IS NULL",
        )
        .bind(message_ids)
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn undelivered_for(&self, user_id: Uuid) -> AppResult<Vec<Message>> {
        let rows = sqlx::query(
            "SELECT m.id, m.conversation_id, m.author_id, m.body, m.attachments, m.location, \
                    m.reply_to, m.listing_ref, m.state, m.created_at, m.delivered_at, m.read_at \
             FROM messages m \
             JOIN conversations c ON c.id = m.conversation_id \
             WHERE (c.user_low = $1 OR c.user_high = $1) \
               AND m.author_id <> $1 \
               AND m.delivered_at IS NULL \
             ORDER BY m.created_at ASC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(message_from_row).collect()
    }

    async fn mark_read(
        &self,
        conversation_id: Uuid,
        reader_id: Uuid,
        at: DateTime<Utc>,
    ) -> AppResult<Vec<Uuid>> {
        let mut tx = self.pool.begin().await?;

        let rows = sqlx::query(
            "UPDATE messages \
             SET read_at = $3, delivered_at = COALESCE(delivered_at, $3) \
             WHERE conversation_id = $1 AND author_id <> $2 AND read_at IS NULL \
             RETURNING id",
        )
        .bind(conversation_id)
        .bind(reader_id)
        .bind(at)
        .fetch_all(&mut *tx)
        .await?;

        sqlx::query("UPDATE conversations SET unread_count = 0, updated_at = NOW() WHERE id = $1")
            .bind(conversation_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(rows.iter().map(|row| row.get("id")).collect())
    }

    async fn set_body_edited(&self, message_id: Uuid, body: &str) -> AppResult<()> {
        sqlx::query("UPDATE messages SET body = $2, state = 'edited' WHERE id = $1")
            .bind(message_id)
            .bind(body)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_deleted(&self, message_id: Uuid) -> AppResult<()> {
        sqlx::query("UPDATE messages SET state = 'deleted' WHERE id = $1")
            .bind(message_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
