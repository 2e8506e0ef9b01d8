//! Validates, enriches, persists, and dispatches chat traffic.
//!
//! Every operation here is invoked from a connection's event handler and
//! reports failures back to that connection only.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use futures::stream::{self, StreamExt, TryStreamExt};
use tracing::warn;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{
    AttachmentRef, GeoPoint, ListingRef, Message, MessageState, MessageView, Participant, ReplyRef,
};
use crate::repository::ConversationStore;
use crate::services::directory::UserDirectory;
use crate::services::media::{AttachmentUpload, MediaStore};
use crate::websocket::events::{MessageNotification, ServerEvent};
use crate::websocket::BroadcastRouter;

pub const MAX_BODY_CHARS: usize = 5000;
pub const MAX_ATTACHMENTS: usize = 5;
const UPLOAD_CONCURRENCY: usize = 4;

/// Input contract of a send.
#[derive(Debug, Clone)]
pub struct OutgoingMessage {
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub text: Option<String>,
    pub attachments: Vec<AttachmentUpload>,
    pub location: Option<GeoPoint>,
    pub reply_to: Option<ReplyRef>,
    pub listing: Option<ListingRef>,
}

/// Trim and cap a message body. `None` means there is no usable text.
pub fn normalize_body(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if trimmed.chars().count() > MAX_BODY_CHARS {
        Some(trimmed.chars().take(MAX_BODY_CHARS).collect())
    } else {
        Some(trimmed.to_string())
    }
}

fn last_message_snapshot(message: &Message) -> String {
    if let Some(body) = &message.body {
        body.clone()
    } else if !message.attachments.is_empty() {
        match message.attachments.len() {
            1 => "1 attachment".to_string(),
            n => format!("{n} attachments"),
        }
    } else {
        "location".to_string()
    }
}

pub struct MessagePipeline {
    store: Arc<dyn ConversationStore>,
    media: Arc<dyn MediaStore>,
    directory: Arc<dyn UserDirectory>,
    router: BroadcastRouter,
}

impl MessagePipeline {
    pub fn new(
        store: Arc<dyn ConversationStore>,
        media: Arc<dyn MediaStore>,
        directory: Arc<dyn UserDirectory>,
        router: BroadcastRouter,
    ) -> Self {
        Self {
            store,
            media,
            directory,
            router,
        }
    }

    /// Full send path: validate, upload, persist, dispatch.
    pub async fn send_message(&self, session_user: Uuid, input: OutgoingMessage) -> AppResult<()> {
        let OutgoingMessage {
            sender_id,
            receiver_id,
            text,
            attachments,
            location,
            reply_to,
            listing,
        } = input;

        if sender_id == receiver_id {
            return Err(AppError::BadRequest(
                "cannot start a chat with yourself".into(),
            ));
        }
        if sender_id != session_user {
            return Err(AppError::Unauthorized);
        }
        if sender_id.is_nil() || receiver_id.is_nil() {
            return Err(AppError::BadRequest("malformed user id".into()));
        }
        let body = text.as_deref().and_then(normalize_body);
        if body.is_none() && attachments.is_empty() && location.is_none() {
            return Err(AppError::BadRequest(
                "message needs text, attachments, or a location".into(),
            ));
        }
        if attachments.len() > MAX_ATTACHMENTS {
            return Err(AppError::BadRequest(format!(
                "at most {MAX_ATTACHMENTS} attachments per message"
            )));
        }

        let sender = self
            .participant(sender_id)
            .await?
            .ok_or(AppError::Unauthorized)?;
        self.participant(receiver_id)
            .await?
            .ok_or_else(|| AppError::BadRequest("unknown receiver".into()))?;

        // One failed upload aborts the whole send. Objects stored before
        // the failing one stay behind; see DESIGN notes on reconciliation.
        let attachments = self.upload_all(&attachments).await?;

        let conversation = self.store.find_or_create(sender_id, receiver_id).await?;
        let mut message = Message {
            id: Uuid::new_v4(),
            conversation_id: conversation.id,
            author_id: sender_id,
            body,
            attachments,
            location,
            reply_to,
            listing_ref: listing,
            state: MessageState::Active,
            created_at: Utc::now(),
            delivered_at: None,
            read_at: None,
        };
        let preview = last_message_snapshot(&message);
        self.store.append_message(&message, &preview).await?;

        self.router
            .to_user(
                sender_id,
                ServerEvent::MessageSent {
                    message: MessageView::new(&message, sender.clone()),
                },
            )
            .await;

        if self.router.is_online(receiver_id).await {
            let delivered_at = Utc::now();
            self.store.mark_delivered(&[message.id], delivered_at).await?;
            message.delivered_at = Some(delivered_at);

            self.router
                .to_user(
                    receiver_id,
                    ServerEvent::NewMessage {
                        message: MessageView::new(&message, sender.clone()),
                        notification: MessageNotification {
                            from: sender.clone(),
                            preview: preview.clone(),
                        },
                    },
                )
                .await;
            self.router
                .to_user(
                    sender_id,
                    ServerEvent::MessageDelivered {
                        chat_room_id: conversation.id,
                        message_ids: vec![message.id],
                        delivered_at,
                    },
                )
                .await;
        }
        // offline receiver: delivery is resolved by their catch-up sync

        self.push_summaries(conversation.id).await?;
        Ok(())
    }

    /// Author-only body replacement.
    pub async fn edit_message(
        &self,
        session_user: Uuid,
        conversation_id: Uuid,
        message_id: Uuid,
        body: &str,
    ) -> AppResult<()> {
        let mut message = self
            .store
            .get_message(conversation_id, message_id)
            .await?
            .ok_or(AppError::NotFound)?;
        if message.author_id != session_user {
            return Err(AppError::Unauthorized);
        }
        if message.state == MessageState::Deleted {
            return Err(AppError::BadRequest("message was deleted".into()));
        }
        let body =
            normalize_body(body).ok_or_else(|| AppError::BadRequest("message body required".into()))?;

        self.store.set_body_edited(message_id, &body).await?;
        message.body = Some(body);
        message.state = MessageState::Edited;

        let author = self
            .participant(message.author_id)
            .await?
            .ok_or(AppError::NotFound)?;
        self.router
            .to_room(
                conversation_id,
                None,
                &ServerEvent::MessageEdited {
                    chat_room_id: conversation_id,
                    message: MessageView::new(&message, author),
                },
            )
            .await;
        Ok(())
    }

    /// Author-only soft delete with best-effort attachment cleanup.
    pub async fn delete_message(
        &self,
        session_user: Uuid,
        conversation_id: Uuid,
        message_id: Uuid,
    ) -> AppResult<()> {
        let message = self
            .store
            .get_message(conversation_id, message_id)
            .await?
            .ok_or(AppError::NotFound)?;
        if message.author_id != session_user {
            return Err(AppError::Unauthorized);
        }
        if message.state == MessageState::Deleted {
            return Ok(());
        }

        self.store.set_deleted(message_id).await?;

        for attachment in &message.attachments {
            if let Err(err) = self.media.delete(attachment).await {
                warn!(key = %attachment.key, error = %err, "attachment cleanup failed");
            }
        }

        self.router
            .to_room(
                conversation_id,
                None,
                &ServerEvent::MessageDeleted {
                    chat_room_id: conversation_id,
                    message_id,
                },
            )
            .await;
        Ok(())
    }

    /// Flip the peer's messages to read and tell them which ones flipped.
    pub async fn mark_read(
        &self,
        session_user: Uuid,
        conversation_id: Uuid,
        reader_id: Uuid,
    ) -> AppResult<()> {
        if reader_id != session_user {
            return Err(AppError::Unauthorized);
        }
        let conversation = self
            .store
            .get(conversation_id)
            .await?
            .ok_or(AppError::NotFound)?;
        let peer = conversation.peer_of(reader_id).ok_or(AppError::Forbidden)?;

        let read_ids = self
            .store
            .mark_read(conversation_id, reader_id, Utc::now())
            .await?;
        if !read_ids.is_empty() {
            self.router
                .to_user(
                    peer,
                    ServerEvent::MessagesRead {
                        chat_room_id: conversation_id,
                        message_ids: read_ids,
                    },
                )
                .await;
        }
        self.push_summaries(conversation_id).await?;
        Ok(())
    }

    /// Delivery reconciliation at connect time: everything addressed to
    /// this user that was sent while they were offline is marked delivered
    /// now, and each author who is online right now hears about it.
    pub async fn run_catchup_sync(&self, user_id: Uuid) -> AppResult<()> {
        let pending = self.store.undelivered_for(user_id).await?;
        if pending.is_empty() {
            return Ok(());
        }

        let delivered_at = Utc::now();
        let ids: Vec<Uuid> = pending.iter().map(|m| m.id).collect();
        self.store.mark_delivered(&ids, delivered_at).await?;

        let mut by_author: HashMap<(Uuid, Uuid), Vec<Uuid>> = HashMap::new();
        for message in &pending {
            by_author
                .entry((message.conversation_id, message.author_id))
                .or_default()
                .push(message.id);
        }
        for ((conversation_id, author_id), message_ids) in by_author {
            if self.router.is_online(author_id).await {
                self.router
                    .to_user(
                        author_id,
                        ServerEvent::MessageDelivered {
                            chat_room_id: conversation_id,
                            message_ids,
                            delivered_at,
                        },
                    )
                    .await;
            }
        }
        Ok(())
    }

    async fn upload_all(&self, uploads: &[AttachmentUpload]) -> AppResult<Vec<AttachmentRef>> {
        if uploads.is_empty() {
            return Ok(Vec::new());
        }
        let media = Arc::clone(&self.media);
        let upload_futures = uploads.iter().enumerate().map(
            |(index, upload)| -> std::pin::Pin<
                Box<dyn std::future::Future<Output = AppResult<(usize, AttachmentRef)>> + Send>,
            > { Box::pin(upload_one(Arc::clone(&media), index, upload)) },
        );
        let mut uploaded: Vec<(usize, AttachmentRef)> = stream::iter(upload_futures)
            .buffer_unordered(UPLOAD_CONCURRENCY)
            .try_collect()
            .await?;
        uploaded.sort_by_key(|(index, _)| *index);
        Ok(uploaded
            .into_iter()
            .map(|(_, attachment)| attachment)
            .collect())
    }

    async fn participant(&self, user_id: Uuid) -> AppResult<Option<Participant>> {
        Ok(self
            .directory
            .resolve(user_id)
            .await?
            .map(|profile| profile.into_participant()))
    }

    /// Refresh both participants' list views.
    async fn push_summaries(&self, conversation_id: Uuid) -> AppResult<()> {
        let conversation = match self.store.get(conversation_id).await? {
            Some(conversation) => conversation,
            None => return Ok(()),
        };

        let mut participants = Vec::with_capacity(2);
        for user_id in [conversation.user_low, conversation.user_high] {
            if let Some(participant) = self.participant(user_id).await? {
                participants.push(participant);
            }
        }
        let summary = crate::models::ConversationSummary {
            id: conversation.id,
            participants,
            last_message: conversation.last_message.clone(),
            last_message_at: conversation.last_message_at,
            unread_count: conversation.unread_count,
        };

        for user_id in [conversation.user_low, conversation.user_high] {
            self.router
                .to_user(
                    user_id,
                    ServerEvent::ChatRoomUpdated {
                        chat_room: summary.clone(),
                    },
                )
                .await;
        }
        Ok(())
    }
}

/// Upload a single attachment, tagging the result with its original index so
/// the caller can restore order after concurrent, out-of-order completion.
async fn upload_one(
    media: Arc<dyn MediaStore>,
    index: usize,
    upload: &AttachmentUpload,
) -> AppResult<(usize, AttachmentRef)> {
    media
        .upload(upload)
        .await
        .map(|attachment| (index, attachment))
}
