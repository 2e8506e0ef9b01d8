//! Per-connection lifecycle: handshake, catch-up sync, the socket loop,
//! and the one cleanup routine every exit path funnels through.

use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::events::{ClientEvent, ServerEvent};
use super::handlers::WsParams;
use super::typing::TypingState;
use super::ConnectionHandle;
use crate::error::{AppError, AppResult};
use crate::services::directory::UserProfile;
use crate::services::pipeline::OutgoingMessage;
use crate::state::AppState;

const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(25);
const KEEPALIVE_TIMEOUT: Duration = Duration::from_secs(75);

pub async fn run(state: AppState, params: WsParams, mut socket: WebSocket) {
    let profile = match authenticate(&state, &params).await {
        Ok(profile) => profile,
        Err(err) => {
            debug!(error = %err, "handshake rejected");
            let reject = ServerEvent::Error {
                message: err.client_message(),
            };
            if let Ok(payload) = serde_json::to_string(&reject) {
                let _ = socket.send(Message::Text(payload)).await;
            }
            let _ = socket.send(Message::Close(None)).await;
            return;
        }
    };

    let user_id = profile.id;
    let conn_id = Uuid::new_v4();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let handle = ConnectionHandle::new(conn_id, tx);

    // Presence registration doubles as the personal channel: events routed
    // to this user land on the channel drained below.
    state.presence.register(user_id, handle.clone()).await;
    info!(%user_id, %conn_id, "connection established");

    let (mut sink, mut stream) = socket.split();
    if send_event(&mut sink, &ServerEvent::ConnectionSuccess { user_id })
        .await
        .is_err()
    {
        cleanup(&state, conn_id, user_id).await;
        return;
    }

    if let Err(err) = state.pipeline.run_catchup_sync(user_id).await {
        warn!(%user_id, error = %err, "catch-up sync failed");
        handle.send(ServerEvent::Error {
            message: err.client_message(),
        });
    }

    state.router.broadcast_presence().await;

    let mut keepalive = tokio::time::interval(KEEPALIVE_INTERVAL);
    keepalive.tick().await; // the first tick completes immediately
    let mut last_heard = Instant::now();

    loop {
        tokio::select! {
            queued = rx.recv() => match queued {
                Some(event) => {
                    if send_event(&mut sink, &event).await.is_err() {
                        break;
                    }
                }
                None => break,
            },
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    last_heard = Instant::now();
                    dispatch(&state, conn_id, user_id, &handle, &text).await;
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => {
                    last_heard = Instant::now();
                }
                Some(Ok(Message::Binary(_))) => {}
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(err)) => {
                    debug!(%conn_id, error = %err, "socket error");
                    break;
                }
            },
            _ = keepalive.tick() => {
                if last_heard.elapsed() > KEEPALIVE_TIMEOUT {
                    debug!(%conn_id, "keepalive missed, dropping connection");
                    break;
                }
                if sink.send(Message::Ping(Vec::new())).await.is_err() {
                    break;
                }
            }
        }
    }

    cleanup(&state, conn_id, user_id).await;
    info!(%user_id, %conn_id, "connection closed");
}

fn authenticate<'a>(
    state: &'a AppState,
    params: &'a WsParams,
) -> impl std::future::Future<Output = AppResult<UserProfile>> + Send + 'a {
    async move {
        let raw = params
            .user_id
            .as_deref()
            .ok_or_else(|| AppError::BadRequest("user_id is required".into()))?;
        let user_id = Uuid::parse_str(raw)
            .map_err(|_| AppError::BadRequest("user_id is malformed".into()))?;

        match state.directory.resolve(user_id).await? {
            Some(profile) if profile.verified => Ok(profile),
            _ => Err(AppError::Unauthorized),
        }
    }
}

async fn send_event(
    sink: &mut SplitSink<WebSocket, Message>,
    event: &ServerEvent,
) -> Result<(), axum::Error> {
    let payload = serde_json::to_string(event).map_err(axum::Error::new)?;
    sink.send(Message::Text(payload)).await
}

/// Parse and handle one inbound frame. Failures of any kind are answered
/// with an `error` event on this connection; they never end the session.
pub fn dispatch<'a>(
    state: &'a AppState,
    conn_id: Uuid,
    session_user: Uuid,
    handle: &'a ConnectionHandle,
    text: &'a str,
) -> impl std::future::Future<Output = ()> + Send + 'a {
    async move {
        let event = match serde_json::from_str::<ClientEvent>(text) {
            Ok(event) => event,
            Err(err) => {
                debug!(%conn_id, error = %err, "unparseable client event");
                handle.send(ServerEvent::Error {
                    message: "bad request: malformed event".into(),
                });
                return;
            }
        };

        if let Err(err) = handle_event(state, conn_id, session_user, handle, event).await {
            warn!(%conn_id, %session_user, error = %err, "event handling failed");
            handle.send(ServerEvent::Error {
                message: err.client_message(),
            });
        }
    }
}

fn handle_event<'a>(
    state: &'a AppState,
    conn_id: Uuid,
    session_user: Uuid,
    handle: &'a ConnectionHandle,
    event: ClientEvent,
) -> impl std::future::Future<Output = AppResult<()>> + Send + 'a {
    async move {
    match event {
        ClientEvent::SendMessage {
            sender_id,
            receiver_id,
            message,
            images,
            location,
            reply_to,
            product_reference,
        } => {
            state
                .pipeline
                .send_message(
                    session_user,
                    OutgoingMessage {
                        sender_id,
                        receiver_id,
                        text: message,
                        attachments: images.unwrap_or_default(),
                        location,
                        reply_to,
                        listing: product_reference,
                    },
                )
                .await
        }
        ClientEvent::EditMessage {
            chat_room_id,
            message_id,
            message,
        } => {
            state
                .pipeline
                .edit_message(session_user, chat_room_id, message_id, &message)
                .await
        }
        ClientEvent::DeleteMessage {
            chat_room_id,
            message_id,
        } => {
            state
                .pipeline
                .delete_message(session_user, chat_room_id, message_id)
                .await
        }
        ClientEvent::MarkMessagesRead {
            chat_room_id,
            user_id,
        } => {
            state
                .pipeline
                .mark_read(session_user, chat_room_id, user_id)
                .await
        }
        ClientEvent::TypingStart {
            chat_room_id,
            user_id,
        } => typing_update(state, conn_id, session_user, chat_room_id, user_id, true).await,
        ClientEvent::TypingStop {
            chat_room_id,
            user_id,
        } => typing_update(state, conn_id, session_user, chat_room_id, user_id, false).await,
        ClientEvent::JoinChatRoom { chat_room_id } => {
            join_room(state, session_user, handle, chat_room_id).await
        }
        ClientEvent::LeaveChatRoom { chat_room_id } => {
            state.rooms.leave(chat_room_id, conn_id).await;
            Ok(())
        }
    }
    }
}

fn typing_update<'a>(
    state: &'a AppState,
    conn_id: Uuid,
    session_user: Uuid,
    conversation_id: Uuid,
    user_id: Uuid,
    is_typing: bool,
) -> impl std::future::Future<Output = AppResult<()>> + Send + 'a {
    async move {
    if user_id != session_user {
        return Err(AppError::Unauthorized);
    }
    if conversation_id.is_nil() {
        return Err(AppError::BadRequest("chat room id is malformed".into()));
    }

    if is_typing {
        state
            .typing
            .start(
                conn_id,
                TypingState {
                    conversation_id,
                    user_id,
                },
            )
            .await;
        state
            .router
            .to_room(
                conversation_id,
                Some(conn_id),
                &ServerEvent::UserTyping {
                    chat_room_id: conversation_id,
                    user_id,
                    is_typing: true,
                },
            )
            .await;
    } else if let Some(previous) = state.typing.stop(conn_id).await {
        state
            .router
            .to_room(
                previous.conversation_id,
                Some(conn_id),
                &ServerEvent::UserTyping {
                    chat_room_id: previous.conversation_id,
                    user_id: previous.user_id,
                    is_typing: false,
                },
            )
            .await;
    }
    Ok(())
    }
}

fn join_room<'a>(
    state: &'a AppState,
    session_user: Uuid,
    handle: &'a ConnectionHandle,
    conversation_id: Uuid,
) -> impl std::future::Future<Output = AppResult<()>> + Send + 'a {
    async move {
    let conversation = state
        .store
        .get(conversation_id)
        .await?
        .ok_or(AppError::NotFound)?;
    if !conversation.is_participant(session_user) {
        return Err(AppError::Forbidden);
    }
    state
        .rooms
        .join(conversation_id, session_user, handle.clone())
        .await;
    Ok(())
    }
}

/// Deterministic teardown, shared by every exit path (client close, socket
/// error, missed keepalive). Safe to run more than once for the same
/// connection.
pub fn cleanup(
    state: &AppState,
    conn_id: Uuid,
    user_id: Uuid,
) -> impl std::future::Future<Output = ()> + Send + '_ {
    async move {
    if let Some(stale) = state.typing.stop(conn_id).await {
        state
            .router
            .to_room(
                stale.conversation_id,
                Some(conn_id),
                &ServerEvent::UserTyping {
                    chat_room_id: stale.conversation_id,
                    user_id: stale.user_id,
                    is_typing: false,
                },
            )
            .await;
    }
    state.rooms.leave_all(conn_id).await;
    state.presence.unregister(user_id, conn_id).await;
    state.router.broadcast_presence().await;
    }
}
