mod common;

use chat_service::error::AppError;
use chat_service::models::{MessageState, MessageView};
use chat_service::services::media::AttachmentUpload;
use chat_service::services::pipeline::OutgoingMessage;
use chat_service::websocket::events::ServerEvent;
use uuid::Uuid;

use common::{connect, test_env};

fn text_message(sender_id: Uuid, receiver_id: Uuid, text: &str) -> OutgoingMessage {
    OutgoingMessage {
        sender_id,
        receiver_id,
        text: Some(text.to_string()),
        attachments: vec![],
        location: None,
        reply_to: None,
        listing: None,
    }
}

fn image(name: &str) -> AttachmentUpload {
    AttachmentUpload {
        file_name: name.to_string(),
        content_type: Some("image/jpeg".to_string()),
        data: "aGVsbG8=".to_string(),
    }
}

fn sent_message(events: &[ServerEvent]) -> Option<MessageView> {
    events.iter().find_map(|event| match event {
        ServerEvent::MessageSent { message } => Some(message.clone()),
        _ => None,
    })
}

fn new_message(events: &[ServerEvent]) -> Option<MessageView> {
    events.iter().find_map(|event| match event {
        ServerEvent::NewMessage { message, .. } => Some(message.clone()),
        _ => None,
    })
}

#[tokio::test]
async fn both_directions_resolve_to_the_same_conversation() {
    let env = test_env();
    let a = env.directory.add_verified("alice");
    let b = env.directory.add_verified("bob");
    let mut ca = connect(&env.state, a).await;
    let mut cb = connect(&env.state, b).await;

    env.state
        .pipeline
        .send_message(a, text_message(a, b, "hi"))
        .await
        .unwrap();
    env.state
        .pipeline
        .send_message(b, text_message(b, a, "hello back"))
        .await
        .unwrap();

    assert_eq!(env.store.conversation_count().await, 1);

    let first = sent_message(&ca.events()).unwrap();
    let second = sent_message(&cb.events()).unwrap();
    assert_eq!(first.chat_room_id, second.chat_room_id);
}

#[tokio::test]
async fn sender_identity_mismatch_is_rejected_with_no_side_effects() {
    let env = test_env();
    let a = env.directory.add_verified("alice");
    let b = env.directory.add_verified("bob");
    let _ca = connect(&env.state, a).await;

    let mut forged = text_message(b, a, "spoofed");
    forged.attachments = vec![image("a.jpg")];
    let result = env.state.pipeline.send_message(a, forged).await;

    assert!(matches!(result, Err(AppError::Unauthorized)));
    assert_eq!(env.store.message_count().await, 0);
    assert_eq!(env.media.upload_count(), 0);
}

#[tokio::test]
async fn attachment_limit_is_enforced_before_any_upload() {
    let env = test_env();
    let a = env.directory.add_verified("alice");
    let b = env.directory.add_verified("bob");
    let _ca = connect(&env.state, a).await;

    let mut message = text_message(a, b, "");
    message.text = None;
    message.attachments = (0..6).map(|i| image(&format!("{i}.jpg"))).collect();
    let result = env.state.pipeline.send_message(a, message).await;

    assert!(matches!(result, Err(AppError::BadRequest(_))));
    assert_eq!(env.media.upload_count(), 0);
    assert_eq!(env.store.message_count().await, 0);
}

#[tokio::test]
async fn failed_upload_aborts_the_whole_send() {
    let env = test_env();
    let a = env.directory.add_verified("alice");
    let b = env.directory.add_verified("bob");
    let _ca = connect(&env.state, a).await;

    env.media.set_fail_uploads(true);
    let mut message = text_message(a, b, "");
    message.text = None;
    message.attachments = vec![image("a.jpg"), image("b.jpg")];
    let result = env.state.pipeline.send_message(a, message).await;

    assert!(matches!(result, Err(AppError::Media(_))));
    assert_eq!(env.store.message_count().await, 0);
}

#[tokio::test]
async fn empty_sends_and_self_chat_are_rejected() {
    let env = test_env();
    let a = env.directory.add_verified("alice");
    let b = env.directory.add_verified("bob");
    let _ca = connect(&env.state, a).await;

    let mut empty = text_message(a, b, "   ");
    empty.attachments = vec![];
    let result = env.state.pipeline.send_message(a, empty).await;
    assert!(matches!(result, Err(AppError::BadRequest(_))));

    let result = env
        .state
        .pipeline
        .send_message(a, text_message(a, a, "note to self"))
        .await;
    assert!(matches!(result, Err(AppError::BadRequest(_))));

    let result = env
        .state
        .pipeline
        .send_message(a, text_message(a, Uuid::new_v4(), "anyone there?"))
        .await;
    assert!(matches!(result, Err(AppError::BadRequest(_))));

    assert_eq!(env.store.message_count().await, 0);
}

#[tokio::test]
async fn offline_receiver_is_delivered_by_catchup_sync() {
    let env = test_env();
    let a = env.directory.add_verified("alice");
    let b = env.directory.add_verified("bob");
    let mut ca = connect(&env.state, a).await;
    ca.drain();

    env.state
        .pipeline
        .send_message(a, text_message(a, b, "hello"))
        .await
        .unwrap();

    let events = ca.events();
    let sent = sent_message(&events).unwrap();
    assert!(sent.delivered_at.is_none());
    assert!(
        !events
            .iter()
            .any(|e| matches!(e, ServerEvent::MessageDelivered { .. })),
        "no delivery receipt while the receiver is offline"
    );

    // receiver comes online; connect runs the catch-up sync
    let _cb = connect(&env.state, b).await;

    let events = ca.events();
    let delivered = events
        .iter()
        .find_map(|event| match event {
            ServerEvent::MessageDelivered {
                message_ids,
                delivered_at,
                ..
            } => Some((message_ids.clone(), *delivered_at)),
            _ => None,
        })
        .expect("author is notified once the receiver connects");
    assert_eq!(delivered.0, vec![sent.id]);

    let stored = env
        .store
        .get_message(sent.chat_room_id, sent.id)
        .await
        .unwrap()
        .unwrap();
    let delivered_at = stored.delivered_at.expect("delivered after catch-up");
    assert!(delivered_at >= stored.created_at);
    assert_eq!(delivered_at, delivered.1);
}

#[tokio::test]
async fn online_receiver_gets_attachments_and_sender_gets_receipt() {
    let env = test_env();
    let a = env.directory.add_verified("alice");
    let b = env.directory.add_verified("bob");
    let mut ca = connect(&env.state, a).await;
    let mut cb = connect(&env.state, b).await;
    ca.drain();
    cb.drain();

    let mut message = text_message(a, b, "");
    message.text = None;
    message.attachments = vec![image("front.jpg"), image("back.jpg")];
    env.state.pipeline.send_message(a, message).await.unwrap();

    let received = new_message(&cb.events()).unwrap();
    assert_eq!(received.attachments.len(), 2);
    assert!(received.delivered_at.is_some());
    assert!(received.delivered_at.unwrap() >= received.created_at);

    let sender_events = ca.events();
    assert!(sender_events
        .iter()
        .any(|e| matches!(e, ServerEvent::MessageSent { .. })));
    assert!(sender_events
        .iter()
        .any(|e| matches!(e, ServerEvent::MessageDelivered { .. })));
    assert_eq!(env.media.upload_count(), 2);
}

#[tokio::test]
async fn summaries_refresh_both_list_views_after_a_send() {
    let env = test_env();
    let a = env.directory.add_verified("alice");
    let b = env.directory.add_verified("bob");
    let mut ca = connect(&env.state, a).await;
    let mut cb = connect(&env.state, b).await;
    ca.drain();
    cb.drain();

    env.state
        .pipeline
        .send_message(a, text_message(a, b, "is this still available?"))
        .await
        .unwrap();

    for client in [&mut ca, &mut cb] {
        let summary = client
            .events()
            .into_iter()
            .find_map(|event| match event {
                ServerEvent::ChatRoomUpdated { chat_room } => Some(chat_room),
                _ => None,
            })
            .expect("both participants get a refreshed summary");
        assert_eq!(
            summary.last_message.as_deref(),
            Some("is this still available?")
        );
        assert_eq!(summary.unread_count, 1);
        assert_eq!(summary.participants.len(), 2);
    }
}

#[tokio::test]
async fn edit_by_non_author_is_rejected_and_leaves_the_message_alone() {
    let env = test_env();
    let a = env.directory.add_verified("alice");
    let b = env.directory.add_verified("bob");
    let mut ca = connect(&env.state, a).await;
    let _cb = connect(&env.state, b).await;

    env.state
        .pipeline
        .send_message(a, text_message(a, b, "original"))
        .await
        .unwrap();
    let sent = sent_message(&ca.events()).unwrap();

    let result = env
        .state
        .pipeline
        .edit_message(b, sent.chat_room_id, sent.id, "tampered")
        .await;
    assert!(matches!(result, Err(AppError::Unauthorized)));

    let stored = env
        .store
        .get_message(sent.chat_room_id, sent.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.body.as_deref(), Some("original"));
    assert_eq!(stored.state, MessageState::Active);

    let result = env
        .state
        .pipeline
        .delete_message(b, sent.chat_room_id, sent.id)
        .await;
    assert!(matches!(result, Err(AppError::Unauthorized)));
    let stored = env
        .store
        .get_message(sent.chat_room_id, sent.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.state, MessageState::Active);
}

#[tokio::test]
async fn edit_reaches_every_connection_joined_to_the_room() {
    let env = test_env();
    let a = env.directory.add_verified("alice");
    let b = env.directory.add_verified("bob");
    let mut ca = connect(&env.state, a).await;
    let mut cb = connect(&env.state, b).await;

    env.state
        .pipeline
        .send_message(a, text_message(a, b, "first price"))
        .await
        .unwrap();
    let sent = sent_message(&ca.events()).unwrap();

    common::join_room(&env.state, &ca, sent.chat_room_id).await;
    common::join_room(&env.state, &cb, sent.chat_room_id).await;
    ca.drain();
    cb.drain();

    let before = env
        .store
        .get_message(sent.chat_room_id, sent.id)
        .await
        .unwrap()
        .unwrap();

    env.state
        .pipeline
        .edit_message(a, sent.chat_room_id, sent.id, "new price")
        .await
        .unwrap();

    for client in [&mut ca, &mut cb] {
        let edited = client
            .events()
            .into_iter()
            .find_map(|event| match event {
                ServerEvent::MessageEdited { message, .. } => Some(message),
                _ => None,
            })
            .expect("edit reaches both connections");
        assert_eq!(edited.state, MessageState::Edited);
        assert_eq!(edited.body.as_deref(), Some("new price"));
    }

    // timestamps are untouched by the edit
    let stored = env
        .store
        .get_message(sent.chat_room_id, sent.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.delivered_at, before.delivered_at);
    assert_eq!(stored.read_at, before.read_at);
    assert_eq!(stored.created_at, before.created_at);
}

#[tokio::test]
async fn delete_is_soft_and_cleans_attachments_best_effort() {
    let env = test_env();
    let a = env.directory.add_verified("alice");
    let b = env.directory.add_verified("bob");
    let mut ca = connect(&env.state, a).await;
    let _cb = connect(&env.state, b).await;

    let mut message = text_message(a, b, "");
    message.text = None;
    message.attachments = vec![image("photo.jpg")];
    env.state.pipeline.send_message(a, message).await.unwrap();
    let sent = sent_message(&ca.events()).unwrap();

    env.media.set_fail_deletes(true);
    env.state
        .pipeline
        .delete_message(a, sent.chat_room_id, sent.id)
        .await
        .expect("delete succeeds even when attachment cleanup fails");

    let stored = env
        .store
        .get_message(sent.chat_room_id, sent.id)
        .await
        .unwrap()
        .expect("row is retained");
    assert_eq!(stored.state, MessageState::Deleted);

    // deleting again is a no-op
    env.state
        .pipeline
        .delete_message(a, sent.chat_room_id, sent.id)
        .await
        .unwrap();

    env.media.set_fail_deletes(false);
    assert_eq!(env.media.deleted_keys().len(), 0);
}

#[tokio::test]
async fn read_receipts_flip_peer_messages_and_reset_unread() {
    let env = test_env();
    let a = env.directory.add_verified("alice");
    let b = env.directory.add_verified("bob");
    let mut ca = connect(&env.state, a).await;

    env.state
        .pipeline
        .send_message(a, text_message(a, b, "one"))
        .await
        .unwrap();
    env.state
        .pipeline
        .send_message(a, text_message(a, b, "two"))
        .await
        .unwrap();
    let sent = sent_message(&ca.events()).unwrap();
    let room = sent.chat_room_id;

    let _cb = connect(&env.state, b).await;
    ca.drain();

    env.state.pipeline.mark_read(b, room, b).await.unwrap();

    let read_ids = ca
        .events()
        .into_iter()
        .find_map(|event| match event {
            ServerEvent::MessagesRead {
                chat_room_id,
                message_ids,
            } => {
                assert_eq!(chat_room_id, room);
                Some(message_ids)
            }
            _ => None,
        })
        .expect("author hears which messages were read");
    assert_eq!(read_ids.len(), 2);

    let conversation = env.store.get(room).await.unwrap().unwrap();
    assert_eq!(conversation.unread_count, 0);

    for id in read_ids {
        let stored = env.store.get_message(room, id).await.unwrap().unwrap();
        let read_at = stored.read_at.expect("read after mark_read");
        assert!(read_at >= stored.delivered_at.unwrap());
    }

    // a reader outside the conversation is turned away
    let outsider = env.directory.add_verified("mallory");
    let result = env.state.pipeline.mark_read(outsider, room, outsider).await;
    assert!(matches!(result, Err(AppError::Forbidden)));

    // and nobody can mark reads on someone else's behalf
    let result = env.state.pipeline.mark_read(a, room, b).await;
    assert!(matches!(result, Err(AppError::Unauthorized)));
}
