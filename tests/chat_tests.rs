// tests/chat_tests.rs
mod common;

use std::pin::Pin;

use actix_web::body::MessageBody;
use actix_web::{test, web, App};
use serde_json::{json, Value};
use uuid::Uuid;

use popup_market::chat::{ChatEvent, FeedKey};
use popup_market::repo::MarketRepo;
use popup_market::web::routes::configure_app_routes;

use common::*;

/// Pull the next chunk off a streaming response body.
async fn next_sse_frame<B>(body: &mut B) -> String
where
  B: MessageBody + Unpin,
  B::Error: std::fmt::Debug,
{
  let chunk = futures_util::future::poll_fn(|cx| Pin::new(&mut *body).poll_next(cx))
    .await
    .expect("event stream ended")
    .expect("event stream errored");
  String::from_utf8(chunk.to_vec()).expect("frame is utf-8")
}

fn parse_sse_frame(frame: &str) -> Value {
  assert!(frame.starts_with("data: "), "frame missing data prefix: {frame:?}");
  assert!(frame.ends_with("\n\n"), "frame missing terminator: {frame:?}");
  serde_json::from_str(frame.trim_start_matches("data: ").trim_end()).expect("frame payload is JSON")
}

#[actix_web::test]
async fn first_message_creates_the_conversation_and_later_ones_reuse_it() {
  let state = test_state();
  let owner = Uuid::new_v4();
  let customer = Uuid::new_v4();
  let store = seed_store(&state, owner).await;

  let app = test::init_service(
    App::new()
      .app_data(web::Data::new(state.clone()))
      .configure(configure_app_routes),
  )
  .await;

  let mut req = test::TestRequest::post()
    .uri("/api/v1/chat/messages")
    .set_json(json!({"store_id": store.id, "content": "Hello! Is the vase still available?"}));
  for (name, value) in auth_headers(customer, "customer@popup.test") {
    req = req.insert_header((name, value));
  }
  let body: Value = test::read_body_json(test::call_service(&app, req.to_request()).await).await;
  assert_eq!(body["success"], json!(true));
  let first_conversation = body["conversation_id"].as_str().unwrap().to_string();

  let conversation = state
    .repo
    .conversation_by_id(first_conversation.parse().unwrap())
    .await
    .unwrap()
    .unwrap();
  let first_bump = conversation.last_message_at;

  // Second message reuses the same conversation and bumps the timestamp.
  let mut req = test::TestRequest::post()
    .uri("/api/v1/chat/messages")
    .set_json(json!({"store_id": store.id, "content": "Second message"}));
  for (name, value) in auth_headers(customer, "customer@popup.test") {
    req = req.insert_header((name, value));
  }
  let body: Value = test::read_body_json(test::call_service(&app, req.to_request()).await).await;
  assert_eq!(body["conversation_id"].as_str().unwrap(), first_conversation);

  let conversation = state
    .repo
    .conversation_by_id(first_conversation.parse().unwrap())
    .await
    .unwrap()
    .unwrap();
  assert!(conversation.last_message_at >= first_bump);
  assert_eq!(state.repo.list_messages(conversation.id).await.unwrap().len(), 2);
}

#[tokio::test]
async fn concurrent_first_contact_resolves_to_a_single_conversation() {
  setup_tracing();
  let state = test_state();
  let store = seed_store(&state, Uuid::new_v4()).await;
  let customer = Uuid::new_v4();

  let a = {
    let repo = state.repo.clone();
    let store_id = store.id;
    tokio::spawn(async move { repo.resolve_conversation(store_id, customer).await })
  };
  let b = {
    let repo = state.repo.clone();
    let store_id = store.id;
    tokio::spawn(async move { repo.resolve_conversation(store_id, customer).await })
  };

  let first = a.await.unwrap().unwrap();
  let second = b.await.unwrap().unwrap();
  assert_eq!(first.id, second.id, "both tabs must land in the same conversation");
}

#[actix_web::test]
async fn blocked_conversation_refuses_sends_until_unblocked() {
  let state = test_state();
  let owner = Uuid::new_v4();
  let customer = Uuid::new_v4();
  let store = seed_store(&state, owner).await;
  let conversation = state.repo.resolve_conversation(store.id, customer).await.unwrap();
  state.repo.insert_message(conversation.id, customer, "hi").await.unwrap();

  let app = test::init_service(
    App::new()
      .app_data(web::Data::new(state.clone()))
      .configure(configure_app_routes),
  )
  .await;

  // Owner toggles block.
  let mut req = test::TestRequest::post().uri(&format!("/api/v1/chat/conversations/{}/block", conversation.id));
  for (name, value) in auth_headers(owner, "owner@popup.test") {
    req = req.insert_header((name, value));
  }
  let body: Value = test::read_body_json(test::call_service(&app, req.to_request()).await).await;
  assert_eq!(body["is_blocked"], json!(true));

  // Customer's send is refused and no message row is created.
  let mut req = test::TestRequest::post()
    .uri("/api/v1/chat/messages")
    .set_json(json!({"store_id": store.id, "content": "are you there?"}));
  for (name, value) in auth_headers(customer, "customer@popup.test") {
    req = req.insert_header((name, value));
  }
  let resp = test::call_service(&app, req.to_request()).await;
  assert_eq!(resp.status(), 409);
  assert_eq!(state.repo.list_messages(conversation.id).await.unwrap().len(), 1);

  // Unblock (the customer may toggle too) and sending works again.
  let mut req = test::TestRequest::post().uri(&format!("/api/v1/chat/conversations/{}/block", conversation.id));
  for (name, value) in auth_headers(customer, "customer@popup.test") {
    req = req.insert_header((name, value));
  }
  let body: Value = test::read_body_json(test::call_service(&app, req.to_request()).await).await;
  assert_eq!(body["is_blocked"], json!(false));

  let mut req = test::TestRequest::post()
    .uri("/api/v1/chat/messages")
    .set_json(json!({"store_id": store.id, "content": "back again"}));
  for (name, value) in auth_headers(customer, "customer@popup.test") {
    req = req.insert_header((name, value));
  }
  assert!(test::call_service(&app, req.to_request()).await.status().is_success());
  assert_eq!(state.repo.list_messages(conversation.id).await.unwrap().len(), 2);
}

#[actix_web::test]
async fn admin_bypasses_the_block() {
  let state = test_state();
  let owner = Uuid::new_v4();
  let customer = Uuid::new_v4();
  let admin = Uuid::new_v4();
  let store = seed_store(&state, owner).await;
  let conversation = state.repo.resolve_conversation(store.id, customer).await.unwrap();
  state.repo.set_conversation_blocked(conversation.id, true).await.unwrap();

  let app = test::init_service(
    App::new()
      .app_data(web::Data::new(state.clone()))
      .configure(configure_app_routes),
  )
  .await;

  let mut req = test::TestRequest::post()
    .uri("/api/v1/chat/messages")
    .set_json(json!({"store_id": store.id, "content": "moderation notice", "conversation_id": conversation.id}));
  for (name, value) in auth_headers(admin, ADMIN_EMAIL) {
    req = req.insert_header((name, value));
  }
  let resp = test::call_service(&app, req.to_request()).await;
  assert!(resp.status().is_success());
  assert_eq!(state.repo.list_messages(conversation.id).await.unwrap().len(), 1);
}

#[actix_web::test]
async fn mark_read_zeroes_the_unread_count_without_touching_later_messages() {
  let state = test_state();
  let owner = Uuid::new_v4();
  let customer = Uuid::new_v4();
  let store = seed_store(&state, owner).await;
  let conversation = state.repo.resolve_conversation(store.id, customer).await.unwrap();
  state.repo.insert_message(conversation.id, customer, "one").await.unwrap();
  state.repo.insert_message(conversation.id, customer, "two").await.unwrap();
  state.repo.insert_message(conversation.id, owner, "reply").await.unwrap();

  let app = test::init_service(
    App::new()
      .app_data(web::Data::new(state.clone()))
      .configure(configure_app_routes),
  )
  .await;

  // Owner's inbox sees two unread customer messages.
  let mut req = test::TestRequest::get().uri(&format!("/api/v1/chat/stores/{}/conversations", store.id));
  for (name, value) in auth_headers(owner, "owner@popup.test") {
    req = req.insert_header((name, value));
  }
  let body: Value = test::read_body_json(test::call_service(&app, req.to_request()).await).await;
  assert_eq!(body["conversations"][0]["unread_count"], json!(2));
  assert_eq!(body["conversations"][0]["preview"], json!("reply"));

  // Owner opens the conversation: only the customer's messages flip.
  let mut req = test::TestRequest::post().uri(&format!("/api/v1/chat/conversations/{}/read", conversation.id));
  for (name, value) in auth_headers(owner, "owner@popup.test") {
    req = req.insert_header((name, value));
  }
  let body: Value = test::read_body_json(test::call_service(&app, req.to_request()).await).await;
  assert_eq!(body["updated"], json!(2));

  let messages = state.repo.list_messages(conversation.id).await.unwrap();
  assert!(messages.iter().filter(|m| m.sender_id == customer).all(|m| m.is_read));
  // The owner's own message is not marked read by the owner's view.
  assert!(messages.iter().filter(|m| m.sender_id == owner).all(|m| !m.is_read));

  // A message arriving afterwards is not retroactively read.
  state.repo.insert_message(conversation.id, customer, "three").await.unwrap();
  let mut req = test::TestRequest::get().uri(&format!("/api/v1/chat/stores/{}/conversations", store.id));
  for (name, value) in auth_headers(owner, "owner@popup.test") {
    req = req.insert_header((name, value));
  }
  let body: Value = test::read_body_json(test::call_service(&app, req.to_request()).await).await;
  assert_eq!(body["conversations"][0]["unread_count"], json!(1));
}

#[actix_web::test]
async fn strangers_cannot_read_or_block_someone_elses_conversation() {
  let state = test_state();
  let owner = Uuid::new_v4();
  let customer = Uuid::new_v4();
  let stranger = Uuid::new_v4();
  let store = seed_store(&state, owner).await;
  let conversation = state.repo.resolve_conversation(store.id, customer).await.unwrap();

  let app = test::init_service(
    App::new()
      .app_data(web::Data::new(state.clone()))
      .configure(configure_app_routes),
  )
  .await;

  let mut req = test::TestRequest::get().uri(&format!("/api/v1/chat/conversations/{}/messages", conversation.id));
  for (name, value) in auth_headers(stranger, "stranger@popup.test") {
    req = req.insert_header((name, value));
  }
  assert_eq!(test::call_service(&app, req.to_request()).await.status(), 403);

  let mut req = test::TestRequest::post().uri(&format!("/api/v1/chat/conversations/{}/block", conversation.id));
  for (name, value) in auth_headers(stranger, "stranger@popup.test") {
    req = req.insert_header((name, value));
  }
  assert_eq!(test::call_service(&app, req.to_request()).await.status(), 403);

  // The owner's inbox is also closed to strangers.
  let mut req = test::TestRequest::get().uri(&format!("/api/v1/chat/stores/{}/conversations", store.id));
  for (name, value) in auth_headers(stranger, "stranger@popup.test") {
    req = req.insert_header((name, value));
  }
  assert_eq!(test::call_service(&app, req.to_request()).await.status(), 403);
}

#[actix_web::test]
async fn sends_fan_out_over_the_feed_to_widget_and_inbox() {
  let state = test_state();
  let owner = Uuid::new_v4();
  let customer = Uuid::new_v4();
  let store = seed_store(&state, owner).await;
  let conversation = state.repo.resolve_conversation(store.id, customer).await.unwrap();

  let mut widget = state.chat_feed.subscribe(FeedKey::Conversation(conversation.id));
  let mut inbox = state.chat_feed.subscribe(FeedKey::Store(store.id));

  let app = test::init_service(
    App::new()
      .app_data(web::Data::new(state.clone()))
      .configure(configure_app_routes),
  )
  .await;

  let mut req = test::TestRequest::post()
    .uri("/api/v1/chat/messages")
    .set_json(json!({"store_id": store.id, "content": "ping"}));
  for (name, value) in auth_headers(customer, "customer@popup.test") {
    req = req.insert_header((name, value));
  }
  assert!(test::call_service(&app, req.to_request()).await.status().is_success());

  match widget.recv().await.unwrap() {
    ChatEvent::MessageInserted { message } => assert_eq!(message.content, "ping"),
    other => panic!("expected MessageInserted, got {:?}", other),
  }
  match inbox.recv().await.unwrap() {
    ChatEvent::MessageInserted { message } => assert_eq!(message.conversation_id, conversation.id),
    other => panic!("expected MessageInserted, got {:?}", other),
  }
  // The timestamp bump follows as a conversation update on both channels.
  assert!(matches!(widget.recv().await.unwrap(), ChatEvent::ConversationUpdated { .. }));
  assert!(matches!(inbox.recv().await.unwrap(), ChatEvent::ConversationUpdated { .. }));
}

#[actix_web::test]
async fn conversation_event_stream_delivers_framed_messages() {
  let state = test_state();
  let owner = Uuid::new_v4();
  let customer = Uuid::new_v4();
  let store = seed_store(&state, owner).await;
  let conversation = state.repo.resolve_conversation(store.id, customer).await.unwrap();

  let app = test::init_service(
    App::new()
      .app_data(web::Data::new(state.clone()))
      .configure(configure_app_routes),
  )
  .await;

  // Open the widget's stream before anything is sent.
  let mut req = test::TestRequest::get().uri(&format!("/api/v1/chat/conversations/{}/events", conversation.id));
  for (name, value) in auth_headers(customer, "customer@popup.test") {
    req = req.insert_header((name, value));
  }
  let resp = test::call_service(&app, req.to_request()).await;
  assert!(resp.status().is_success());
  assert_eq!(resp.headers().get("content-type").unwrap(), "text/event-stream");
  let mut body = resp.into_body();

  let mut req = test::TestRequest::post()
    .uri("/api/v1/chat/messages")
    .set_json(json!({"store_id": store.id, "content": "ping"}));
  for (name, value) in auth_headers(customer, "customer@popup.test") {
    req = req.insert_header((name, value));
  }
  assert!(test::call_service(&app, req.to_request()).await.status().is_success());

  let event = parse_sse_frame(&next_sse_frame(&mut body).await);
  assert_eq!(event["type"], json!("message_inserted"));
  assert_eq!(event["message"]["content"], json!("ping"));
  assert_eq!(event["message"]["conversation_id"], json!(conversation.id));

  // The timestamp bump follows on the same stream.
  let event = parse_sse_frame(&next_sse_frame(&mut body).await);
  assert_eq!(event["type"], json!("conversation_updated"));
  assert_eq!(event["conversation"]["id"], json!(conversation.id));
}

#[actix_web::test]
async fn store_event_stream_is_gated_to_the_owner() {
  let state = test_state();
  let owner = Uuid::new_v4();
  let customer = Uuid::new_v4();
  let store = seed_store(&state, owner).await;
  state.repo.resolve_conversation(store.id, customer).await.unwrap();
  let uri = format!("/api/v1/chat/stores/{}/events", store.id);

  let app = test::init_service(
    App::new()
      .app_data(web::Data::new(state.clone()))
      .configure(configure_app_routes),
  )
  .await;

  // The inbox stream is not for customers or strangers.
  let mut req = test::TestRequest::get().uri(&uri);
  for (name, value) in auth_headers(customer, "customer@popup.test") {
    req = req.insert_header((name, value));
  }
  assert_eq!(test::call_service(&app, req.to_request()).await.status(), 403);

  let mut req = test::TestRequest::get().uri(&uri);
  for (name, value) in auth_headers(owner, "owner@popup.test") {
    req = req.insert_header((name, value));
  }
  let resp = test::call_service(&app, req.to_request()).await;
  assert!(resp.status().is_success());
  let mut body = resp.into_body();

  let mut req = test::TestRequest::post()
    .uri("/api/v1/chat/messages")
    .set_json(json!({"store_id": store.id, "content": "anyone there?"}));
  for (name, value) in auth_headers(customer, "customer@popup.test") {
    req = req.insert_header((name, value));
  }
  assert!(test::call_service(&app, req.to_request()).await.status().is_success());

  let event = parse_sse_frame(&next_sse_frame(&mut body).await);
  assert_eq!(event["type"], json!("message_inserted"));
  assert_eq!(event["message"]["content"], json!("anyone there?"));
}

#[actix_web::test]
async fn participants_can_delete_the_conversation_and_its_messages() {
  let state = test_state();
  let owner = Uuid::new_v4();
  let customer = Uuid::new_v4();
  let store = seed_store(&state, owner).await;
  let conversation = state.repo.resolve_conversation(store.id, customer).await.unwrap();
  state.repo.insert_message(conversation.id, customer, "hi").await.unwrap();

  let app = test::init_service(
    App::new()
      .app_data(web::Data::new(state.clone()))
      .configure(configure_app_routes),
  )
  .await;

  let mut req = test::TestRequest::delete().uri(&format!("/api/v1/chat/conversations/{}", conversation.id));
  for (name, value) in auth_headers(customer, "customer@popup.test") {
    req = req.insert_header((name, value));
  }
  assert!(test::call_service(&app, req.to_request()).await.status().is_success());

  assert!(state.repo.conversation_by_id(conversation.id).await.unwrap().is_none());
  assert!(state.repo.list_messages(conversation.id).await.unwrap().is_empty());
}
