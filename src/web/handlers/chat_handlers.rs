use std::convert::Infallible;

use actix_web::{web, HttpResponse};
use futures_util::StreamExt;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::chat::{ChatEvent, FeedKey};
use crate::errors::AppError;
use crate::models::{Conversation, Store};
use crate::state::AppState;
use crate::web::auth::Identity;

use super::ensure_store_manager;

// --- Request DTOs ---

#[derive(Deserialize, Debug)]
pub struct SendMessageRequest {
  pub store_id: Uuid,
  pub content: String,
  /// Present when replying into a known conversation (the owner's inbox);
  /// absent for the customer widget, which resolves by (store, caller).
  pub conversation_id: Option<Uuid>,
}

// --- Helpers ---

async fn conversation_with_store(app_state: &AppState, conversation_id: Uuid) -> Result<(Conversation, Store), AppError> {
  let conversation = app_state
    .repo
    .conversation_by_id(conversation_id)
    .await?
    .ok_or_else(|| AppError::NotFound("Chat not found".to_string()))?;
  let store = app_state
    .repo
    .store_by_id(conversation.store_id)
    .await?
    .ok_or_else(|| AppError::NotFound("Store not found".to_string()))?;
  Ok((conversation, store))
}

fn ensure_participant(conversation: &Conversation, store: &Store, identity: &Identity, app_state: &AppState) -> Result<(), AppError> {
  if conversation.is_participant(identity.user_id, store.user_id) || app_state.admin.is_admin(identity) {
    Ok(())
  } else {
    Err(AppError::Forbidden("You do not have permission.".to_string()))
  }
}

fn sse_response(rx: broadcast::Receiver<ChatEvent>) -> HttpResponse {
  let stream = BroadcastStream::new(rx).filter_map(|event| async move {
    match event {
      Ok(event) => serde_json::to_string(&event)
        .ok()
        .map(|json| Ok::<web::Bytes, Infallible>(web::Bytes::from(format!("data: {}\n\n", json)))),
      // A lagged subscriber just misses events; clients reconcile by id.
      Err(BroadcastStreamRecvError::Lagged(skipped)) => {
        warn!(skipped, "Chat feed subscriber lagged.");
        None
      }
    }
  });
  HttpResponse::Ok()
    .content_type("text/event-stream")
    .insert_header(("Cache-Control", "no-cache"))
    .streaming(stream)
}

// --- Handlers ---

/// Send a message: resolve (or create) the conversation, refuse if blocked,
/// insert, bump `last_message_at`, fan out over the feed.
#[instrument(
  name = "handler::send_message",
  skip(app_state, payload),
  fields(user_id = %identity.user_id, store_id = %payload.store_id)
)]
pub async fn send_message_handler(
  app_state: web::Data<AppState>,
  identity: Identity,
  payload: web::Json<SendMessageRequest>,
) -> Result<HttpResponse, AppError> {
  let payload = payload.into_inner();
  let content = payload.content.trim();
  if content.is_empty() {
    return Err(AppError::Validation("Message must not be empty.".to_string()));
  }

  let is_admin = app_state.admin.is_admin(&identity);

  let conversation = match payload.conversation_id {
    // Reply into a specific conversation; the sender must belong to it.
    Some(conversation_id) => {
      let (conversation, store) = conversation_with_store(&app_state, conversation_id).await?;
      ensure_participant(&conversation, &store, &identity, &app_state)?;
      conversation
    }
    // Customer path: find or lazily create the one conversation for this
    // (store, customer) pair.
    None => {
      app_state
        .repo
        .store_by_id(payload.store_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Store not found".to_string()))?;
      app_state
        .repo
        .resolve_conversation(payload.store_id, identity.user_id)
        .await?
    }
  };

  if conversation.is_blocked && !is_admin {
    return Err(AppError::ChatBlocked);
  }

  let message = app_state
    .repo
    .insert_message(conversation.id, identity.user_id, content)
    .await?;
  // Re-read for the bumped last_message_at before fanning out.
  let conversation = app_state
    .repo
    .conversation_by_id(conversation.id)
    .await?
    .ok_or_else(|| AppError::Internal("conversation vanished after send".to_string()))?;

  app_state.chat_feed.publish_message(conversation.store_id, &message);
  app_state.chat_feed.publish_conversation(&conversation);

  info!(conversation_id = %conversation.id, message_id = %message.id, "Message sent.");
  Ok(HttpResponse::Ok().json(json!({
      "success": true,
      "conversation_id": conversation.id,
      "message": message
  })))
}

/// The caller's own conversation with a store, if they already started one.
#[instrument(name = "handler::get_conversation", skip(app_state), fields(user_id = %identity.user_id))]
pub async fn get_conversation_handler(
  app_state: web::Data<AppState>,
  identity: Identity,
  path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
  let store_id = path.into_inner();
  let conversation = app_state
    .repo
    .conversation_for_customer(store_id, identity.user_id)
    .await?;
  Ok(HttpResponse::Ok().json(json!({ "conversation": conversation })))
}

/// The owner's inbox for a store: conversations with unread counts and
/// previews, newest activity first.
#[instrument(name = "handler::list_conversations", skip(app_state), fields(user_id = %identity.user_id))]
pub async fn list_conversations_handler(
  app_state: web::Data<AppState>,
  identity: Identity,
  path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
  let store_id = path.into_inner();
  let store = app_state
    .repo
    .store_by_id(store_id)
    .await?
    .ok_or_else(|| AppError::NotFound("Store not found".to_string()))?;
  ensure_store_manager(&store, &identity, &app_state.admin)?;

  let conversations = app_state.repo.list_conversations(store_id).await?;
  Ok(HttpResponse::Ok().json(json!({ "conversations": conversations })))
}

#[instrument(name = "handler::list_messages", skip(app_state), fields(user_id = %identity.user_id))]
pub async fn list_messages_handler(
  app_state: web::Data<AppState>,
  identity: Identity,
  path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
  let conversation_id = path.into_inner();
  let (conversation, store) = conversation_with_store(&app_state, conversation_id).await?;
  ensure_participant(&conversation, &store, &identity, &app_state)?;

  let messages = app_state.repo.list_messages(conversation_id).await?;
  Ok(HttpResponse::Ok().json(json!({ "messages": messages })))
}

/// Mark everything the other party sent as read. Messages the reader sent
/// are untouched, and anything arriving after this call stays unread.
#[instrument(name = "handler::mark_read", skip(app_state), fields(user_id = %identity.user_id))]
pub async fn mark_read_handler(
  app_state: web::Data<AppState>,
  identity: Identity,
  path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
  let conversation_id = path.into_inner();
  let (conversation, store) = conversation_with_store(&app_state, conversation_id).await?;
  ensure_participant(&conversation, &store, &identity, &app_state)?;

  let updated = app_state.repo.mark_read(conversation_id, identity.user_id).await?;
  Ok(HttpResponse::Ok().json(json!({ "success": true, "updated": updated })))
}

/// Toggle the blocked flag. Either participant (or an admin) may flip it;
/// last write wins.
#[instrument(name = "handler::toggle_block", skip(app_state), fields(user_id = %identity.user_id))]
pub async fn toggle_block_handler(
  app_state: web::Data<AppState>,
  identity: Identity,
  path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
  let conversation_id = path.into_inner();
  let (conversation, store) = conversation_with_store(&app_state, conversation_id).await?;
  ensure_participant(&conversation, &store, &identity, &app_state)?;

  let updated = app_state
    .repo
    .set_conversation_blocked(conversation_id, !conversation.is_blocked)
    .await?;
  app_state.chat_feed.publish_conversation(&updated);

  info!(conversation_id = %conversation_id, is_blocked = updated.is_blocked, "Block toggled.");
  Ok(HttpResponse::Ok().json(json!({ "success": true, "is_blocked": updated.is_blocked })))
}

#[instrument(name = "handler::delete_conversation", skip(app_state), fields(user_id = %identity.user_id))]
pub async fn delete_conversation_handler(
  app_state: web::Data<AppState>,
  identity: Identity,
  path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
  let conversation_id = path.into_inner();
  let (conversation, store) = conversation_with_store(&app_state, conversation_id).await?;
  ensure_participant(&conversation, &store, &identity, &app_state)?;

  app_state.repo.delete_conversation(conversation_id).await?;
  info!(conversation_id = %conversation_id, "Conversation deleted.");
  Ok(HttpResponse::Ok().json(json!({ "success": true })))
}

/// SSE stream of events for one conversation (the customer widget).
#[instrument(name = "handler::conversation_events", skip(app_state), fields(user_id = %identity.user_id))]
pub async fn conversation_events_handler(
  app_state: web::Data<AppState>,
  identity: Identity,
  path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
  let conversation_id = path.into_inner();
  let (conversation, store) = conversation_with_store(&app_state, conversation_id).await?;
  ensure_participant(&conversation, &store, &identity, &app_state)?;

  let rx = app_state.chat_feed.subscribe(FeedKey::Conversation(conversation_id));
  Ok(sse_response(rx))
}

/// SSE stream of events across all of a store's conversations (the owner's
/// dashboard inbox).
#[instrument(name = "handler::store_events", skip(app_state), fields(user_id = %identity.user_id))]
pub async fn store_events_handler(
  app_state: web::Data<AppState>,
  identity: Identity,
  path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
  let store_id = path.into_inner();
  let store = app_state
    .repo
    .store_by_id(store_id)
    .await?
    .ok_or_else(|| AppError::NotFound("Store not found".to_string()))?;
  ensure_store_manager(&store, &identity, &app_state.admin)?;

  let rx = app_state.chat_feed.subscribe(FeedKey::Store(store_id));
  Ok(sse_response(rx))
}
