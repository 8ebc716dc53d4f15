use actix_web::{web, HttpResponse};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::store::generate_slug;
use crate::models::{NewStore, StoreUpdate};
use crate::state::AppState;
use crate::web::auth::Identity;

use super::ensure_store_manager;

// --- Request DTOs ---

#[derive(Deserialize, Debug)]
pub struct CreateStoreRequest {
  pub name: String,
  pub description: Option<String>,
  pub image_url: Option<String>,
  #[serde(default)]
  pub tags: Vec<String>,
  pub start_date: DateTime<Utc>,
  pub end_date: DateTime<Utc>,
}

#[derive(Deserialize, Debug)]
pub struct UpdateStoreRequest {
  pub name: String,
  pub description: Option<String>,
  pub image_url: Option<String>,
  pub tags: Option<Vec<String>>,
  pub start_date: Option<DateTime<Utc>>,
  pub end_date: Option<DateTime<Utc>>,
  pub contact_email: Option<String>,
  pub whatsapp: Option<String>,
  pub telegram: Option<String>,
  pub is_chat_enabled: Option<bool>,
}

#[derive(Deserialize, Debug)]
pub struct StoreSearchQuery {
  pub search: Option<String>,
}

// --- Handlers ---

#[instrument(name = "handler::create_store", skip(app_state, payload), fields(user_id = %identity.user_id))]
pub async fn create_store_handler(
  app_state: web::Data<AppState>,
  identity: Identity,
  payload: web::Json<CreateStoreRequest>,
) -> Result<HttpResponse, AppError> {
  let payload = payload.into_inner();
  let name = payload.name.trim().to_string();
  if name.is_empty() {
    return Err(AppError::Validation("Please fill in all required fields.".to_string()));
  }
  if payload.end_date < payload.start_date {
    return Err(AppError::Validation("end_date must not precede start_date.".to_string()));
  }

  let tags: Vec<String> = payload
    .tags
    .into_iter()
    .map(|tag| tag.trim().to_string())
    .filter(|tag| !tag.is_empty())
    .collect();

  let store = app_state
    .repo
    .insert_store(NewStore {
      user_id: identity.user_id,
      slug: generate_slug(&name),
      name,
      description: payload.description,
      image_url: payload.image_url,
      tags,
      start_date: payload.start_date,
      end_date: payload.end_date,
    })
    .await?;

  info!(store_id = %store.id, slug = %store.slug, "Store created.");
  Ok(HttpResponse::Created().json(json!({ "store": store })))
}

#[instrument(name = "handler::list_public_stores", skip(app_state, query))]
pub async fn list_public_stores_handler(
  app_state: web::Data<AppState>,
  query: web::Query<StoreSearchQuery>,
) -> Result<HttpResponse, AppError> {
  let stores = app_state
    .repo
    .list_public_stores(Utc::now(), query.search.as_deref())
    .await?;
  Ok(HttpResponse::Ok().json(json!({ "stores": stores })))
}

#[instrument(name = "handler::get_store_by_slug", skip(app_state, identity))]
pub async fn get_store_by_slug_handler(
  app_state: web::Data<AppState>,
  path: web::Path<String>,
  identity: Option<Identity>,
) -> Result<HttpResponse, AppError> {
  let slug = path.into_inner();
  let store = app_state
    .repo
    .store_by_slug(&slug)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("store '{}'", slug)))?;

  // Outside the visibility window the store only exists for its owner and
  // admins; everyone else gets the same 404 as a store that never was.
  if !store.is_visible_at(Utc::now()) {
    let can_preview = identity
      .as_ref()
      .map(|who| store.user_id == who.user_id || app_state.admin.is_admin(who))
      .unwrap_or(false);
    if !can_preview {
      return Err(AppError::NotFound(format!("store '{}'", slug)));
    }
  }

  let products = app_state.repo.list_products(store.id).await?;
  Ok(HttpResponse::Ok().json(json!({ "store": store, "products": products })))
}

#[instrument(name = "handler::update_store", skip(app_state, payload), fields(user_id = %identity.user_id))]
pub async fn update_store_handler(
  app_state: web::Data<AppState>,
  identity: Identity,
  path: web::Path<Uuid>,
  payload: web::Json<UpdateStoreRequest>,
) -> Result<HttpResponse, AppError> {
  let store_id = path.into_inner();
  let payload = payload.into_inner();
  if payload.name.trim().is_empty() {
    return Err(AppError::Validation("Name is required.".to_string()));
  }

  let store = app_state
    .repo
    .store_by_id(store_id)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("store {}", store_id)))?;
  ensure_store_manager(&store, &identity, &app_state.admin)?;

  let tags = payload.tags.map(|tags| {
    tags
      .into_iter()
      .map(|tag| tag.trim().to_string())
      .filter(|tag| !tag.is_empty())
      .collect()
  });

  let updated = app_state
    .repo
    .update_store(
      store_id,
      StoreUpdate {
        name: Some(payload.name.trim().to_string()),
        description: payload.description,
        image_url: payload.image_url,
        tags,
        start_date: payload.start_date,
        end_date: payload.end_date,
        contact_email: payload.contact_email,
        whatsapp: payload.whatsapp,
        telegram: payload.telegram,
        is_chat_enabled: payload.is_chat_enabled,
      },
    )
    .await?;

  info!(store_id = %store_id, "Store updated.");
  Ok(HttpResponse::Ok().json(json!({ "store": updated })))
}

#[instrument(name = "handler::delete_store", skip(app_state), fields(user_id = %identity.user_id))]
pub async fn delete_store_handler(
  app_state: web::Data<AppState>,
  identity: Identity,
  path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
  let store_id = path.into_inner();
  let store = app_state
    .repo
    .store_by_id(store_id)
    .await?
    .ok_or_else(|| AppError::Forbidden("You do not have permission to delete this store.".to_string()))?;
  ensure_store_manager(&store, &identity, &app_state.admin)
    .map_err(|_| AppError::Forbidden("You do not have permission to delete this store.".to_string()))?;

  app_state.repo.delete_store(store_id).await?;
  info!(store_id = %store_id, "Store deleted (products removed first).");
  Ok(HttpResponse::Ok().json(json!({ "success": true })))
}
