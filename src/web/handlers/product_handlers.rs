use actix_web::{web, HttpResponse};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::{NewProduct, ProductUpdate};
use crate::state::AppState;
use crate::web::auth::Identity;

use super::ensure_store_manager;

// --- Request DTOs ---

#[derive(Deserialize, Debug)]
pub struct CreateProductRequest {
  pub name: String,
  pub price: Decimal,
  pub description: Option<String>,
  pub image_url: Option<String>,
  #[serde(default)]
  pub slot: i32,
  pub position: Option<i32>,
}

#[derive(Deserialize, Debug)]
pub struct UpdateProductRequest {
  pub name: Option<String>,
  pub price: Option<Decimal>,
  pub description: Option<String>,
  pub image_url: Option<String>,
  pub slot: Option<i32>,
  pub position: Option<i32>,
}

#[derive(Deserialize, Debug)]
pub struct StockQuery {
  /// Comma-separated product ids.
  pub ids: String,
}

// --- Handlers ---

#[instrument(
  name = "handler::add_product",
  skip(app_state, payload),
  fields(user_id = %identity.user_id, store_id = %path.as_ref())
)]
pub async fn add_product_handler(
  app_state: web::Data<AppState>,
  identity: Identity,
  path: web::Path<Uuid>,
  payload: web::Json<CreateProductRequest>,
) -> Result<HttpResponse, AppError> {
  let store_id = path.into_inner();
  let payload = payload.into_inner();

  let store = app_state
    .repo
    .store_by_id(store_id)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("store {}", store_id)))?;
  ensure_store_manager(&store, &identity, &app_state.admin)?;

  let name = payload.name.trim().to_string();
  if name.is_empty() {
    return Err(AppError::Validation("Name is required.".to_string()));
  }
  if payload.price < Decimal::ZERO {
    return Err(AppError::Validation("Price must not be negative.".to_string()));
  }
  if payload.slot < 0 {
    return Err(AppError::Validation("Stock must not be negative.".to_string()));
  }

  // Per-store cap, checked at creation time.
  let limit = app_state.config.max_products_per_store;
  let count = app_state.repo.count_products(store_id).await?;
  if count >= limit {
    return Err(AppError::Validation(format!("Product limit of {} reached.", limit)));
  }

  let product = app_state
    .repo
    .insert_product(NewProduct {
      store_id,
      name,
      price: payload.price,
      description: payload.description,
      image_url: payload.image_url,
      slot: payload.slot,
      position: payload.position.unwrap_or(count as i32),
    })
    .await?;

  info!(product_id = %product.id, "Product created.");
  Ok(HttpResponse::Created().json(json!({ "product": product })))
}

#[instrument(name = "handler::list_store_products", skip(app_state))]
pub async fn list_store_products_handler(
  app_state: web::Data<AppState>,
  path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
  let store_id = path.into_inner();
  let products = app_state.repo.list_products(store_id).await?;
  Ok(HttpResponse::Ok().json(json!({ "products": products })))
}

#[instrument(
  name = "handler::update_product",
  skip(app_state, payload),
  fields(user_id = %identity.user_id, product_id = %path.as_ref())
)]
pub async fn update_product_handler(
  app_state: web::Data<AppState>,
  identity: Identity,
  path: web::Path<Uuid>,
  payload: web::Json<UpdateProductRequest>,
) -> Result<HttpResponse, AppError> {
  let product_id = path.into_inner();
  let payload = payload.into_inner();

  let product = app_state
    .repo
    .product_by_id(product_id)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("product {}", product_id)))?;
  let store = app_state
    .repo
    .store_by_id(product.store_id)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("store {}", product.store_id)))?;
  ensure_store_manager(&store, &identity, &app_state.admin)?;

  if let Some(price) = payload.price {
    if price < Decimal::ZERO {
      return Err(AppError::Validation("Price must not be negative.".to_string()));
    }
  }
  if let Some(slot) = payload.slot {
    if slot < 0 {
      return Err(AppError::Validation("Stock must not be negative.".to_string()));
    }
  }
  let name = match payload.name {
    Some(name) => {
      let name = name.trim().to_string();
      if name.is_empty() {
        return Err(AppError::Validation("Name is required.".to_string()));
      }
      Some(name)
    }
    None => None,
  };

  let updated = app_state
    .repo
    .update_product(
      product_id,
      ProductUpdate {
        name,
        price: payload.price,
        description: payload.description,
        image_url: payload.image_url,
        slot: payload.slot,
        position: payload.position,
      },
    )
    .await?;

  info!(product_id = %product_id, "Product updated.");
  Ok(HttpResponse::Ok().json(json!({ "product": updated })))
}

#[instrument(
  name = "handler::delete_product",
  skip(app_state),
  fields(user_id = %identity.user_id, product_id = %path.as_ref())
)]
pub async fn delete_product_handler(
  app_state: web::Data<AppState>,
  identity: Identity,
  path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
  let product_id = path.into_inner();
  let product = app_state
    .repo
    .product_by_id(product_id)
    .await?
    .ok_or_else(|| AppError::Forbidden("No permission, or the check failed.".to_string()))?;
  let store = app_state
    .repo
    .store_by_id(product.store_id)
    .await?
    .ok_or_else(|| AppError::Forbidden("No permission, or the check failed.".to_string()))?;
  ensure_store_manager(&store, &identity, &app_state.admin)
    .map_err(|_| AppError::Forbidden("No permission, or the check failed.".to_string()))?;

  app_state.repo.delete_product(product_id).await?;
  info!(product_id = %product_id, "Product deleted.");
  Ok(HttpResponse::Ok().json(json!({ "success": true })))
}

/// Cart stock reconciliation: current `slot` for each requested id. A soft,
/// advisory read; the authoritative check stays inside checkout.
#[instrument(name = "handler::stock_levels", skip(app_state, query))]
pub async fn stock_levels_handler(
  app_state: web::Data<AppState>,
  query: web::Query<StockQuery>,
) -> Result<HttpResponse, AppError> {
  let ids = query
    .ids
    .split(',')
    .map(str::trim)
    .filter(|part| !part.is_empty())
    .map(|part| Uuid::parse_str(part).map_err(|_| AppError::Validation(format!("invalid product id '{}'", part))))
    .collect::<Result<Vec<Uuid>, AppError>>()?;

  let levels = app_state.repo.stock_levels(&ids).await?;
  Ok(HttpResponse::Ok().json(json!({ "levels": levels })))
}
