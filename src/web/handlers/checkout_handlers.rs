use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, instrument, warn};

use crate::errors::AppError;
use crate::models::CheckoutItem;
use crate::state::AppState;

// --- Request DTO ---

#[derive(Deserialize, Debug)]
pub struct CheckoutRequest {
  pub items: Vec<CheckoutItem>,
}

/// `POST /checkout`: turn the client's cart into one atomic batch stock
/// decrement.
///
/// All-or-nothing: any line with insufficient stock (or an unknown id)
/// rejects the whole batch and the caller's cart stays untouched for a
/// retry with adjusted quantities. Not idempotent; the client disables
/// its button while a call is in flight. No order record is written;
/// success is the decrement itself.
#[instrument(name = "handler::process_checkout", skip(app_state, payload), fields(lines = payload.items.len()))]
pub async fn process_checkout_handler(
  app_state: web::Data<AppState>,
  payload: web::Json<CheckoutRequest>,
) -> Result<HttpResponse, AppError> {
  let items = &payload.items;
  if items.is_empty() {
    return Err(AppError::Validation("Cart is empty.".to_string()));
  }
  if items.iter().any(|item| item.quantity < 1) {
    return Err(AppError::Validation("Quantities must be at least 1.".to_string()));
  }

  match app_state.repo.checkout(items).await {
    Ok(()) => {
      info!("Checkout succeeded; stock decremented for {} line(s).", items.len());
      Ok(HttpResponse::Ok().json(json!({ "success": true })))
    }
    Err(e @ AppError::InsufficientStock) => {
      warn!("Checkout rejected: insufficient stock somewhere in the batch.");
      Err(e)
    }
    Err(e) => Err(e),
  }
}
