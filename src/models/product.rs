use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Product {
  pub id: Uuid,
  pub store_id: Uuid,
  pub name: String,
  pub price: Decimal,
  pub description: Option<String>,
  pub image_url: Option<String>,
  /// Remaining sellable units. Never negative; only the checkout batch
  /// decrement mutates it outside of owner edits.
  pub slot: i32,
  pub position: i32,
  pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewProduct {
  pub store_id: Uuid,
  pub name: String,
  pub price: Decimal,
  pub description: Option<String>,
  pub image_url: Option<String>,
  pub slot: i32,
  pub position: i32,
}

#[derive(Debug, Clone, Default)]
pub struct ProductUpdate {
  pub name: Option<String>,
  pub price: Option<Decimal>,
  pub description: Option<String>,
  pub image_url: Option<String>,
  pub slot: Option<i32>,
  pub position: Option<i32>,
}

/// One line of a checkout batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutItem {
  pub id: Uuid,
  pub quantity: i32,
}

/// Current stock for one product, as served to cart reconciliation.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct StockLevel {
  pub id: Uuid,
  pub slot: i32,
}
