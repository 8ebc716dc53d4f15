//! The client-side cart.
//!
//! The cart never lives on the server: it sits in client-local persistent
//! storage (browser localStorage in the original UI) under a fixed key, and
//! only becomes a validated server request at checkout. Stock cached on
//! each line is advisory. It drives "only N left" hints and blocks the
//! increase button, while the authoritative check is always the atomic
//! decrement behind `POST /checkout`. Every mutation is announced on a
//! broadcast bus so the surfaces that render the cart (navbar badge,
//! slide-out panel, cart page) stay decoupled from whoever mutated it.

use std::collections::HashMap;

use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::models::{CheckoutItem, Product, StockLevel};

/// Fixed storage key, shared with the original web client.
pub const CART_STORAGE_KEY: &str = "pop-up-market-cart";

const BUS_CAPACITY: usize = 16;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CartError {
  #[error("No stock left for {0}")]
  OutOfStock(String),
}

/// One cart line: the requested quantity plus a cached product snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartLine {
  pub id: Uuid,
  pub name: String,
  pub price: Decimal,
  pub image_url: Option<String>,
  pub description: Option<String>,
  /// Last-known stock. `None` when unknown; refreshed by [`Cart::reconcile`].
  pub slot: Option<i32>,
  pub quantity: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CartEvent {
  /// The cart's contents changed; re-render badges and panels.
  Updated,
  /// Something asked the slide-out cart to open.
  OpenCart,
}

/// Client-local persistent key-value storage (localStorage stand-in).
pub trait CartStorage: Send + Sync {
  fn load(&self, key: &str) -> Option<String>;
  fn store(&self, key: &str, value: &str);
}

#[derive(Default)]
pub struct MemoryStorage {
  entries: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
  pub fn new() -> Self {
    Self::default()
  }
}

impl CartStorage for MemoryStorage {
  fn load(&self, key: &str) -> Option<String> {
    self.entries.lock().get(key).cloned()
  }

  fn store(&self, key: &str, value: &str) {
    self.entries.lock().insert(key.to_string(), value.to_string());
  }
}

/// The in-process pub/sub bus behind [`CartEvent`]s (the original wired
/// this up with custom DOM events).
pub struct CartBus {
  tx: broadcast::Sender<CartEvent>,
}

impl CartBus {
  pub fn new() -> Self {
    Self {
      tx: broadcast::channel(BUS_CAPACITY).0,
    }
  }

  pub fn subscribe(&self) -> broadcast::Receiver<CartEvent> {
    self.tx.subscribe()
  }

  fn emit(&self, event: CartEvent) {
    // Nobody listening is fine.
    let _ = self.tx.send(event);
  }
}

impl Default for CartBus {
  fn default() -> Self {
    Self::new()
  }
}

pub struct Cart<S: CartStorage> {
  storage: S,
  bus: CartBus,
}

impl<S: CartStorage> Cart<S> {
  pub fn new(storage: S) -> Self {
    Self {
      storage,
      bus: CartBus::new(),
    }
  }

  pub fn bus(&self) -> &CartBus {
    &self.bus
  }

  pub fn lines(&self) -> Vec<CartLine> {
    self
      .storage
      .load(CART_STORAGE_KEY)
      .and_then(|raw| serde_json::from_str(&raw).ok())
      .unwrap_or_default()
  }

  fn save(&self, lines: &[CartLine]) {
    match serde_json::to_string(lines) {
      Ok(raw) => {
        self.storage.store(CART_STORAGE_KEY, &raw);
        self.bus.emit(CartEvent::Updated);
      }
      Err(e) => tracing::error!(error = %e, "Failed to serialize cart"),
    }
  }

  /// Add one unit of `product`, or bump an existing line by one. Refuses
  /// to grow a line past the last-known stock.
  pub fn add(&self, product: &Product) -> Result<(), CartError> {
    let mut lines = self.lines();
    if let Some(line) = lines.iter_mut().find(|l| l.id == product.id) {
      // Sync the latest stock snapshot from the product card.
      line.slot = Some(product.slot);
      if line.quantity >= product.slot {
        return Err(CartError::OutOfStock(product.name.clone()));
      }
      line.quantity += 1;
    } else {
      if product.slot < 1 {
        return Err(CartError::OutOfStock(product.name.clone()));
      }
      lines.push(CartLine {
        id: product.id,
        name: product.name.clone(),
        price: product.price,
        image_url: product.image_url.clone(),
        description: product.description.clone(),
        slot: Some(product.slot),
        quantity: 1,
      });
    }
    self.save(&lines);
    Ok(())
  }

  /// Set a line's quantity, floored at 1. Removal is explicit.
  pub fn update_quantity(&self, product_id: Uuid, quantity: i32) {
    let mut lines = self.lines();
    if let Some(line) = lines.iter_mut().find(|l| l.id == product_id) {
      line.quantity = quantity.max(1);
      self.save(&lines);
    }
  }

  pub fn remove(&self, product_id: Uuid) {
    let lines: Vec<CartLine> = self.lines().into_iter().filter(|l| l.id != product_id).collect();
    self.save(&lines);
  }

  pub fn clear(&self) {
    self.save(&[]);
  }

  /// Overwrite each line's cached stock with fresh levels from the server,
  /// a soft, advisory check before checkout. Lines whose product no longer
  /// exists drop to a known stock of zero so the UI can warn before
  /// checkout fails.
  pub fn reconcile(&self, levels: &[StockLevel]) {
    let mut lines = self.lines();
    for line in lines.iter_mut() {
      line.slot = Some(levels.iter().find(|level| level.id == line.id).map_or(0, |l| l.slot));
    }
    self.save(&lines);
  }

  /// The cart as a checkout batch.
  pub fn checkout_items(&self) -> Vec<CheckoutItem> {
    self
      .lines()
      .iter()
      .map(|l| CheckoutItem {
        id: l.id,
        quantity: l.quantity,
      })
      .collect()
  }

  pub fn total(&self) -> Decimal {
    self
      .lines()
      .iter()
      .map(|l| l.price * Decimal::from(l.quantity))
      .sum()
  }

  /// Ask whichever surface hosts the slide-out cart to open it.
  pub fn open_cart(&self) {
    self.bus.emit(CartEvent::OpenCart);
  }
}
