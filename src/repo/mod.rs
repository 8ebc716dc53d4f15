//! Repository abstraction over the relational store.
//!
//! Handlers never touch SQL (or the in-memory maps) directly; everything
//! goes through [`MarketRepo`]. The two operations with real invariants are
//! [`MarketRepo::checkout`] (the all-or-nothing, race-safe batch stock
//! decrement) and [`MarketRepo::resolve_conversation`] (insert-or-fetch
//! under the `(store_id, customer_id)` unique key).

pub mod mem;
pub mod pg;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::errors::Result;
use crate::models::store::generate_slug;
use crate::models::{
  CheckoutItem, Conversation, ConversationSummary, Message, NewProduct, NewStore, Product, ProductUpdate, StockLevel,
  Store, StoreUpdate,
};

pub use mem::MemRepo;
pub use pg::PgRepo;

#[async_trait]
pub trait MarketRepo: Send + Sync {
  // --- Stores ---
  async fn insert_store(&self, store: NewStore) -> Result<Store>;
  async fn store_by_id(&self, id: Uuid) -> Result<Option<Store>>;
  async fn store_by_slug(&self, slug: &str) -> Result<Option<Store>>;
  /// Stores whose visibility window covers `now`, ordered by `end_date`
  /// ascending (closing soonest first). `search` matches a name substring
  /// (case-insensitive) or an exact tag.
  async fn list_public_stores(&self, now: DateTime<Utc>, search: Option<&str>) -> Result<Vec<Store>>;
  async fn update_store(&self, id: Uuid, update: StoreUpdate) -> Result<Store>;
  /// Removes the store and its products.
  async fn delete_store(&self, id: Uuid) -> Result<()>;

  // --- Products ---
  async fn insert_product(&self, product: NewProduct) -> Result<Product>;
  async fn product_by_id(&self, id: Uuid) -> Result<Option<Product>>;
  async fn list_products(&self, store_id: Uuid) -> Result<Vec<Product>>;
  async fn count_products(&self, store_id: Uuid) -> Result<i64>;
  async fn update_product(&self, id: Uuid, update: ProductUpdate) -> Result<Product>;
  async fn delete_product(&self, id: Uuid) -> Result<()>;
  /// Current stock for the requested ids; unknown ids are simply absent.
  async fn stock_levels(&self, ids: &[Uuid]) -> Result<Vec<StockLevel>>;

  // --- Checkout ---
  /// Atomically decrement stock for every line of the batch.
  ///
  /// All-or-nothing: if any line requests more than the product's current
  /// stock (or names an unknown product), the whole batch fails with
  /// [`crate::errors::AppError::InsufficientStock`] and no stock changes.
  /// Two concurrent batches racing on the same product cannot both win
  /// the last unit. Not idempotent: callers submit once per user action.
  async fn checkout(&self, items: &[CheckoutItem]) -> Result<()>;

  // --- Conversations ---
  /// The existing conversation for the pair, or a freshly created one.
  /// Safe under concurrent first messages from the same customer.
  async fn resolve_conversation(&self, store_id: Uuid, customer_id: Uuid) -> Result<Conversation>;
  async fn conversation_by_id(&self, id: Uuid) -> Result<Option<Conversation>>;
  async fn conversation_for_customer(&self, store_id: Uuid, customer_id: Uuid) -> Result<Option<Conversation>>;
  /// Inbox rows for a store, newest activity first.
  async fn list_conversations(&self, store_id: Uuid) -> Result<Vec<ConversationSummary>>;
  async fn set_conversation_blocked(&self, id: Uuid, blocked: bool) -> Result<Conversation>;
  /// Removes the conversation and its messages.
  async fn delete_conversation(&self, id: Uuid) -> Result<()>;

  // --- Messages ---
  /// Inserts the message and bumps the conversation's `last_message_at`.
  /// The blocked check happens at the handler, where the sender's admin
  /// status is known.
  async fn insert_message(&self, conversation_id: Uuid, sender_id: Uuid, content: &str) -> Result<Message>;
  async fn list_messages(&self, conversation_id: Uuid) -> Result<Vec<Message>>;
  /// Marks every unread message *not* sent by `reader_id` as read.
  /// Returns the number of messages updated.
  async fn mark_read(&self, conversation_id: Uuid, reader_id: Uuid) -> Result<u64>;
}

/// Canonical form of a checkout batch: duplicate lines for the same product
/// merged into one, ordered by id. Merging makes the stock check see the
/// batch's full demand per product; the fixed order keeps both backends
/// touching rows in one sequence, so two concurrent batches cannot deadlock
/// by locking the same products in opposite orders.
pub(crate) fn canonical_batch(items: &[CheckoutItem]) -> Vec<CheckoutItem> {
  let mut merged: Vec<CheckoutItem> = Vec::with_capacity(items.len());
  for item in items {
    match merged.iter_mut().find(|line| line.id == item.id) {
      Some(line) => line.quantity = line.quantity.saturating_add(item.quantity),
      None => merged.push(item.clone()),
    }
  }
  merged.sort_by_key(|line| line.id);
  merged
}

/// Seed a demo store with a few products so a fresh instance has something
/// to browse. Skipped when any store already exists.
pub async fn seed_demo(repo: &dyn MarketRepo) -> Result<()> {
  let now = Utc::now();
  if !repo.list_public_stores(now, None).await?.is_empty() {
    tracing::info!("Skipping demo seed; stores already present.");
    return Ok(());
  }

  let owner = Uuid::new_v4();
  let store = repo
    .insert_store(NewStore {
      user_id: owner,
      name: "Demo Ceramics".to_string(),
      slug: generate_slug("Demo Ceramics"),
      description: Some("Hand-thrown pottery, one weekend only.".to_string()),
      image_url: None,
      tags: vec!["ceramics".to_string(), "handmade".to_string()],
      start_date: now - Duration::days(1),
      end_date: now + Duration::days(6),
    })
    .await?;

  for (position, (name, price, slot)) in [
    ("Glazed mug", Decimal::new(1800, 2), 12),
    ("Serving bowl", Decimal::new(3250, 2), 4),
    ("Bud vase", Decimal::new(2400, 2), 7),
  ]
  .into_iter()
  .enumerate()
  {
    repo
      .insert_product(NewProduct {
        store_id: store.id,
        name: name.to_string(),
        price,
        description: None,
        image_url: None,
        slot,
        position: position as i32,
      })
      .await?;
  }

  tracing::info!(store_id = %store.id, "Seeded demo store.");
  Ok(())
}
