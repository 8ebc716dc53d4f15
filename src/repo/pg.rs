//! Postgres-backed repository.
//!
//! Runtime `query_as` calls bound to `FromRow` models. The checkout batch
//! runs inside one transaction of conditional `UPDATE ... WHERE slot >= qty`
//! statements so the "stock >= requested" check and the decrement happen
//! without an interleaving window; conversation resolution leans on the
//! `(store_id, customer_id)` unique constraint.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use async_trait::async_trait;

use crate::errors::{AppError, Result};
use crate::models::{
  CheckoutItem, Conversation, ConversationSummary, Message, NewProduct, NewStore, Product, ProductUpdate, StockLevel,
  Store, StoreUpdate,
};

use super::MarketRepo;

const STORE_COLUMNS: &str = "id, user_id, name, slug, description, image_url, tags, start_date, end_date, \
                             contact_email, whatsapp, telegram, is_chat_enabled, created_at";
const PRODUCT_COLUMNS: &str = "id, store_id, name, price, description, image_url, slot, position, created_at";
const CONVERSATION_COLUMNS: &str = "id, store_id, customer_id, is_blocked, last_message_at, created_at";
const MESSAGE_COLUMNS: &str = "id, conversation_id, sender_id, content, is_read, created_at";

#[derive(Clone)]
pub struct PgRepo {
  pool: PgPool,
}

impl PgRepo {
  pub fn new(pool: PgPool) -> Self {
    Self { pool }
  }

  pub async fn migrate(&self) -> Result<()> {
    sqlx::migrate!("./migrations")
      .run(&self.pool)
      .await
      .map_err(|e| AppError::Internal(format!("migration failed: {}", e)))
  }
}

#[async_trait]
impl MarketRepo for PgRepo {
  async fn insert_store(&self, store: NewStore) -> Result<Store> {
    let inserted: Store = sqlx::query_as(&format!(
      "INSERT INTO stores (user_id, name, slug, description, image_url, tags, start_date, end_date) \
       VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING {STORE_COLUMNS}"
    ))
    .bind(store.user_id)
    .bind(&store.name)
    .bind(&store.slug)
    .bind(&store.description)
    .bind(&store.image_url)
    .bind(&store.tags)
    .bind(store.start_date)
    .bind(store.end_date)
    .fetch_one(&self.pool)
    .await?;
    Ok(inserted)
  }

  async fn store_by_id(&self, id: Uuid) -> Result<Option<Store>> {
    let store = sqlx::query_as(&format!("SELECT {STORE_COLUMNS} FROM stores WHERE id = $1"))
      .bind(id)
      .fetch_optional(&self.pool)
      .await?;
    Ok(store)
  }

  async fn store_by_slug(&self, slug: &str) -> Result<Option<Store>> {
    let store = sqlx::query_as(&format!("SELECT {STORE_COLUMNS} FROM stores WHERE slug = $1"))
      .bind(slug)
      .fetch_optional(&self.pool)
      .await?;
    Ok(store)
  }

  async fn list_public_stores(&self, now: DateTime<Utc>, search: Option<&str>) -> Result<Vec<Store>> {
    let stores = sqlx::query_as(&format!(
      "SELECT {STORE_COLUMNS} FROM stores \
       WHERE start_date <= $1 AND end_date >= $1 \
         AND ($2::text IS NULL OR name ILIKE '%' || $2 || '%' OR $2 = ANY(tags)) \
       ORDER BY end_date ASC"
    ))
    .bind(now)
    .bind(search)
    .fetch_all(&self.pool)
    .await?;
    Ok(stores)
  }

  async fn update_store(&self, id: Uuid, update: StoreUpdate) -> Result<Store> {
    let updated: Option<Store> = sqlx::query_as(&format!(
      "UPDATE stores SET \
         name = COALESCE($2, name), \
         description = COALESCE($3, description), \
         image_url = COALESCE($4, image_url), \
         tags = COALESCE($5, tags), \
         start_date = COALESCE($6, start_date), \
         end_date = COALESCE($7, end_date), \
         contact_email = COALESCE($8, contact_email), \
         whatsapp = COALESCE($9, whatsapp), \
         telegram = COALESCE($10, telegram), \
         is_chat_enabled = COALESCE($11, is_chat_enabled) \
       WHERE id = $1 RETURNING {STORE_COLUMNS}"
    ))
    .bind(id)
    .bind(&update.name)
    .bind(&update.description)
    .bind(&update.image_url)
    .bind(&update.tags)
    .bind(update.start_date)
    .bind(update.end_date)
    .bind(&update.contact_email)
    .bind(&update.whatsapp)
    .bind(&update.telegram)
    .bind(update.is_chat_enabled)
    .fetch_optional(&self.pool)
    .await?;
    updated.ok_or_else(|| AppError::NotFound(format!("store {}", id)))
  }

  async fn delete_store(&self, id: Uuid) -> Result<()> {
    // Explicit product/conversation cleanup, then the store row. The FK
    // cascades would cover this, but keeping it explicit matches the
    // delete being an owner-visible operation rather than a side effect.
    let mut tx = self.pool.begin().await?;
    sqlx::query("DELETE FROM products WHERE store_id = $1")
      .bind(id)
      .execute(&mut *tx)
      .await?;
    sqlx::query("DELETE FROM conversations WHERE store_id = $1")
      .bind(id)
      .execute(&mut *tx)
      .await?;
    let result = sqlx::query("DELETE FROM stores WHERE id = $1")
      .bind(id)
      .execute(&mut *tx)
      .await?;
    if result.rows_affected() == 0 {
      tx.rollback().await?;
      return Err(AppError::NotFound(format!("store {}", id)));
    }
    tx.commit().await?;
    Ok(())
  }

  async fn insert_product(&self, product: NewProduct) -> Result<Product> {
    let inserted: Product = sqlx::query_as(&format!(
      "INSERT INTO products (store_id, name, price, description, image_url, slot, position) \
       VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {PRODUCT_COLUMNS}"
    ))
    .bind(product.store_id)
    .bind(&product.name)
    .bind(product.price)
    .bind(&product.description)
    .bind(&product.image_url)
    .bind(product.slot)
    .bind(product.position)
    .fetch_one(&self.pool)
    .await?;
    Ok(inserted)
  }

  async fn product_by_id(&self, id: Uuid) -> Result<Option<Product>> {
    let product = sqlx::query_as(&format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1"))
      .bind(id)
      .fetch_optional(&self.pool)
      .await?;
    Ok(product)
  }

  async fn list_products(&self, store_id: Uuid) -> Result<Vec<Product>> {
    let products = sqlx::query_as(&format!(
      "SELECT {PRODUCT_COLUMNS} FROM products WHERE store_id = $1 ORDER BY position ASC, created_at ASC"
    ))
    .bind(store_id)
    .fetch_all(&self.pool)
    .await?;
    Ok(products)
  }

  async fn count_products(&self, store_id: Uuid) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products WHERE store_id = $1")
      .bind(store_id)
      .fetch_one(&self.pool)
      .await?;
    Ok(count)
  }

  async fn update_product(&self, id: Uuid, update: ProductUpdate) -> Result<Product> {
    let updated: Option<Product> = sqlx::query_as(&format!(
      "UPDATE products SET \
         name = COALESCE($2, name), \
         price = COALESCE($3, price), \
         description = COALESCE($4, description), \
         image_url = COALESCE($5, image_url), \
         slot = COALESCE($6, slot), \
         position = COALESCE($7, position) \
       WHERE id = $1 RETURNING {PRODUCT_COLUMNS}"
    ))
    .bind(id)
    .bind(&update.name)
    .bind(update.price)
    .bind(&update.description)
    .bind(&update.image_url)
    .bind(update.slot)
    .bind(update.position)
    .fetch_optional(&self.pool)
    .await?;
    updated.ok_or_else(|| AppError::NotFound(format!("product {}", id)))
  }

  async fn delete_product(&self, id: Uuid) -> Result<()> {
    let result = sqlx::query("DELETE FROM products WHERE id = $1")
      .bind(id)
      .execute(&self.pool)
      .await?;
    if result.rows_affected() == 0 {
      return Err(AppError::NotFound(format!("product {}", id)));
    }
    Ok(())
  }

  async fn stock_levels(&self, ids: &[Uuid]) -> Result<Vec<StockLevel>> {
    let levels = sqlx::query_as("SELECT id, slot FROM products WHERE id = ANY($1)")
      .bind(ids.to_vec())
      .fetch_all(&self.pool)
      .await?;
    Ok(levels)
  }

  async fn checkout(&self, items: &[CheckoutItem]) -> Result<()> {
    // Merged and id-ordered so concurrent batches take row locks in the
    // same sequence instead of deadlocking.
    let batch = super::canonical_batch(items);
    let mut tx = self.pool.begin().await?;
    for item in &batch {
      // Check and decrement in one statement. A row only matches while it
      // still has enough stock, so two racing batches cannot both take the
      // last unit. Unknown ids match nothing and fail the same way.
      let result = sqlx::query("UPDATE products SET slot = slot - $2 WHERE id = $1 AND slot >= $2")
        .bind(item.id)
        .bind(item.quantity)
        .execute(&mut *tx)
        .await?;
      if result.rows_affected() == 0 {
        tracing::warn!(product_id = %item.id, quantity = item.quantity, "Checkout line rejected; rolling back batch.");
        tx.rollback().await?;
        return Err(AppError::InsufficientStock);
      }
    }
    tx.commit().await?;
    Ok(())
  }

  async fn resolve_conversation(&self, store_id: Uuid, customer_id: Uuid) -> Result<Conversation> {
    // Insert-or-fetch: the loser of a concurrent first-contact race hits
    // the unique constraint, inserts nothing, and picks up the winner's row.
    let inserted: Option<Conversation> = sqlx::query_as(&format!(
      "INSERT INTO conversations (store_id, customer_id) VALUES ($1, $2) \
       ON CONFLICT (store_id, customer_id) DO NOTHING RETURNING {CONVERSATION_COLUMNS}"
    ))
    .bind(store_id)
    .bind(customer_id)
    .fetch_optional(&self.pool)
    .await?;

    if let Some(conversation) = inserted {
      return Ok(conversation);
    }
    let existing: Option<Conversation> = sqlx::query_as(&format!(
      "SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE store_id = $1 AND customer_id = $2"
    ))
    .bind(store_id)
    .bind(customer_id)
    .fetch_optional(&self.pool)
    .await?;
    existing.ok_or_else(|| AppError::Internal("conversation vanished during resolution".to_string()))
  }

  async fn conversation_by_id(&self, id: Uuid) -> Result<Option<Conversation>> {
    let conversation = sqlx::query_as(&format!("SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE id = $1"))
      .bind(id)
      .fetch_optional(&self.pool)
      .await?;
    Ok(conversation)
  }

  async fn conversation_for_customer(&self, store_id: Uuid, customer_id: Uuid) -> Result<Option<Conversation>> {
    let conversation = sqlx::query_as(&format!(
      "SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE store_id = $1 AND customer_id = $2"
    ))
    .bind(store_id)
    .bind(customer_id)
    .fetch_optional(&self.pool)
    .await?;
    Ok(conversation)
  }

  async fn list_conversations(&self, store_id: Uuid) -> Result<Vec<ConversationSummary>> {
    let summaries = sqlx::query_as(
      "SELECT c.id, c.store_id, c.customer_id, c.is_blocked, c.last_message_at, c.created_at, \
         (SELECT COUNT(*) FROM messages m \
            WHERE m.conversation_id = c.id AND m.sender_id = c.customer_id AND NOT m.is_read) AS unread_count, \
         (SELECT m.content FROM messages m \
            WHERE m.conversation_id = c.id ORDER BY m.created_at DESC LIMIT 1) AS preview \
       FROM conversations c WHERE c.store_id = $1 ORDER BY c.last_message_at DESC",
    )
    .bind(store_id)
    .fetch_all(&self.pool)
    .await?;
    Ok(summaries)
  }

  async fn set_conversation_blocked(&self, id: Uuid, blocked: bool) -> Result<Conversation> {
    let updated: Option<Conversation> = sqlx::query_as(&format!(
      "UPDATE conversations SET is_blocked = $2 WHERE id = $1 RETURNING {CONVERSATION_COLUMNS}"
    ))
    .bind(id)
    .bind(blocked)
    .fetch_optional(&self.pool)
    .await?;
    updated.ok_or_else(|| AppError::NotFound(format!("conversation {}", id)))
  }

  async fn delete_conversation(&self, id: Uuid) -> Result<()> {
    let mut tx = self.pool.begin().await?;
    sqlx::query("DELETE FROM messages WHERE conversation_id = $1")
      .bind(id)
      .execute(&mut *tx)
      .await?;
    let result = sqlx::query("DELETE FROM conversations WHERE id = $1")
      .bind(id)
      .execute(&mut *tx)
      .await?;
    if result.rows_affected() == 0 {
      tx.rollback().await?;
      return Err(AppError::NotFound(format!("conversation {}", id)));
    }
    tx.commit().await?;
    Ok(())
  }

  async fn insert_message(&self, conversation_id: Uuid, sender_id: Uuid, content: &str) -> Result<Message> {
    let mut tx = self.pool.begin().await?;
    let message: Message = sqlx::query_as(&format!(
      "INSERT INTO messages (conversation_id, sender_id, content) VALUES ($1, $2, $3) RETURNING {MESSAGE_COLUMNS}"
    ))
    .bind(conversation_id)
    .bind(sender_id)
    .bind(content)
    .fetch_one(&mut *tx)
    .await?;
    sqlx::query("UPDATE conversations SET last_message_at = $2 WHERE id = $1")
      .bind(conversation_id)
      .bind(message.created_at)
      .execute(&mut *tx)
      .await?;
    tx.commit().await?;
    Ok(message)
  }

  async fn list_messages(&self, conversation_id: Uuid) -> Result<Vec<Message>> {
    let messages = sqlx::query_as(&format!(
      "SELECT {MESSAGE_COLUMNS} FROM messages WHERE conversation_id = $1 ORDER BY created_at ASC"
    ))
    .bind(conversation_id)
    .fetch_all(&self.pool)
    .await?;
    Ok(messages)
  }

  async fn mark_read(&self, conversation_id: Uuid, reader_id: Uuid) -> Result<u64> {
    // Only messages NOT sent by the reader flip to read.
    let result = sqlx::query(
      "UPDATE messages SET is_read = TRUE \
       WHERE conversation_id = $1 AND sender_id <> $2 AND is_read = FALSE",
    )
    .bind(conversation_id)
    .bind(reader_id)
    .execute(&self.pool)
    .await?;
    Ok(result.rows_affected())
  }
}
