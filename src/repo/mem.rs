//! In-memory repository.
//!
//! Used when no `DATABASE_URL` is configured (local development, demos)
//! and by the test suite. One mutex guards the whole state, so the batch
//! checkout and conversation resolution get their atomicity from the lock
//! rather than from transactions.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use uuid::Uuid;

use crate::errors::{AppError, Result};
use crate::models::{
  CheckoutItem, Conversation, ConversationSummary, Message, NewProduct, NewStore, Product, ProductUpdate, StockLevel,
  Store, StoreUpdate,
};

use super::MarketRepo;

#[derive(Default)]
struct MemState {
  stores: HashMap<Uuid, Store>,
  products: HashMap<Uuid, Product>,
  conversations: HashMap<Uuid, Conversation>,
  messages: Vec<Message>,
}

#[derive(Default)]
pub struct MemRepo {
  state: Mutex<MemState>,
}

impl MemRepo {
  pub fn new() -> Self {
    Self::default()
  }
}

fn matches_search(store: &Store, search: &str) -> bool {
  store.name.to_lowercase().contains(&search.to_lowercase()) || store.tags.iter().any(|tag| tag == search)
}

#[async_trait]
impl MarketRepo for MemRepo {
  async fn insert_store(&self, store: NewStore) -> Result<Store> {
    let mut state = self.state.lock();
    if state.stores.values().any(|existing| existing.slug == store.slug) {
      return Err(AppError::Validation(format!("slug '{}' already taken", store.slug)));
    }
    let row = Store {
      id: Uuid::new_v4(),
      user_id: store.user_id,
      name: store.name,
      slug: store.slug,
      description: store.description,
      image_url: store.image_url,
      tags: store.tags,
      start_date: store.start_date,
      end_date: store.end_date,
      contact_email: None,
      whatsapp: None,
      telegram: None,
      is_chat_enabled: false,
      created_at: Utc::now(),
    };
    state.stores.insert(row.id, row.clone());
    Ok(row)
  }

  async fn store_by_id(&self, id: Uuid) -> Result<Option<Store>> {
    Ok(self.state.lock().stores.get(&id).cloned())
  }

  async fn store_by_slug(&self, slug: &str) -> Result<Option<Store>> {
    Ok(self.state.lock().stores.values().find(|s| s.slug == slug).cloned())
  }

  async fn list_public_stores(&self, now: DateTime<Utc>, search: Option<&str>) -> Result<Vec<Store>> {
    let state = self.state.lock();
    let mut stores: Vec<Store> = state
      .stores
      .values()
      .filter(|s| s.is_visible_at(now))
      .filter(|s| search.map_or(true, |term| matches_search(s, term)))
      .cloned()
      .collect();
    stores.sort_by_key(|s| s.end_date);
    Ok(stores)
  }

  async fn update_store(&self, id: Uuid, update: StoreUpdate) -> Result<Store> {
    let mut state = self.state.lock();
    let store = state
      .stores
      .get_mut(&id)
      .ok_or_else(|| AppError::NotFound(format!("store {}", id)))?;
    if let Some(name) = update.name {
      store.name = name;
    }
    if let Some(description) = update.description {
      store.description = Some(description);
    }
    if let Some(image_url) = update.image_url {
      store.image_url = Some(image_url);
    }
    if let Some(tags) = update.tags {
      store.tags = tags;
    }
    if let Some(start_date) = update.start_date {
      store.start_date = start_date;
    }
    if let Some(end_date) = update.end_date {
      store.end_date = end_date;
    }
    if let Some(contact_email) = update.contact_email {
      store.contact_email = Some(contact_email);
    }
    if let Some(whatsapp) = update.whatsapp {
      store.whatsapp = Some(whatsapp);
    }
    if let Some(telegram) = update.telegram {
      store.telegram = Some(telegram);
    }
    if let Some(is_chat_enabled) = update.is_chat_enabled {
      store.is_chat_enabled = is_chat_enabled;
    }
    Ok(store.clone())
  }

  async fn delete_store(&self, id: Uuid) -> Result<()> {
    let mut state = self.state.lock();
    if state.stores.remove(&id).is_none() {
      return Err(AppError::NotFound(format!("store {}", id)));
    }
    state.products.retain(|_, p| p.store_id != id);
    let conversation_ids: Vec<Uuid> = state
      .conversations
      .values()
      .filter(|c| c.store_id == id)
      .map(|c| c.id)
      .collect();
    state.conversations.retain(|_, c| c.store_id != id);
    state.messages.retain(|m| !conversation_ids.contains(&m.conversation_id));
    Ok(())
  }

  async fn insert_product(&self, product: NewProduct) -> Result<Product> {
    let mut state = self.state.lock();
    if !state.stores.contains_key(&product.store_id) {
      return Err(AppError::NotFound(format!("store {}", product.store_id)));
    }
    let row = Product {
      id: Uuid::new_v4(),
      store_id: product.store_id,
      name: product.name,
      price: product.price,
      description: product.description,
      image_url: product.image_url,
      slot: product.slot,
      position: product.position,
      created_at: Utc::now(),
    };
    state.products.insert(row.id, row.clone());
    Ok(row)
  }

  async fn product_by_id(&self, id: Uuid) -> Result<Option<Product>> {
    Ok(self.state.lock().products.get(&id).cloned())
  }

  async fn list_products(&self, store_id: Uuid) -> Result<Vec<Product>> {
    let state = self.state.lock();
    let mut products: Vec<Product> = state.products.values().filter(|p| p.store_id == store_id).cloned().collect();
    products.sort_by(|a, b| a.position.cmp(&b.position).then(a.created_at.cmp(&b.created_at)));
    Ok(products)
  }

  async fn count_products(&self, store_id: Uuid) -> Result<i64> {
    Ok(self.state.lock().products.values().filter(|p| p.store_id == store_id).count() as i64)
  }

  async fn update_product(&self, id: Uuid, update: ProductUpdate) -> Result<Product> {
    let mut state = self.state.lock();
    let product = state
      .products
      .get_mut(&id)
      .ok_or_else(|| AppError::NotFound(format!("product {}", id)))?;
    if let Some(name) = update.name {
      product.name = name;
    }
    if let Some(price) = update.price {
      product.price = price;
    }
    if let Some(description) = update.description {
      product.description = Some(description);
    }
    if let Some(image_url) = update.image_url {
      product.image_url = Some(image_url);
    }
    if let Some(slot) = update.slot {
      product.slot = slot;
    }
    if let Some(position) = update.position {
      product.position = position;
    }
    Ok(product.clone())
  }

  async fn delete_product(&self, id: Uuid) -> Result<()> {
    if self.state.lock().products.remove(&id).is_none() {
      return Err(AppError::NotFound(format!("product {}", id)));
    }
    Ok(())
  }

  async fn stock_levels(&self, ids: &[Uuid]) -> Result<Vec<StockLevel>> {
    let state = self.state.lock();
    Ok(
      ids
        .iter()
        .filter_map(|id| state.products.get(id).map(|p| StockLevel { id: p.id, slot: p.slot }))
        .collect(),
    )
  }

  async fn checkout(&self, items: &[CheckoutItem]) -> Result<()> {
    // The whole batch runs under one lock acquisition: verify every line
    // first, then apply. Duplicate lines are merged beforehand so the check
    // sees the batch's full demand per product. No partial application on
    // failure.
    let batch = super::canonical_batch(items);
    let mut state = self.state.lock();
    for item in &batch {
      match state.products.get(&item.id) {
        Some(product) if product.slot >= item.quantity => {}
        _ => return Err(AppError::InsufficientStock),
      }
    }
    for item in &batch {
      if let Some(product) = state.products.get_mut(&item.id) {
        product.slot -= item.quantity;
      }
    }
    Ok(())
  }

  async fn resolve_conversation(&self, store_id: Uuid, customer_id: Uuid) -> Result<Conversation> {
    let mut state = self.state.lock();
    if let Some(existing) = state
      .conversations
      .values()
      .find(|c| c.store_id == store_id && c.customer_id == customer_id)
    {
      return Ok(existing.clone());
    }
    let now = Utc::now();
    let conversation = Conversation {
      id: Uuid::new_v4(),
      store_id,
      customer_id,
      is_blocked: false,
      last_message_at: now,
      created_at: now,
    };
    state.conversations.insert(conversation.id, conversation.clone());
    Ok(conversation)
  }

  async fn conversation_by_id(&self, id: Uuid) -> Result<Option<Conversation>> {
    Ok(self.state.lock().conversations.get(&id).cloned())
  }

  async fn conversation_for_customer(&self, store_id: Uuid, customer_id: Uuid) -> Result<Option<Conversation>> {
    Ok(
      self
        .state
        .lock()
        .conversations
        .values()
        .find(|c| c.store_id == store_id && c.customer_id == customer_id)
        .cloned(),
    )
  }

  async fn list_conversations(&self, store_id: Uuid) -> Result<Vec<ConversationSummary>> {
    let state = self.state.lock();
    let mut summaries: Vec<ConversationSummary> = state
      .conversations
      .values()
      .filter(|c| c.store_id == store_id)
      .map(|c| {
        let unread_count = state
          .messages
          .iter()
          .filter(|m| m.conversation_id == c.id && m.sender_id == c.customer_id && !m.is_read)
          .count() as i64;
        let preview = state
          .messages
          .iter()
          .filter(|m| m.conversation_id == c.id)
          .max_by_key(|m| m.created_at)
          .map(|m| m.content.clone());
        ConversationSummary {
          id: c.id,
          store_id: c.store_id,
          customer_id: c.customer_id,
          is_blocked: c.is_blocked,
          last_message_at: c.last_message_at,
          created_at: c.created_at,
          unread_count,
          preview,
        }
      })
      .collect();
    summaries.sort_by(|a, b| b.last_message_at.cmp(&a.last_message_at));
    Ok(summaries)
  }

  async fn set_conversation_blocked(&self, id: Uuid, blocked: bool) -> Result<Conversation> {
    let mut state = self.state.lock();
    let conversation = state
      .conversations
      .get_mut(&id)
      .ok_or_else(|| AppError::NotFound(format!("conversation {}", id)))?;
    conversation.is_blocked = blocked;
    Ok(conversation.clone())
  }

  async fn delete_conversation(&self, id: Uuid) -> Result<()> {
    let mut state = self.state.lock();
    if state.conversations.remove(&id).is_none() {
      return Err(AppError::NotFound(format!("conversation {}", id)));
    }
    state.messages.retain(|m| m.conversation_id != id);
    Ok(())
  }

  async fn insert_message(&self, conversation_id: Uuid, sender_id: Uuid, content: &str) -> Result<Message> {
    let mut state = self.state.lock();
    let conversation = state
      .conversations
      .get_mut(&conversation_id)
      .ok_or_else(|| AppError::NotFound(format!("conversation {}", conversation_id)))?;
    let message = Message {
      id: Uuid::new_v4(),
      conversation_id,
      sender_id,
      content: content.to_string(),
      is_read: false,
      created_at: Utc::now(),
    };
    conversation.last_message_at = message.created_at;
    state.messages.push(message.clone());
    Ok(message)
  }

  async fn list_messages(&self, conversation_id: Uuid) -> Result<Vec<Message>> {
    let state = self.state.lock();
    let mut messages: Vec<Message> = state
      .messages
      .iter()
      .filter(|m| m.conversation_id == conversation_id)
      .cloned()
      .collect();
    messages.sort_by_key(|m| m.created_at);
    Ok(messages)
  }

  async fn mark_read(&self, conversation_id: Uuid, reader_id: Uuid) -> Result<u64> {
    let mut state = self.state.lock();
    let mut updated = 0u64;
    for message in state
      .messages
      .iter_mut()
      .filter(|m| m.conversation_id == conversation_id && m.sender_id != reader_id && !m.is_read)
    {
      message.is_read = true;
      updated += 1;
    }
    Ok(updated)
  }
}
