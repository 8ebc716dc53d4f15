use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// The single persistent chat thread between one store and one customer.
/// Uniqueness of the `(store_id, customer_id)` pair is enforced by the
/// repository (a unique constraint on Postgres).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Conversation {
  pub id: Uuid,
  pub store_id: Uuid,
  pub customer_id: Uuid,
  /// While set, non-admin participants cannot send. Either participant
  /// (or an admin) can toggle it back; last write wins.
  pub is_blocked: bool,
  pub last_message_at: DateTime<Utc>,
  pub created_at: DateTime<Utc>,
}

impl Conversation {
  pub fn is_participant(&self, user_id: Uuid, store_owner_id: Uuid) -> bool {
    self.customer_id == user_id || store_owner_id == user_id
  }
}

/// An inbox row for the store owner's dashboard: the conversation plus the
/// derived unread count (messages from the customer not yet read) and a
/// preview of the latest message.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ConversationSummary {
  pub id: Uuid,
  pub store_id: Uuid,
  pub customer_id: Uuid,
  pub is_blocked: bool,
  pub last_message_at: DateTime<Utc>,
  pub created_at: DateTime<Utc>,
  pub unread_count: i64,
  pub preview: Option<String>,
}
