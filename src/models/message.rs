use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A chat message. Immutable once created except for `is_read`, which the
/// recipient flips by opening the conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Message {
  pub id: Uuid,
  pub conversation_id: Uuid,
  pub sender_id: Uuid,
  pub content: String,
  pub is_read: bool,
  pub created_at: DateTime<Utc>,
}
