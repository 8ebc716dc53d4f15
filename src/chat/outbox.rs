//! Client-side optimistic overlay for a single open conversation.
//!
//! A sent message shows up in the UI immediately as a pending entry keyed
//! by a locally generated id. When the authoritative response (or the feed
//! event for the same send) arrives, the pending entry is replaced by the
//! real row; on failure it is rolled back and handed to the caller. Feed
//! events are de-duplicated against already-confirmed rows by message id,
//! since the broadcast can deliver the sender's own insert before or after
//! the response.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::Message;

#[derive(Debug, Clone, PartialEq)]
pub struct PendingMessage {
  pub local_id: Uuid,
  pub content: String,
  pub sent_at: DateTime<Utc>,
}

/// One line of the rendered conversation.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatLine {
  Confirmed(Message),
  Pending(PendingMessage),
}

#[derive(Debug, Default)]
pub struct Outbox {
  confirmed: Vec<Message>,
  pending: Vec<PendingMessage>,
}

impl Outbox {
  pub fn new() -> Self {
    Self::default()
  }

  /// Preload the authoritative history (e.g. from `list_messages`).
  pub fn load_history(&mut self, messages: Vec<Message>) {
    self.confirmed = messages;
    self.confirmed.sort_by_key(|m| m.created_at);
  }

  /// Record an optimistic send; returns the local id to correlate the
  /// eventual response with.
  pub fn push_pending(&mut self, content: &str) -> Uuid {
    let local_id = Uuid::new_v4();
    self.pending.push(PendingMessage {
      local_id,
      content: content.to_string(),
      sent_at: Utc::now(),
    });
    local_id
  }

  /// The server accepted the send: swap the pending entry for the real row.
  pub fn confirm(&mut self, local_id: Uuid, message: Message) {
    self.pending.retain(|p| p.local_id != local_id);
    self.observe(message);
  }

  /// The server rejected the send: roll the pending entry back and return
  /// it so the UI can surface a retry.
  pub fn fail(&mut self, local_id: Uuid) -> Option<PendingMessage> {
    let index = self.pending.iter().position(|p| p.local_id == local_id)?;
    Some(self.pending.remove(index))
  }

  /// Apply a message from the realtime feed. Duplicates (the sender's own
  /// insert arriving after `confirm`) are dropped by id.
  pub fn observe(&mut self, message: Message) {
    if self.confirmed.iter().any(|m| m.id == message.id) {
      return;
    }
    self.confirmed.push(message);
    self.confirmed.sort_by_key(|m| m.created_at);
  }

  /// Confirmed history in creation order, pending entries after it in send
  /// order.
  pub fn view(&self) -> Vec<ChatLine> {
    self
      .confirmed
      .iter()
      .cloned()
      .map(ChatLine::Confirmed)
      .chain(self.pending.iter().cloned().map(ChatLine::Pending))
      .collect()
  }

  pub fn pending_count(&self) -> usize {
    self.pending.len()
  }
}
