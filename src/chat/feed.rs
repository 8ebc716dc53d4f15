//! The realtime change feed for chat.
//!
//! Inserted messages and conversation updates fan out to subscribers over
//! per-key tokio broadcast channels: one key per conversation (the
//! customer's widget) and one per store (the owner's inbox). Channels are
//! created lazily on first subscribe/publish and dropped again once nobody
//! listens. Delivery is at-least-once from the client's point of view (the
//! sender also sees its own optimistic insert), so events carry full rows
//! and clients de-duplicate by id.

use std::collections::HashMap;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::models::{Conversation, Message};

/// Buffered events per channel before slow subscribers start lagging.
const FEED_CAPACITY: usize = 64;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatEvent {
  MessageInserted { message: Message },
  ConversationUpdated { conversation: Conversation },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeedKey {
  Conversation(Uuid),
  Store(Uuid),
}

#[derive(Default)]
pub struct ChatFeed {
  channels: Mutex<HashMap<FeedKey, broadcast::Sender<ChatEvent>>>,
}

impl ChatFeed {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn subscribe(&self, key: FeedKey) -> broadcast::Receiver<ChatEvent> {
    let mut channels = self.channels.lock();
    channels
      .entry(key)
      .or_insert_with(|| broadcast::channel(FEED_CAPACITY).0)
      .subscribe()
  }

  fn publish(&self, key: FeedKey, event: ChatEvent) {
    let mut channels = self.channels.lock();
    if let Some(sender) = channels.get(&key) {
      if sender.send(event).is_err() {
        // Last receiver went away; drop the channel.
        channels.remove(&key);
      }
    }
  }

  /// Fan a new message out to its conversation and to the store's inbox.
  pub fn publish_message(&self, store_id: Uuid, message: &Message) {
    let event = ChatEvent::MessageInserted {
      message: message.clone(),
    };
    self.publish(FeedKey::Conversation(message.conversation_id), event.clone());
    self.publish(FeedKey::Store(store_id), event);
  }

  /// Fan a conversation change (block toggle, timestamp bump) out to both
  /// sides.
  pub fn publish_conversation(&self, conversation: &Conversation) {
    let event = ChatEvent::ConversationUpdated {
      conversation: conversation.clone(),
    };
    self.publish(FeedKey::Conversation(conversation.id), event.clone());
    self.publish(FeedKey::Store(conversation.store_id), event);
  }
}
