//! Chat: realtime fan-out of message/conversation changes, and the
//! client-side optimistic outbox.

pub mod feed;
pub mod outbox;

pub use feed::{ChatEvent, ChatFeed, FeedKey};
pub use outbox::Outbox;
