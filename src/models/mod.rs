//! Data structures representing database entities.

pub mod conversation;
pub mod message;
pub mod product;
pub mod store;

// Re-export the model structs for convenient access
pub use conversation::{Conversation, ConversationSummary};
pub use message::Message;
pub use product::{CheckoutItem, NewProduct, Product, ProductUpdate, StockLevel};
pub use store::{NewStore, Store, StoreUpdate};
