//! Pop-up marketplace backend.
//!
//! Artisans open time-boxed stores, list products with stock counts,
//! customers check out a cart and chat with store owners. The two pieces
//! with real invariants live in [`repo`] (the atomic batch stock decrement
//! behind checkout, and the one-conversation-per-store/customer model) and
//! [`chat`] (blocking, unread tracking, realtime fan-out). Everything else
//! is the plumbing around them: actix-web handlers, configuration, blob
//! storage for images.

pub mod cart;
pub mod chat;
pub mod config;
pub mod errors;
pub mod models;
pub mod repo;
pub mod services;
pub mod state;
pub mod web;

pub use crate::config::AppConfig;
pub use crate::errors::{AppError, Result};
pub use crate::state::AppState;
