use std::sync::Arc;

use crate::chat::ChatFeed;
use crate::config::AppConfig;
use crate::repo::MarketRepo;
use crate::services::BlobStore;
use crate::web::auth::AdminPolicy;

#[derive(Clone)]
pub struct AppState {
  pub repo: Arc<dyn MarketRepo>,
  pub chat_feed: Arc<ChatFeed>,
  pub blobs: Arc<dyn BlobStore>,
  pub admin: AdminPolicy,
  pub config: Arc<AppConfig>, // Share loaded config
}
