// tests/common/mod.rs
#![allow(dead_code)] // Allow unused code in this common test module

use std::sync::Arc;

use chrono::{Duration, Utc};
use once_cell::sync::Lazy;
use rust_decimal::Decimal;
use uuid::Uuid;

use popup_market::chat::ChatFeed;
use popup_market::config::AppConfig;
use popup_market::models::{NewProduct, NewStore, Product, Store};
use popup_market::models::store::generate_slug;
use popup_market::repo::{MarketRepo, MemRepo};
use popup_market::services::FsBlobStore;
use popup_market::state::AppState;
use popup_market::web::auth::AdminPolicy;

pub const ADMIN_EMAIL: &str = "admin@popup.test";

static TRACING_INIT: Lazy<()> = Lazy::new(|| {
  let _ = tracing_subscriber::fmt()
    .with_env_filter("info")
    .with_test_writer()
    .try_init();
});

pub fn setup_tracing() {
  Lazy::force(&TRACING_INIT);
}

fn test_config() -> AppConfig {
  AppConfig {
    server_host: "127.0.0.1".to_string(),
    server_port: 0,
    database_url: None,
    admin_emails: vec![ADMIN_EMAIL.to_string()],
    max_products_per_store: 5,
    blob_root: std::env::temp_dir().join(format!("popup-market-test-{}", Uuid::new_v4().simple())),
    public_base_url: "http://localhost:8080/uploads".to_string(),
    seed_db: false,
  }
}

/// Fresh application state on the in-memory repository.
pub fn test_state() -> AppState {
  setup_tracing();
  let config = Arc::new(test_config());
  AppState {
    repo: Arc::new(MemRepo::new()),
    chat_feed: Arc::new(ChatFeed::new()),
    blobs: Arc::new(FsBlobStore::new(config.blob_root.clone(), config.public_base_url.clone())),
    admin: AdminPolicy::from_emails(&config.admin_emails),
    config,
  }
}

/// Auth headers the external provider's gateway would forward.
pub fn auth_headers(user_id: Uuid, email: &str) -> [(&'static str, String); 2] {
  [("X-User-ID", user_id.to_string()), ("X-User-Email", email.to_string())]
}

/// A store whose visibility window covers `now`.
pub async fn seed_store(state: &AppState, owner: Uuid) -> Store {
  seed_store_with_window(state, owner, Utc::now() - Duration::days(1), Utc::now() + Duration::days(6)).await
}

pub async fn seed_store_with_window(
  state: &AppState,
  owner: Uuid,
  start_date: chrono::DateTime<Utc>,
  end_date: chrono::DateTime<Utc>,
) -> Store {
  state
    .repo
    .insert_store(NewStore {
      user_id: owner,
      name: "Test Pottery".to_string(),
      slug: generate_slug("Test Pottery"),
      description: None,
      image_url: None,
      tags: vec!["ceramics".to_string()],
      start_date,
      end_date,
    })
    .await
    .expect("seeding store")
}

pub async fn seed_product(state: &AppState, store_id: Uuid, name: &str, slot: i32) -> Product {
  state
    .repo
    .insert_product(NewProduct {
      store_id,
      name: name.to_string(),
      price: Decimal::new(1800, 2),
      description: None,
      image_url: None,
      slot,
      position: 0,
    })
    .await
    .expect("seeding product")
}
