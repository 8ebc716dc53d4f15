use std::path::PathBuf;

use dotenvy::dotenv;
use std::env;

use crate::errors::{AppError, Result};

/// Default per-store product cap, overridable via `MAX_PRODUCTS_PER_STORE`.
pub const DEFAULT_MAX_PRODUCTS: i64 = 5;

#[derive(Debug, Clone)]
pub struct AppConfig {
  pub server_host: String,
  pub server_port: u16,

  /// Postgres connection string. When unset the server runs on the
  /// in-memory repository (local development / demos).
  pub database_url: Option<String>,

  /// Emails granted the admin override on stores, products and chats.
  pub admin_emails: Vec<String>,

  /// Per-store product limit, enforced at creation time.
  pub max_products_per_store: i64,

  /// Where uploaded images land on disk, and the base URL they are
  /// served back under.
  pub blob_root: PathBuf,
  pub public_base_url: String,

  /// Seed a demo store with a few products on startup.
  pub seed_db: bool,
}

impl AppConfig {
  pub fn from_env() -> Result<Self> {
    dotenv().ok(); // Load .env file if present

    let get_env = |var_name: &str| {
      env::var(var_name).map_err(|e| AppError::Config(format!("Missing environment variable '{}': {}", var_name, e)))
    };

    let server_host = get_env("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let server_port = get_env("SERVER_PORT")
      .unwrap_or_else(|_| "8080".to_string())
      .parse::<u16>()
      .map_err(|e| AppError::Config(format!("Invalid SERVER_PORT: {}", e)))?;

    let database_url = env::var("DATABASE_URL").ok().filter(|url| !url.is_empty());

    let admin_emails = env::var("ADMIN_EMAILS")
      .unwrap_or_default()
      .split(',')
      .map(|email| email.trim().to_ascii_lowercase())
      .filter(|email| !email.is_empty())
      .collect();

    let max_products_per_store = get_env("MAX_PRODUCTS_PER_STORE")
      .unwrap_or_else(|_| DEFAULT_MAX_PRODUCTS.to_string())
      .parse::<i64>()
      .map_err(|e| AppError::Config(format!("Invalid MAX_PRODUCTS_PER_STORE: {}", e)))?;
    if max_products_per_store < 1 {
      return Err(AppError::Config("MAX_PRODUCTS_PER_STORE must be at least 1".to_string()));
    }

    let blob_root = PathBuf::from(get_env("BLOB_ROOT").unwrap_or_else(|_| "./uploads".to_string()));
    let public_base_url =
      get_env("PUBLIC_BASE_URL").unwrap_or_else(|_| format!("http://{}:{}/uploads", server_host, server_port));

    let seed_db = get_env("SEED_DB")
      .unwrap_or_else(|_| "false".to_string())
      .parse::<bool>()
      .map_err(|e| AppError::Config(format!("Invalid SEED_DB value: {}", e)))?;

    tracing::info!("Application configuration loaded successfully.");

    Ok(Self {
      server_host,
      server_port,
      database_url,
      admin_emails,
      max_products_per_store,
      blob_root,
      public_base_url,
      seed_db,
    })
  }
}
