use std::sync::Arc;

use actix_web::{web as actix_data, App, HttpServer};
use sqlx::PgPool;
use tracing::Level;
use tracing_subscriber::fmt::format::FmtSpan;

use popup_market::chat::ChatFeed;
use popup_market::config::AppConfig;
use popup_market::repo::{self, MarketRepo, MemRepo, PgRepo};
use popup_market::services::FsBlobStore;
use popup_market::state::AppState;
use popup_market::web::auth::AdminPolicy;
use popup_market::web::routes::configure_app_routes;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
  tracing_subscriber::fmt()
    .with_max_level(Level::INFO)
    .with_env_filter(tracing_subscriber::EnvFilter::from_default_env()) // Allow RUST_LOG override
    .with_span_events(FmtSpan::CLOSE)
    .init();

  tracing::info!("Starting pop-up market server...");

  let app_config = match AppConfig::from_env() {
    Ok(cfg) => Arc::new(cfg),
    Err(e) => {
      tracing::error!(error = %e, "Failed to load application configuration.");
      panic!("Configuration error: {}", e);
    }
  };

  let repo: Arc<dyn MarketRepo> = match &app_config.database_url {
    Some(database_url) => {
      let db_pool = match PgPool::connect(database_url).await {
        Ok(pool) => {
          tracing::info!("Successfully connected to the database.");
          pool
        }
        Err(e) => {
          tracing::error!(error = %e, "Failed to connect to the database.");
          panic!("Database connection error: {}", e);
        }
      };
      let pg = PgRepo::new(db_pool);
      if let Err(e) = pg.migrate().await {
        tracing::error!(error = %e, "Failed to run database migrations.");
        panic!("Migration error: {}", e);
      }
      Arc::new(pg)
    }
    None => {
      tracing::warn!("No DATABASE_URL configured; using the in-memory repository.");
      Arc::new(MemRepo::new())
    }
  };

  if app_config.seed_db {
    if let Err(e) = repo::seed_demo(repo.as_ref()).await {
      tracing::error!(error = %e, "Failed to seed demo data.");
    }
  }

  let app_state = AppState {
    repo,
    chat_feed: Arc::new(ChatFeed::new()),
    blobs: Arc::new(FsBlobStore::new(
      app_config.blob_root.clone(),
      app_config.public_base_url.clone(),
    )),
    admin: AdminPolicy::from_emails(&app_config.admin_emails),
    config: app_config.clone(),
  };

  let server_address = format!("{}:{}", app_config.server_host, app_config.server_port);
  tracing::info!("Attempting to bind server to {}...", server_address);

  HttpServer::new(move || {
    App::new()
      .app_data(actix_data::Data::new(app_state.clone()))
      .wrap(tracing_actix_web::TracingLogger::default())
      .configure(configure_app_routes)
  })
  .bind(&server_address)?
  .run()
  .await
}
