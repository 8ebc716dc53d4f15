use actix_web::web;

use crate::web::handlers::{chat_handlers, checkout_handlers, product_handlers, store_handlers, upload_handlers};

async fn health_check_handler() -> actix_web::HttpResponse {
  actix_web::HttpResponse::Ok().json(serde_json::json!({ "status": "ok" }))
}

/// Wire the `/api/v1` surface onto the Actix app (called from `main.rs`
/// and the test harness).
pub fn configure_app_routes(cfg: &mut web::ServiceConfig) {
  cfg.service(
    web::scope("/api/v1")
      // Health Check Route
      .route("/health", web::get().to(health_check_handler))
      // Stores
      .service(
        web::scope("/stores")
          .route("", web::post().to(store_handlers::create_store_handler))
          .route("", web::get().to(store_handlers::list_public_stores_handler))
          .route("/{slug}", web::get().to(store_handlers::get_store_by_slug_handler))
          .route("/{store_id}", web::patch().to(store_handlers::update_store_handler))
          .route("/{store_id}", web::delete().to(store_handlers::delete_store_handler))
          .route(
            "/{store_id}/products",
            web::post().to(product_handlers::add_product_handler),
          )
          .route(
            "/{store_id}/products",
            web::get().to(product_handlers::list_store_products_handler),
          ),
      )
      // Products
      .service(
        web::scope("/products")
          .route("/stock", web::get().to(product_handlers::stock_levels_handler))
          .route("/{product_id}", web::patch().to(product_handlers::update_product_handler))
          .route(
            "/{product_id}",
            web::delete().to(product_handlers::delete_product_handler),
          ),
      )
      // Checkout
      .service(web::scope("/checkout").route("", web::post().to(checkout_handlers::process_checkout_handler)))
      // Chat
      .service(
        web::scope("/chat")
          .route("/messages", web::post().to(chat_handlers::send_message_handler))
          .route(
            "/stores/{store_id}/conversation",
            web::get().to(chat_handlers::get_conversation_handler),
          )
          .route(
            "/stores/{store_id}/conversations",
            web::get().to(chat_handlers::list_conversations_handler),
          )
          .route(
            "/stores/{store_id}/events",
            web::get().to(chat_handlers::store_events_handler),
          )
          .route(
            "/conversations/{conversation_id}/messages",
            web::get().to(chat_handlers::list_messages_handler),
          )
          .route(
            "/conversations/{conversation_id}/read",
            web::post().to(chat_handlers::mark_read_handler),
          )
          .route(
            "/conversations/{conversation_id}/block",
            web::post().to(chat_handlers::toggle_block_handler),
          )
          .route(
            "/conversations/{conversation_id}",
            web::delete().to(chat_handlers::delete_conversation_handler),
          )
          .route(
            "/conversations/{conversation_id}/events",
            web::get().to(chat_handlers::conversation_events_handler),
          ),
      )
      // Uploads (blob storage)
      .service(web::scope("/uploads").route("/{bucket}", web::post().to(upload_handlers::upload_blob_handler))),
  );
}
