use actix_web::{web, HttpResponse};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tracing::instrument;

use crate::errors::AppError;
use crate::state::AppState;
use crate::web::auth::Identity;

#[derive(Deserialize, Debug)]
pub struct UploadQuery {
  pub filename: String,
}

/// `POST /uploads/{bucket}?filename=...` with the raw file body. Returns
/// the public URL; clients pass it along in store/product payloads. Paths
/// are namespaced per uploader, timestamped so re-uploads never clash.
#[instrument(
  name = "handler::upload_blob",
  skip(app_state, body, query),
  fields(user_id = %identity.user_id, bucket = %path.as_ref(), size = body.len())
)]
pub async fn upload_blob_handler(
  app_state: web::Data<AppState>,
  identity: Identity,
  path: web::Path<String>,
  query: web::Query<UploadQuery>,
  body: web::Bytes,
) -> Result<HttpResponse, AppError> {
  let bucket = path.into_inner();
  if body.is_empty() {
    return Err(AppError::Validation("Empty upload.".to_string()));
  }

  let blob_path = format!(
    "{}/{}-{}",
    identity.user_id,
    Utc::now().timestamp_millis(),
    query.filename
  );
  let url = app_state.blobs.put(&bucket, &blob_path, &body).await?;
  Ok(HttpResponse::Created().json(json!({ "url": url })))
}
