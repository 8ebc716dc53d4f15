//! Blob storage for store and product images.
//!
//! The contract mirrors the hosted file store the app grew up with:
//! `(bucket, path, bytes)` in, public URL out. Images are not part of
//! checkout or chat correctness; handlers just thread the returned URL
//! into store/product rows.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::errors::{AppError, Result};

#[async_trait]
pub trait BlobStore: Send + Sync {
  /// Store `bytes` under `bucket/path` and return the public URL.
  async fn put(&self, bucket: &str, path: &str, bytes: &[u8]) -> Result<String>;
}

/// Filesystem-backed blob store: writes under a root directory and serves
/// URLs under a configured public base.
pub struct FsBlobStore {
  root: PathBuf,
  public_base_url: String,
}

impl FsBlobStore {
  pub fn new(root: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Self {
    Self {
      root: root.into(),
      public_base_url: public_base_url.into(),
    }
  }
}

fn validate_segment(segment: &str) -> Result<()> {
  if segment.is_empty() {
    return Err(AppError::Validation("empty storage path".to_string()));
  }
  let escapes = Path::new(segment)
    .components()
    .any(|c| !matches!(c, std::path::Component::Normal(_)));
  if escapes {
    return Err(AppError::Validation(format!("invalid storage path '{}'", segment)));
  }
  Ok(())
}

#[async_trait]
impl BlobStore for FsBlobStore {
  async fn put(&self, bucket: &str, path: &str, bytes: &[u8]) -> Result<String> {
    validate_segment(bucket)?;
    validate_segment(path)?;

    let target = self.root.join(bucket).join(path);
    if let Some(parent) = target.parent() {
      tokio::fs::create_dir_all(parent)
        .await
        .map_err(|e| AppError::Internal(format!("creating blob directory: {}", e)))?;
    }
    tokio::fs::write(&target, bytes)
      .await
      .map_err(|e| AppError::Internal(format!("writing blob: {}", e)))?;

    tracing::info!(bucket, path, size = bytes.len(), "Stored blob.");
    Ok(format!("{}/{}/{}", self.public_base_url.trim_end_matches('/'), bucket, path))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn temp_store() -> FsBlobStore {
    let root = std::env::temp_dir().join(format!("popup-market-blobs-{}", uuid::Uuid::new_v4().simple()));
    FsBlobStore::new(root, "http://localhost:8080/uploads")
  }

  #[tokio::test]
  async fn put_writes_the_file_and_returns_a_public_url() {
    let store = temp_store();
    let url = store.put("products", "abc/cover.png", b"not-a-real-png").await.unwrap();
    assert_eq!(url, "http://localhost:8080/uploads/products/abc/cover.png");

    let on_disk = store.root.join("products/abc/cover.png");
    assert_eq!(tokio::fs::read(on_disk).await.unwrap(), b"not-a-real-png");
  }

  #[tokio::test]
  async fn path_traversal_is_rejected() {
    let store = temp_store();
    let err = store.put("products", "../outside.png", b"x").await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
    let err = store.put("..", "file.png", b"x").await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
  }
}
