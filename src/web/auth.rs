//! Authenticated identity and the admin policy.
//!
//! Authentication mechanics live with the external auth provider; by the
//! time a request reaches this service the provider's gateway has verified
//! the session and forwards the opaque identity in `X-User-ID` /
//! `X-User-Email` headers. Admin-ness is an injectable policy built from a
//! configured email allow-list rather than a constant baked into the code,
//! so deployments change the admin set without a release.

use std::collections::HashSet;
use std::sync::Arc;

use actix_web::{FromRequest, HttpRequest};
use tracing::warn;
use uuid::Uuid;

use crate::errors::AppError;

/// The opaque identity supplied by the auth provider.
#[derive(Debug, Clone)]
pub struct Identity {
  pub user_id: Uuid,
  pub email: Option<String>,
}

impl FromRequest for Identity {
  type Error = AppError;
  type Future = futures_util::future::Ready<Result<Self, Self::Error>>;

  fn from_request(req: &HttpRequest, _payload: &mut actix_web::dev::Payload) -> Self::Future {
    let user_id = req
      .headers()
      .get("X-User-ID")
      .and_then(|value| value.to_str().ok())
      .and_then(|value| Uuid::parse_str(value).ok());

    let email = req
      .headers()
      .get("X-User-Email")
      .and_then(|value| value.to_str().ok())
      .map(|value| value.to_string());

    match user_id {
      Some(user_id) => futures_util::future::ready(Ok(Identity { user_id, email })),
      None => {
        warn!("Identity extractor: missing or invalid X-User-ID header.");
        futures_util::future::ready(Err(AppError::Auth("User authentication required.".to_string())))
      }
    }
  }
}

/// `isAdmin(identity) -> bool`, configured at startup.
#[derive(Debug, Clone, Default)]
pub struct AdminPolicy {
  emails: Arc<HashSet<String>>,
}

impl AdminPolicy {
  pub fn from_emails<I, S>(emails: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
  {
    Self {
      emails: Arc::new(emails.into_iter().map(|e| e.as_ref().to_ascii_lowercase()).collect()),
    }
  }

  pub fn is_admin(&self, identity: &Identity) -> bool {
    identity
      .email
      .as_ref()
      .map(|email| self.emails.contains(&email.to_ascii_lowercase()))
      .unwrap_or(false)
  }
}
