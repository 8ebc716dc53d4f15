pub mod chat_handlers;
pub mod checkout_handlers;
pub mod product_handlers;
pub mod store_handlers;
pub mod upload_handlers;

use crate::errors::AppError;
use crate::models::Store;
use crate::web::auth::{AdminPolicy, Identity};

/// Owner-or-admin gate shared by store, product and inbox mutations.
pub(crate) fn ensure_store_manager(store: &Store, identity: &Identity, admin: &AdminPolicy) -> Result<(), AppError> {
  if store.user_id == identity.user_id || admin.is_admin(identity) {
    Ok(())
  } else {
    Err(AppError::Forbidden("You do not manage this store.".to_string()))
  }
}
