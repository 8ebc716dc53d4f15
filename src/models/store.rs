use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A time-boxed pop-up store. Publicly visible only while `now` falls
/// within `[start_date, end_date]`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Store {
  pub id: Uuid,
  pub user_id: Uuid,
  pub name: String,
  pub slug: String,
  pub description: Option<String>,
  pub image_url: Option<String>,
  pub tags: Vec<String>,
  pub start_date: DateTime<Utc>,
  pub end_date: DateTime<Utc>,
  pub contact_email: Option<String>,
  pub whatsapp: Option<String>,
  pub telegram: Option<String>,
  pub is_chat_enabled: bool,
  pub created_at: DateTime<Utc>,
}

impl Store {
  /// Whether the store's visibility window covers `now`.
  pub fn is_visible_at(&self, now: DateTime<Utc>) -> bool {
    self.start_date <= now && now <= self.end_date
  }
}

#[derive(Debug, Clone)]
pub struct NewStore {
  pub user_id: Uuid,
  pub name: String,
  pub slug: String,
  pub description: Option<String>,
  pub image_url: Option<String>,
  pub tags: Vec<String>,
  pub start_date: DateTime<Utc>,
  pub end_date: DateTime<Utc>,
}

/// Partial update; `None` fields are left untouched. Dates are optional so
/// an owner can edit contact details without re-entering the window.
#[derive(Debug, Clone, Default)]
pub struct StoreUpdate {
  pub name: Option<String>,
  pub description: Option<String>,
  pub image_url: Option<String>,
  pub tags: Option<Vec<String>>,
  pub start_date: Option<DateTime<Utc>>,
  pub end_date: Option<DateTime<Utc>>,
  pub contact_email: Option<String>,
  pub whatsapp: Option<String>,
  pub telegram: Option<String>,
  pub is_chat_enabled: Option<bool>,
}

/// Build a URL-safe slug from a store name: lower-cased, runs of
/// non-alphanumerics collapsed to `-`, plus a short random suffix so two
/// stores with the same name never collide.
pub fn generate_slug(name: &str) -> String {
  let mut base = String::with_capacity(name.len());
  let mut last_was_dash = true; // Suppress a leading dash
  for ch in name.chars() {
    if ch.is_ascii_alphanumeric() {
      base.push(ch.to_ascii_lowercase());
      last_was_dash = false;
    } else if !last_was_dash {
      base.push('-');
      last_was_dash = true;
    }
  }
  let base = base.trim_end_matches('-');

  let suffix = Uuid::new_v4().simple().to_string();
  let suffix = &suffix[..5];
  if base.is_empty() {
    suffix.to_string()
  } else {
    format!("{}-{}", base, suffix)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::Duration;

  #[test]
  fn slug_is_lowercase_and_url_safe() {
    let slug = generate_slug("Cerámica & Más!");
    let (base, suffix) = slug.rsplit_once('-').unwrap();
    assert_eq!(base, "cer-mica-m-s");
    assert_eq!(suffix.len(), 5);
    assert!(slug.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'));
  }

  #[test]
  fn slug_of_symbols_only_is_just_the_suffix() {
    let slug = generate_slug("!!!");
    assert_eq!(slug.len(), 5);
    assert!(!slug.contains('-'));
  }

  #[test]
  fn slugs_for_the_same_name_differ() {
    assert_ne!(generate_slug("Taller"), generate_slug("Taller"));
  }

  #[test]
  fn visibility_window_is_inclusive() {
    let now = Utc::now();
    let store = Store {
      id: Uuid::new_v4(),
      user_id: Uuid::new_v4(),
      name: "Window".to_string(),
      slug: "window-abc12".to_string(),
      description: None,
      image_url: None,
      tags: vec![],
      start_date: now,
      end_date: now + Duration::days(3),
      contact_email: None,
      whatsapp: None,
      telegram: None,
      is_chat_enabled: false,
      created_at: now,
    };
    assert!(store.is_visible_at(now));
    assert!(store.is_visible_at(now + Duration::days(3)));
    assert!(!store.is_visible_at(now - Duration::seconds(1)));
    assert!(!store.is_visible_at(now + Duration::days(4)));
  }
}
