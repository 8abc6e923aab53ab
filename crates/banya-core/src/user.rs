//! Participants.
//!
//! `points` and `visit_count` are denormalised: the store recomputes them from
//! `point_logs` and confirmed visit membership inside every scoring batch.
//! They are never read back as inputs to scoring.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::UserId;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
  pub user_id:      UserId,
  pub username:     Option<String>,
  pub display_name: String,
  pub is_admin:     bool,
  pub is_active:    bool,
  pub points:       f64,
  pub visit_count:  u32,
  pub created_at:   DateTime<Utc>,
}

/// Input to [`crate::store::VisitStore::upsert_user`].
///
/// An existing user keeps its flags; only the naming fields are refreshed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewUser {
  pub user_id:      UserId,
  pub username:     Option<String>,
  /// Falls back to the numeric id when empty.
  #[serde(default)]
  pub display_name: String,
}

impl NewUser {
  pub fn new(user_id: UserId, display_name: impl Into<String>) -> Self {
    Self { user_id, username: None, display_name: display_name.into() }
  }

  /// The name to persist: the given display name, or the id as text.
  pub fn resolved_display_name(&self) -> String {
    let trimmed = self.display_name.trim();
    if trimmed.is_empty() {
      self.user_id.to_string()
    } else {
      trimmed.to_owned()
    }
  }
}

/// Administrative flags; `None` leaves a flag unchanged.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct UserFlags {
  pub is_admin:  Option<bool>,
  pub is_active: Option<bool>,
}
