//! Error type for `banya-store-sqlite`.

use banya_core::store::DomainError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] banya_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("sqlite error: {0}")]
  Sqlite(#[from] rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  /// A stored value does not map back to a domain value.
  #[error("decode error: {0}")]
  Decode(String),
}

impl Error {
  pub fn is_concurrent_modification(&self) -> bool {
    matches!(
      self,
      Self::Core(
        banya_core::Error::ConcurrentModification(_) | banya_core::Error::ConcurrentMerge { .. }
      )
    )
  }
}

impl DomainError for Error {
  fn domain(&self) -> Option<&banya_core::Error> {
    match self {
      Self::Core(e) => Some(e),
      _ => None,
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
