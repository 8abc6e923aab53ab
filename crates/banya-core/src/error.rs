//! Error types for `banya-core`.

use thiserror::Error;

use crate::{
  ids::{BathId, CountryId, RegionId, UserId, VisitId},
  visit::VisitStatus,
};

#[derive(Debug, Error)]
pub enum Error {
  #[error("visit {visit_id} cannot move from {from} to {to}")]
  InvalidTransition {
    visit_id: VisitId,
    from:     VisitStatus,
    to:       VisitStatus,
  },

  #[error("moving visit {visit_id} from {from} to {to} requires an administrator")]
  Forbidden {
    visit_id: VisitId,
    from:     VisitStatus,
    to:       VisitStatus,
  },

  #[error("visit {visit_id} is incomplete: {missing}")]
  IncompleteVisit {
    visit_id: VisitId,
    missing:  &'static str,
  },

  #[error("visit {0} was modified concurrently")]
  ConcurrentModification(VisitId),

  #[error("merging bath {source_id} into {target_id} raced with another write")]
  ConcurrentMerge {
    source_id: BathId,
    target_id: BathId,
  },

  #[error("invalid point configuration: {0}")]
  ConfigurationInvalid(String),

  #[error("invalid period {0:?}; expected week, month, year or all")]
  InvalidPeriod(String),

  #[error("invalid ISO week {year}-W{week}")]
  InvalidWeek { year: i32, week: u32 },

  #[error("merging bath {source_id} into {target_id} would create an alias cycle")]
  AliasCycle {
    source_id: BathId,
    target_id: BathId,
  },

  #[error("visit not found: {0}")]
  VisitNotFound(VisitId),

  #[error("user not found: {0}")]
  UserNotFound(UserId),

  #[error("bath not found: {0}")]
  BathNotFound(BathId),

  #[error("region not found: {0}")]
  RegionNotFound(RegionId),

  #[error("country not found: {0}")]
  CountryNotFound(CountryId),

  #[error("point configuration version {0} not found")]
  ConfigVersionNotFound(u32),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

impl Error {
  /// Stable machine-readable name of the error kind.
  pub fn kind(&self) -> &'static str {
    match self {
      Self::InvalidTransition { .. } => "invalid_transition",
      Self::Forbidden { .. } => "forbidden",
      Self::IncompleteVisit { .. } => "incomplete_visit",
      Self::ConcurrentModification(_) | Self::ConcurrentMerge { .. } => {
        "concurrent_modification"
      }
      Self::ConfigurationInvalid(_) => "configuration_invalid",
      Self::InvalidPeriod(_) => "invalid_period",
      Self::InvalidWeek { .. } => "invalid_week",
      Self::AliasCycle { .. } => "alias_cycle",
      Self::VisitNotFound(_)
      | Self::UserNotFound(_)
      | Self::BathNotFound(_)
      | Self::RegionNotFound(_)
      | Self::CountryNotFound(_)
      | Self::ConfigVersionNotFound(_) => "not_found",
      Self::Serialization(_) => "serialization",
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
