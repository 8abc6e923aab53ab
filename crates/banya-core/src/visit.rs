//! Visits: one recorded bathhouse session each.
//!
//! A visit owns its participant list and, while confirmed, its point-log rows.
//! `visited_at` is the event date and is independent of `created_at`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

use crate::{
  ids::{BathId, UserId, VisitId},
  scoring::PointLog,
};

/// Sessions at least this long qualify for the `long` bonus.
pub const LONG_SESSION_MINUTES: u32 = 150;

// ─── Status ──────────────────────────────────────────────────────────────────

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum VisitStatus {
  Draft,
  Pending,
  Confirmed,
  Disputed,
  Cancelled,
}

impl VisitStatus {
  /// Only confirmed visits carry point-log rows.
  pub fn is_scoring_eligible(self) -> bool { matches!(self, Self::Confirmed) }

  pub fn is_terminal(self) -> bool { matches!(self, Self::Cancelled) }

  pub fn as_str(self) -> &'static str { self.into() }
}

// ─── Visit ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Visit {
  pub visit_id:         VisitId,
  pub bath_id:          Option<BathId>,
  /// De-duplicated, ascending.
  pub participants:     Vec<UserId>,
  pub created_by:       Option<UserId>,
  pub status:           VisitStatus,
  pub visited_at:       DateTime<Utc>,
  pub flag_long:        bool,
  /// Snapshot of the bath's ultra-unique classification at scoring time.
  pub flag_ultraunique: bool,
  /// Bumped on every write; used to detect concurrent modification.
  pub revision:         u64,
  pub created_at:       DateTime<Utc>,
  pub updated_at:       DateTime<Utc>,
}

impl Visit {
  /// Position of this visit in a participant's discovery ordering.
  pub fn key(&self) -> VisitKey {
    VisitKey { visited_at: self.visited_at, visit_id: self.visit_id }
  }
}

/// Total order over visits: by `visited_at`, ties broken by ascending id.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct VisitKey {
  pub visited_at: DateTime<Utc>,
  pub visit_id:   VisitId,
}

/// Normalise a participant list: ascending, no duplicates.
pub fn normalize_participants(mut ids: Vec<UserId>) -> Vec<UserId> {
  ids.sort_unstable();
  ids.dedup();
  ids
}

// ─── Inputs ──────────────────────────────────────────────────────────────────

/// Input to [`crate::store::VisitStore::create_visit`]. Visits always start
/// as [`VisitStatus::Draft`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewVisit {
  pub bath_id:      Option<BathId>,
  #[serde(default)]
  pub participants: Vec<UserId>,
  pub created_by:   Option<UserId>,
  /// Defaults to the creation instant.
  pub visited_at:   Option<DateTime<Utc>>,
  #[serde(default)]
  pub flag_long:    bool,
  /// Session length; at least [`LONG_SESSION_MINUTES`] implies `flag_long`.
  pub duration_minutes: Option<u32>,
}

impl NewVisit {
  pub fn is_long(&self) -> bool {
    self.flag_long
      || self.duration_minutes.is_some_and(|m| m >= LONG_SESSION_MINUTES)
  }
}

/// A partial edit of a visit's scoring inputs. `None` leaves a field as is.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VisitPatch {
  pub visited_at:   Option<DateTime<Utc>>,
  pub bath_id:      Option<BathId>,
  pub participants: Option<Vec<UserId>>,
  pub flag_long:    Option<bool>,
}

impl VisitPatch {
  pub fn is_empty(&self) -> bool {
    self.visited_at.is_none()
      && self.bath_id.is_none()
      && self.participants.is_none()
      && self.flag_long.is_none()
  }

  /// Whether applying this patch to `visit` changes an order-dependent input
  /// (date, bath or participants), as opposed to only `flag_long`.
  pub fn reorders(&self, visit: &Visit) -> bool {
    self.visited_at.is_some_and(|at| at != visit.visited_at)
      || self.bath_id.is_some_and(|b| Some(b) != visit.bath_id)
      || self.participants.as_ref().is_some_and(|p| {
        normalize_participants(p.clone()) != visit.participants
      })
  }

  /// Apply the patch to a copy of `visit`.
  pub fn apply(&self, visit: &Visit) -> Visit {
    let mut next = visit.clone();
    if let Some(at) = self.visited_at {
      next.visited_at = at;
    }
    if let Some(bath_id) = self.bath_id {
      next.bath_id = Some(bath_id);
    }
    if let Some(participants) = &self.participants {
      next.participants = normalize_participants(participants.clone());
    }
    if let Some(flag) = self.flag_long {
      next.flag_long = flag;
    }
    next
  }
}

/// Parameters for [`crate::store::VisitStore::list_visits`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VisitQuery {
  pub status:    Option<VisitStatus>,
  pub bath_id:   Option<BathId>,
  /// Restrict to visits this user participated in.
  pub user_id:   Option<UserId>,
  pub date_from: Option<DateTime<Utc>>,
  pub date_to:   Option<DateTime<Utc>>,
  pub limit:     Option<usize>,
  pub offset:    Option<usize>,
}

impl VisitQuery {
  pub const DEFAULT_LIMIT: usize = 50;
  pub const MAX_LIMIT: usize = 200;

  pub fn effective_limit(&self) -> usize {
    self.limit.unwrap_or(Self::DEFAULT_LIMIT).min(Self::MAX_LIMIT)
  }
}

// ─── Read model ──────────────────────────────────────────────────────────────

/// A visit together with the point-log rows it currently owns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisitDetail {
  pub visit:        Visit,
  pub point_logs:   Vec<PointLog>,
  pub total_points: f64,
}

impl VisitDetail {
  pub fn new(visit: Visit, point_logs: Vec<PointLog>) -> Self {
    let total_points = point_logs.iter().map(|l| l.points).sum();
    Self { visit, point_logs, total_points }
  }

  /// Sum of one participant's rows on this visit.
  pub fn points_for(&self, user_id: UserId) -> f64 {
    self
      .point_logs
      .iter()
      .filter(|l| l.user_id == user_id)
      .map(|l| l.points)
      .sum()
  }
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;

  fn visit() -> Visit {
    let at = Utc.with_ymd_and_hms(2024, 1, 10, 18, 0, 0).unwrap();
    Visit {
      visit_id:         VisitId(1),
      bath_id:          Some(BathId(7)),
      participants:     vec![UserId(1), UserId(2)],
      created_by:       None,
      status:           VisitStatus::Confirmed,
      visited_at:       at,
      flag_long:        false,
      flag_ultraunique: false,
      revision:         1,
      created_at:       at,
      updated_at:       at,
    }
  }

  #[test]
  fn status_parses_snake_case() {
    assert_eq!("confirmed".parse::<VisitStatus>().unwrap(), VisitStatus::Confirmed);
    assert_eq!(VisitStatus::Disputed.to_string(), "disputed");
    assert!("Confirmed".parse::<VisitStatus>().is_err());
  }

  #[test]
  fn duration_implies_long_flag() {
    let mut input = NewVisit { duration_minutes: Some(149), ..Default::default() };
    assert!(!input.is_long());
    input.duration_minutes = Some(LONG_SESSION_MINUTES);
    assert!(input.is_long());
  }

  #[test]
  fn flag_only_patch_does_not_reorder() {
    let patch = VisitPatch { flag_long: Some(true), ..Default::default() };
    assert!(!patch.reorders(&visit()));
    assert!(patch.apply(&visit()).flag_long);
  }

  #[test]
  fn same_participants_in_other_order_do_not_reorder() {
    let patch = VisitPatch {
      participants: Some(vec![UserId(2), UserId(1), UserId(2)]),
      ..Default::default()
    };
    assert!(!patch.reorders(&visit()));
  }

  #[test]
  fn bath_change_reorders() {
    let patch = VisitPatch { bath_id: Some(BathId(8)), ..Default::default() };
    assert!(patch.reorders(&visit()));
  }

  #[test]
  fn keys_order_by_date_then_id() {
    let a = visit();
    let mut b = visit();
    b.visit_id = VisitId(0);
    assert!(b.key() < a.key());
    b.visited_at = a.visited_at + chrono::Duration::seconds(1);
    assert!(a.key() < b.key());
  }
}
