//! The Scoring Engine.
//!
//! [`score`] turns one visit into its point awards. It is pure: given the same
//! visit, bath, participant histories and configuration snapshot it always
//! returns the same awards in the same order.
//!
//! The discovery bonuses (`new_region`, `new_country`) depend on history: a
//! participant earns one only if no other eligible visit of theirs to the same
//! geography sorts before this one by [`VisitKey`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};
use uuid::Uuid;

use crate::{
  bath::ResolvedBath,
  config::PointConfig,
  ids::{CountryId, RegionId, UserId, VisitId},
  visit::{Visit, VisitKey},
};

// ─── Reasons ─────────────────────────────────────────────────────────────────

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  PartialOrd,
  Ord,
  Hash,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PointReason {
  Base,
  Long,
  Ultraunique,
  NewRegion,
  NewCountry,
}

impl PointReason {
  pub fn as_str(self) -> &'static str { self.into() }

  pub fn is_discovery(self) -> bool {
    matches!(self, Self::NewRegion | Self::NewCountry)
  }
}

// ─── Awards and stored rows ──────────────────────────────────────────────────

/// A single computed award, before it is persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Award {
  pub user_id: UserId,
  pub reason:  PointReason,
  pub points:  f64,
}

/// A persisted award. Rows are immutable; a visit's whole row set is replaced
/// when it is rescored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointLog {
  pub log_id:         Uuid,
  pub visit_id:       VisitId,
  pub user_id:        UserId,
  pub reason:         PointReason,
  pub points:         f64,
  /// The recomputation batch that wrote this row.
  pub batch_id:       Uuid,
  /// The configuration snapshot the amount was taken from.
  pub config_version: u32,
  pub created_at:     DateTime<Utc>,
}

impl PointLog {
  pub fn from_award(
    visit_id: VisitId,
    award: Award,
    batch: &Batch,
  ) -> Self {
    Self {
      log_id: Uuid::new_v4(),
      visit_id,
      user_id: award.user_id,
      reason: award.reason,
      points: award.points,
      batch_id: batch.batch_id,
      config_version: batch.config_version,
      created_at: batch.started_at,
    }
  }

  pub fn award(&self) -> Award {
    Award { user_id: self.user_id, reason: self.reason, points: self.points }
  }
}

/// Identity shared by every row written in one atomic recomputation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Batch {
  pub batch_id:       Uuid,
  pub config_version: u32,
  pub started_at:     DateTime<Utc>,
}

impl Batch {
  pub fn new(config: &PointConfig) -> Self {
    Self {
      batch_id:       Uuid::new_v4(),
      config_version: config.version,
      started_at:     Utc::now(),
    }
  }
}

// ─── History ─────────────────────────────────────────────────────────────────

/// One eligible visit in a participant's history, reduced to what the
/// discovery rules need.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
  pub key:        VisitKey,
  pub region_id:  Option<RegionId>,
  pub country_id: Option<CountryId>,
}

/// A participant's eligible visits. May include the visit being scored; it is
/// skipped by id. Order does not matter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantHistory {
  pub user_id: UserId,
  pub visits:  Vec<HistoryEntry>,
}

impl ParticipantHistory {
  pub fn new(user_id: UserId, visits: Vec<HistoryEntry>) -> Self {
    Self { user_id, visits }
  }

  /// True iff no other visit matching `in_geo` sorts before `key`.
  fn is_first<F>(&self, key: VisitKey, in_geo: F) -> bool
  where
    F: Fn(&HistoryEntry) -> bool,
  {
    !self
      .visits
      .iter()
      .filter(|e| e.key.visit_id != key.visit_id)
      .any(|e| e.key < key && in_geo(e))
  }

  pub fn is_first_in_region(&self, key: VisitKey, region: RegionId) -> bool {
    self.is_first(key, |e| e.region_id == Some(region))
  }

  pub fn is_first_in_country(&self, key: VisitKey, country: CountryId) -> bool {
    self.is_first(key, |e| e.country_id == Some(country))
  }
}

// ─── Engine ──────────────────────────────────────────────────────────────────

/// Compute every award for `visit`.
///
/// - `bath` is the resolved canonical bath, or `None` if none is assigned
///   (no discovery or ultra-unique bonuses then).
/// - `histories` holds each participant's eligible visits; a participant with
///   no entry is treated as having no other visits.
///
/// `base` is always awarded; every other reason is skipped when its
/// configured amount is zero. A visit without participants yields nothing.
pub fn score(
  visit: &Visit,
  bath: Option<&ResolvedBath>,
  histories: &[ParticipantHistory],
  config: &PointConfig,
) -> Vec<Award> {
  let key = visit.key();
  let mut awards = Vec::new();

  for &user_id in &visit.participants {
    let mut push = |reason: PointReason| {
      let points = config.amount(reason);
      if reason == PointReason::Base || points > 0.0 {
        awards.push(Award { user_id, reason, points });
      }
    };

    push(PointReason::Base);

    if visit.flag_long {
      push(PointReason::Long);
    }

    let Some(bath) = bath else { continue };

    if bath.ultra_unique {
      push(PointReason::Ultraunique);
    }

    let empty = ParticipantHistory::new(user_id, Vec::new());
    let history = histories
      .iter()
      .find(|h| h.user_id == user_id)
      .unwrap_or(&empty);

    if let Some(region) = bath.region_id
      && history.is_first_in_region(key, region)
    {
      push(PointReason::NewRegion);
    }
    if let Some(country) = bath.country_id
      && history.is_first_in_country(key, country)
    {
      push(PointReason::NewCountry);
    }
  }

  awards
}

/// Sum of a set of awards at full precision.
pub fn total(awards: &[Award]) -> f64 { awards.iter().map(|a| a.points).sum() }

/// Round a stored total for display.
pub fn display_points(points: f64) -> i64 { points.round() as i64 }

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;
  use crate::{
    ids::BathId,
    visit::VisitStatus,
  };

  fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
  }

  fn visit(id: i64, when: DateTime<Utc>, participants: &[i64]) -> Visit {
    Visit {
      visit_id:         VisitId(id),
      bath_id:          Some(BathId(1)),
      participants:     participants.iter().copied().map(UserId).collect(),
      created_by:       None,
      status:           VisitStatus::Confirmed,
      visited_at:       when,
      flag_long:        false,
      flag_ultraunique: false,
      revision:         1,
      created_at:       when,
      updated_at:       when,
    }
  }

  fn moscow() -> ResolvedBath {
    ResolvedBath {
      bath_id:      BathId(1),
      region_id:    Some(RegionId(10)),
      country_id:   Some(CountryId(100)),
      ultra_unique: false,
    }
  }

  fn config(base: f64, long: f64, ultra: f64) -> PointConfig {
    PointConfig {
      base_points: base,
      long_bonus: long,
      ultraunique_bonus: ultra,
      ..PointConfig::initial(Utc::now())
    }
  }

  fn reasons(awards: &[Award], user: i64) -> Vec<PointReason> {
    awards
      .iter()
      .filter(|a| a.user_id == UserId(user))
      .map(|a| a.reason)
      .collect()
  }

  #[test]
  fn long_ultraunique_visit_totals_35() {
    let mut v = visit(1, at(2024, 1, 10), &[1]);
    v.flag_long = true;
    let bath = ResolvedBath { region_id: None, country_id: None, ultra_unique: true, ..moscow() };

    let awards = score(&v, Some(&bath), &[], &config(10.0, 5.0, 20.0));
    assert_eq!(total(&awards), 35.0);
    assert_eq!(
      reasons(&awards, 1),
      vec![PointReason::Base, PointReason::Long, PointReason::Ultraunique]
    );
  }

  #[test]
  fn first_visit_gets_discovery_bonuses() {
    let v = visit(1, at(2024, 1, 10), &[1]);
    let awards = score(&v, Some(&moscow()), &[], &PointConfig::initial(Utc::now()));
    assert_eq!(
      reasons(&awards, 1),
      vec![PointReason::Base, PointReason::NewRegion, PointReason::NewCountry]
    );
  }

  #[test]
  fn earlier_history_blocks_discovery() {
    let v = visit(2, at(2024, 1, 10), &[1]);
    let history = ParticipantHistory::new(UserId(1), vec![HistoryEntry {
      key:        VisitKey { visited_at: at(2024, 1, 5), visit_id: VisitId(9) },
      region_id:  Some(RegionId(10)),
      country_id: Some(CountryId(100)),
    }]);

    let awards = score(&v, Some(&moscow()), &[history], &PointConfig::initial(Utc::now()));
    assert_eq!(reasons(&awards, 1), vec![PointReason::Base]);
  }

  #[test]
  fn later_history_does_not_block_discovery() {
    let v = visit(2, at(2024, 1, 5), &[1]);
    let history = ParticipantHistory::new(UserId(1), vec![HistoryEntry {
      key:        VisitKey { visited_at: at(2024, 1, 10), visit_id: VisitId(1) },
      region_id:  Some(RegionId(10)),
      country_id: Some(CountryId(100)),
    }]);

    let awards = score(&v, Some(&moscow()), &[history], &PointConfig::initial(Utc::now()));
    assert!(reasons(&awards, 1).contains(&PointReason::NewRegion));
    assert!(reasons(&awards, 1).contains(&PointReason::NewCountry));
  }

  #[test]
  fn same_instant_ties_break_by_visit_id() {
    let when = at(2024, 1, 10);
    let history = ParticipantHistory::new(UserId(1), vec![
      HistoryEntry {
        key:        VisitKey { visited_at: when, visit_id: VisitId(3) },
        region_id:  Some(RegionId(10)),
        country_id: Some(CountryId(100)),
      },
      HistoryEntry {
        key:        VisitKey { visited_at: when, visit_id: VisitId(5) },
        region_id:  Some(RegionId(10)),
        country_id: Some(CountryId(100)),
      },
    ]);
    let cfg = PointConfig::initial(Utc::now());

    let lower = score(&visit(3, when, &[1]), Some(&moscow()), &[history.clone()], &cfg);
    let higher = score(&visit(5, when, &[1]), Some(&moscow()), &[history], &cfg);
    assert!(reasons(&lower, 1).contains(&PointReason::NewRegion));
    assert!(!reasons(&higher, 1).contains(&PointReason::NewRegion));
  }

  #[test]
  fn other_region_same_country_only_blocks_country_bonus() {
    let v = visit(2, at(2024, 2, 1), &[1]);
    let history = ParticipantHistory::new(UserId(1), vec![HistoryEntry {
      key:        VisitKey { visited_at: at(2024, 1, 1), visit_id: VisitId(1) },
      region_id:  Some(RegionId(11)),
      country_id: Some(CountryId(100)),
    }]);

    let awards = score(&v, Some(&moscow()), &[history], &PointConfig::initial(Utc::now()));
    assert_eq!(reasons(&awards, 1), vec![PointReason::Base, PointReason::NewRegion]);
  }

  #[test]
  fn histories_are_per_participant() {
    let v = visit(2, at(2024, 2, 1), &[1, 2]);
    let history = ParticipantHistory::new(UserId(1), vec![HistoryEntry {
      key:        VisitKey { visited_at: at(2024, 1, 1), visit_id: VisitId(1) },
      region_id:  Some(RegionId(10)),
      country_id: Some(CountryId(100)),
    }]);

    let awards = score(&v, Some(&moscow()), &[history], &PointConfig::initial(Utc::now()));
    assert_eq!(reasons(&awards, 1), vec![PointReason::Base]);
    assert_eq!(
      reasons(&awards, 2),
      vec![PointReason::Base, PointReason::NewRegion, PointReason::NewCountry]
    );
  }

  #[test]
  fn no_bath_means_no_location_bonuses() {
    let mut v = visit(1, at(2024, 1, 10), &[1]);
    v.bath_id = None;
    v.flag_long = true;
    let awards = score(&v, None, &[], &PointConfig::initial(Utc::now()));
    assert_eq!(reasons(&awards, 1), vec![PointReason::Base, PointReason::Long]);
  }

  #[test]
  fn no_participants_yields_nothing() {
    let v = visit(1, at(2024, 1, 10), &[]);
    assert!(score(&v, Some(&moscow()), &[], &PointConfig::initial(Utc::now())).is_empty());
  }

  #[test]
  fn zero_bonus_is_skipped_but_zero_base_is_kept() {
    let mut v = visit(1, at(2024, 1, 10), &[1]);
    v.flag_long = true;
    let cfg = config(0.0, 0.0, 0.0);
    let awards = score(&v, None, &[], &cfg);
    assert_eq!(awards, vec![Award { user_id: UserId(1), reason: PointReason::Base, points: 0.0 }]);
  }

  #[test]
  fn scoring_is_idempotent() {
    let mut v = visit(4, at(2024, 3, 3), &[2, 1]);
    v.flag_long = true;
    let history = ParticipantHistory::new(UserId(2), vec![HistoryEntry {
      key:        VisitKey { visited_at: at(2024, 1, 1), visit_id: VisitId(1) },
      region_id:  Some(RegionId(10)),
      country_id: None,
    }]);
    let cfg = PointConfig::initial(Utc::now());
    let first = score(&v, Some(&moscow()), &[history.clone()], &cfg);
    let second = score(&v, Some(&moscow()), &[history], &cfg);
    assert_eq!(first, second);
  }

  #[test]
  fn display_rounds_to_nearest() {
    assert_eq!(display_points(2.5), 3);
    assert_eq!(display_points(2.49), 2);
  }
}
