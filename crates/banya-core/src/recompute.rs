//! Recomputation planning.
//!
//! A discovery bonus belongs to exactly one visit per
//! [`DiscoveryScope`]: the earliest eligible visit of that user to that
//! geography. When a visit's date, bath, participants or status change, the
//! holder of any scope the visit touches (before or after the change) may
//! move. This module works out which scopes are affected and how holders must
//! move; the store executes the plan inside one transaction.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::{
  bath::ResolvedBath,
  config::PointConfig,
  ids::{CountryId, RegionId, UserId, VisitId},
  scoring::{Award, PointLog, PointReason},
  visit::{Visit, VisitKey},
};

// ─── Scopes ──────────────────────────────────────────────────────────────────

/// A geography a discovery bonus is awarded for.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Geo {
  Region(RegionId),
  Country(CountryId),
}

impl Geo {
  pub fn reason(self) -> PointReason {
    match self {
      Self::Region(_) => PointReason::NewRegion,
      Self::Country(_) => PointReason::NewCountry,
    }
  }
}

/// The unit of discovery ordering and of write serialisation.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct DiscoveryScope {
  pub user_id: UserId,
  pub geo:     Geo,
}

/// What an eligible visit contributes to discovery ordering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Footprint {
  pub participants: Vec<UserId>,
  pub geos:         Vec<Geo>,
}

impl Footprint {
  /// The footprint of `visit` at `bath`, or `None` if the visit is not
  /// scoring-eligible.
  pub fn of(visit: &Visit, bath: Option<&ResolvedBath>) -> Option<Self> {
    if !visit.status.is_scoring_eligible() {
      return None;
    }
    let geos = bath
      .map(|b| {
        b.region_id
          .map(Geo::Region)
          .into_iter()
          .chain(b.country_id.map(Geo::Country))
          .collect()
      })
      .unwrap_or_default();
    Some(Self { participants: visit.participants.clone(), geos })
  }

  fn scopes(&self) -> impl Iterator<Item = DiscoveryScope> + '_ {
    self.participants.iter().flat_map(move |&user_id| {
      self.geos.iter().map(move |&geo| DiscoveryScope { user_id, geo })
    })
  }
}

/// Every scope whose holder may change when a visit goes from `before` to
/// `after`. Sorted, so locks taken in this order cannot deadlock.
pub fn affected_scopes(
  before: Option<&Footprint>,
  after: Option<&Footprint>,
) -> BTreeSet<DiscoveryScope> {
  before
    .into_iter()
    .chain(after)
    .flat_map(Footprint::scopes)
    .collect()
}

// ─── Holder rebalancing ──────────────────────────────────────────────────────

/// Current state of one scope as read inside the write transaction.
#[derive(Debug, Clone, Default)]
pub struct ScopeState {
  /// Eligible visits of the scope's user in the scope's geography.
  pub history: Vec<VisitKey>,
  /// Visits that currently carry the scope's discovery row for the user.
  pub holders: Vec<VisitId>,
}

impl ScopeState {
  /// The visit that should hold the bonus: the smallest `(visited_at, id)`.
  pub fn rightful_holder(&self) -> Option<VisitId> {
    self.history.iter().min().map(|k| k.visit_id)
  }
}

/// How a scope's holder must move.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HolderChange {
  pub scope:  DiscoveryScope,
  /// Visits whose row for this scope must be removed.
  pub revoke: Vec<VisitId>,
  /// Visit that must gain the row.
  pub grant:  Option<VisitId>,
}

impl HolderChange {
  pub fn is_noop(&self) -> bool { self.revoke.is_empty() && self.grant.is_none() }
}

/// Compare who holds the bonus with who should.
///
/// With `awarding == false` (configured amount is zero) nobody gains a row,
/// but stale holders are still revoked.
pub fn rebalance(
  scope: DiscoveryScope,
  state: &ScopeState,
  awarding: bool,
) -> Option<HolderChange> {
  let rightful = state.rightful_holder();
  let revoke: Vec<VisitId> = state
    .holders
    .iter()
    .copied()
    .filter(|&h| Some(h) != rightful)
    .collect::<BTreeSet<_>>()
    .into_iter()
    .collect();
  let grant = rightful.filter(|r| awarding && !state.holders.contains(r));

  let change = HolderChange { scope, revoke, grant };
  (!change.is_noop()).then_some(change)
}

// ─── Row edits ───────────────────────────────────────────────────────────────

/// One discovery row to drop or add on a visit.
#[derive(Debug, Clone, PartialEq)]
pub struct RowEdit {
  pub user_id: UserId,
  pub reason:  PointReason,
  /// `Some(points)` adds the row, `None` removes it.
  pub grant:   Option<f64>,
}

/// Group holder changes by the visit they touch.
pub fn row_edits(
  changes: &[HolderChange],
  config: &PointConfig,
) -> BTreeMap<VisitId, Vec<RowEdit>> {
  let mut edits: BTreeMap<VisitId, Vec<RowEdit>> = BTreeMap::new();
  for change in changes {
    let user_id = change.scope.user_id;
    let reason = change.scope.geo.reason();
    for &visit_id in &change.revoke {
      edits.entry(visit_id).or_default().push(RowEdit { user_id, reason, grant: None });
    }
    if let Some(visit_id) = change.grant {
      edits.entry(visit_id).or_default().push(RowEdit {
        user_id,
        reason,
        grant: Some(config.amount(reason)),
      });
    }
  }
  edits
}

/// The replacement row set of a visit after `edits`.
///
/// Rows not named by an edit are kept verbatim. Returns the kept rows and the
/// awards to insert.
pub fn revise_rows(
  existing: &[PointLog],
  edits: &[RowEdit],
) -> (Vec<PointLog>, Vec<Award>) {
  let touched = |log: &PointLog| {
    edits
      .iter()
      .any(|e| e.user_id == log.user_id && e.reason == log.reason)
  };
  let kept = existing.iter().filter(|l| !touched(l)).cloned().collect();
  let added = edits
    .iter()
    .filter_map(|e| {
      e.grant.map(|points| Award { user_id: e.user_id, reason: e.reason, points })
    })
    .collect();
  (kept, added)
}
