//! The `VisitStore` trait.
//!
//! Implemented by storage backends (e.g. `banya-store-sqlite`). The HTTP layer
//! depends on this abstraction only.
//!
//! Every write that can change point-log rows runs the whole recomputation
//! batch before it returns: a read issued after a successful write always
//! observes the new rows.

use std::future::Future;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  aggregate::{BathMap, Leaderboard, WeeklyLeaderboard},
  bath::{Bath, Country, NewBath, NewCountry, NewRegion, Region, ResolvedBath},
  config::{PointConfig, PointConfigUpdate},
  ids::{BathId, UserId, VisitId},
  period::{IsoWeek, Period},
  user::{NewUser, User, UserFlags},
  visit::{NewVisit, VisitDetail, VisitPatch, VisitQuery, VisitStatus},
  workflow::Actor,
};

/// Lets callers reach the domain error inside a backend error.
pub trait DomainError {
  fn domain(&self) -> Option<&crate::Error>;
}

/// Outcome of [`VisitStore::rescore_all`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RescoreReport {
  pub batch_id:       Uuid,
  pub config_version: u32,
  pub visits:         u32,
  pub point_logs:     u32,
}

/// Abstraction over a visit store backend.
pub trait VisitStore: Send + Sync {
  type Error: std::error::Error + DomainError + Send + Sync + 'static;

  // ── Users ─────────────────────────────────────────────────────────────

  /// Create the user, or refresh its username and display name.
  fn upsert_user(
    &self,
    input: NewUser,
  ) -> impl Future<Output = Result<User, Self::Error>> + Send + '_;

  fn get_user(
    &self,
    id: UserId,
  ) -> impl Future<Output = Result<Option<User>, Self::Error>> + Send + '_;

  fn set_user_flags(
    &self,
    id: UserId,
    flags: UserFlags,
  ) -> impl Future<Output = Result<User, Self::Error>> + Send + '_;

  // ── Reference data ────────────────────────────────────────────────────

  fn add_country(
    &self,
    input: NewCountry,
  ) -> impl Future<Output = Result<Country, Self::Error>> + Send + '_;

  fn add_region(
    &self,
    input: NewRegion,
  ) -> impl Future<Output = Result<Region, Self::Error>> + Send + '_;

  fn add_bath(
    &self,
    input: NewBath,
  ) -> impl Future<Output = Result<Bath, Self::Error>> + Send + '_;

  fn get_bath(
    &self,
    id: BathId,
  ) -> impl Future<Output = Result<Option<Bath>, Self::Error>> + Send + '_;

  /// Follow alias links to the canonical bath and return its scoring view.
  fn resolve_bath(
    &self,
    id: BathId,
  ) -> impl Future<Output = Result<ResolvedBath, Self::Error>> + Send + '_;

  /// Mark `source` as a duplicate of `target`, move its visits to the
  /// canonical bath and rescore every affected confirmed visit. Returns the
  /// canonical bath.
  fn merge_baths(
    &self,
    source: BathId,
    target: BathId,
  ) -> impl Future<Output = Result<Bath, Self::Error>> + Send + '_;

  // ── Visits ────────────────────────────────────────────────────────────

  /// Record a new visit in [`VisitStatus::Draft`].
  fn create_visit(
    &self,
    input: NewVisit,
  ) -> impl Future<Output = Result<VisitDetail, Self::Error>> + Send + '_;

  fn get_visit(
    &self,
    id: VisitId,
  ) -> impl Future<Output = Result<Option<VisitDetail>, Self::Error>> + Send + '_;

  /// Newest `visited_at` first.
  fn list_visits<'a>(
    &'a self,
    query: &'a VisitQuery,
  ) -> impl Future<Output = Result<Vec<VisitDetail>, Self::Error>> + Send + 'a;

  /// Edit a visit. On a confirmed visit, date, bath and participant changes
  /// are coordinated as delete-then-reinsert.
  fn update_visit(
    &self,
    id: VisitId,
    patch: VisitPatch,
  ) -> impl Future<Output = Result<VisitDetail, Self::Error>> + Send + '_;

  /// Move a visit through the workflow, scoring or unscoring it as needed.
  fn transition(
    &self,
    id: VisitId,
    to: VisitStatus,
    actor: Actor,
  ) -> impl Future<Output = Result<VisitDetail, Self::Error>> + Send + '_;

  // ── Point configuration ───────────────────────────────────────────────

  fn current_config(
    &self,
  ) -> impl Future<Output = Result<PointConfig, Self::Error>> + Send + '_;

  /// Append a new configuration snapshot. Stored rows are not rescored.
  fn update_config(
    &self,
    update: PointConfigUpdate,
  ) -> impl Future<Output = Result<PointConfig, Self::Error>> + Send + '_;

  /// Rescore every confirmed visit against `version` (default: latest).
  fn rescore_all(
    &self,
    version: Option<u32>,
  ) -> impl Future<Output = Result<RescoreReport, Self::Error>> + Send + '_;

  // ── Aggregation ───────────────────────────────────────────────────────

  fn leaderboard(
    &self,
    period: Period,
    reference: DateTime<Utc>,
  ) -> impl Future<Output = Result<Leaderboard, Self::Error>> + Send + '_;

  fn bath_map(
    &self,
    period: Period,
    reference: DateTime<Utc>,
  ) -> impl Future<Output = Result<BathMap, Self::Error>> + Send + '_;

  fn weekly_visits(
    &self,
    week: IsoWeek,
  ) -> impl Future<Output = Result<WeeklyLeaderboard, Self::Error>> + Send + '_;
}
