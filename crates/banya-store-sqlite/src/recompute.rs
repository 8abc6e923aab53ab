//! The recomputation coordinator.
//!
//! Runs inside the caller's transaction. A batch rescores the visits that
//! changed, then moves discovery rows between the other visits of every
//! affected scope so that each scope is held by its earliest eligible visit.
//! Rows on visits outside the batch are only ever dropped or added one at a
//! time; everything else they carry is kept verbatim.

use std::collections::BTreeSet;

use banya_core::{
  bath::ResolvedBath,
  config::PointConfig,
  ids::{UserId, VisitId},
  recompute::{Footprint, affected_scopes, rebalance, revise_rows, row_edits},
  scoring::{self, Batch, PointLog},
  visit::Visit,
};
use rusqlite::Connection;
use tracing::{debug, info};

use crate::{Result, sql};

/// A visit whose stored state was just changed by the current transaction.
#[derive(Debug, Clone)]
pub struct Changed {
  pub visit_id: VisitId,
  /// The visit's footprint before the change.
  pub before:   Option<Footprint>,
  /// False when only the visit's own awards can change (e.g. `flag_long`).
  pub reorders: bool,
}

#[derive(Debug)]
pub struct Outcome {
  pub batch:    Batch,
  /// Visits whose rows were rebuilt from scratch.
  pub rescored: usize,
  /// Other visits that lost or gained a discovery row.
  pub revised:  usize,
}

/// Score `visit` from scratch and insert its rows. The visit must have no rows.
fn score_visit(
  conn: &Connection,
  visit: &Visit,
  bath: Option<&ResolvedBath>,
  config: &PointConfig,
  batch: &Batch,
) -> Result<usize> {
  let histories = match bath {
    Some(bath) => visit
      .participants
      .iter()
      .map(|&user| sql::participant_history(conn, user, bath))
      .collect::<Result<Vec<_>>>()?,
    None => Vec::new(),
  };
  let logs: Vec<PointLog> = scoring::score(visit, bath, &histories, config)
    .into_iter()
    .map(|award| PointLog::from_award(visit.visit_id, award, batch))
    .collect();
  sql::insert_point_logs(conn, &logs)?;
  Ok(logs.len())
}

/// Run one batch over `changes` with `config`.
pub fn run(conn: &Connection, changes: &[Changed], config: &PointConfig) -> Result<Outcome> {
  let batch = Batch::new(config);
  let mut scopes = BTreeSet::new();
  let mut users: BTreeSet<UserId> = BTreeSet::new();

  for change in changes {
    let visit = sql::require_visit(conn, change.visit_id)?;
    let bath = visit.bath_id.map(|id| sql::resolve_bath(conn, id)).transpose()?;
    sql::set_flag_ultraunique(
      conn,
      visit.visit_id,
      bath.as_ref().is_some_and(|b| b.ultra_unique),
    )?;

    sql::delete_point_logs(conn, visit.visit_id)?;
    if visit.status.is_scoring_eligible() {
      score_visit(conn, &visit, bath.as_ref(), config, &batch)?;
    }

    if change.reorders {
      let after = Footprint::of(&visit, bath.as_ref());
      scopes.extend(affected_scopes(change.before.as_ref(), after.as_ref()));
    }
    users.extend(visit.participants.iter().copied());
    if let Some(before) = &change.before {
      users.extend(before.participants.iter().copied());
    }
  }

  let mut moves = Vec::new();
  for &scope in &scopes {
    let state = sql::scope_state(conn, scope)?;
    let awarding = config.amount(scope.geo.reason()) > 0.0;
    if let Some(change) = rebalance(scope, &state, awarding) {
      debug!(?change, "moving discovery row");
      moves.push(change);
    }
  }

  let edits = row_edits(&moves, config);
  for (&visit_id, visit_edits) in &edits {
    let existing = sql::load_point_logs(conn, visit_id)?;
    let (kept, added) = revise_rows(&existing, visit_edits);
    let rows: Vec<PointLog> = kept
      .into_iter()
      .chain(added.into_iter().map(|award| PointLog::from_award(visit_id, award, &batch)))
      .collect();
    sql::delete_point_logs(conn, visit_id)?;
    sql::insert_point_logs(conn, &rows)?;
  }

  sql::refresh_user_totals(conn, &users)?;

  info!(
    batch_id = %batch.batch_id,
    config_version = batch.config_version,
    rescored = changes.len(),
    revised = edits.len(),
    scopes = scopes.len(),
    "recomputed point logs"
  );

  Ok(Outcome { batch, rescored: changes.len(), revised: edits.len() })
}

/// Rebuild every confirmed visit's rows from `config`.
///
/// Each visit is scored against the full stored history, so every discovery
/// row lands on its scope's earliest visit without any rebalancing.
pub fn run_all(conn: &Connection, config: &PointConfig) -> Result<(Batch, usize, usize)> {
  let batch = Batch::new(config);
  conn.execute("DELETE FROM point_logs", [])?;

  let ids = sql::confirmed_visit_ids(conn)?;
  let mut rows = 0;
  for &id in &ids {
    let visit = sql::require_visit(conn, id)?;
    let bath = visit.bath_id.map(|b| sql::resolve_bath(conn, b)).transpose()?;
    sql::set_flag_ultraunique(conn, id, bath.as_ref().is_some_and(|b| b.ultra_unique))?;
    rows += score_visit(conn, &visit, bath.as_ref(), config, &batch)?;
  }
  sql::refresh_all_user_totals(conn)?;

  info!(
    batch_id = %batch.batch_id,
    config_version = batch.config_version,
    visits = ids.len(),
    rows,
    "rescored all visits"
  );
  Ok((batch, ids.len(), rows))
}
