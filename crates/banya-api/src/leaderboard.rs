//! Handler for `GET /leaderboard`.

use std::sync::Arc;

use axum::{
  Json,
  extract::{Query, State},
};
use banya_core::{
  aggregate::Leaderboard,
  period::Period,
  store::VisitStore,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::error::ApiError;

/// Period selector shared by the leaderboard and the bath map.
///
/// `period` is kept as a raw string so that an unknown selector is reported
/// as `invalid_period` rather than as a generic query rejection.
#[derive(Debug, Default, Deserialize)]
pub struct PeriodParams {
  pub period: Option<String>,
  /// Reference instant; defaults to now.
  pub at:     Option<DateTime<Utc>>,
}

impl PeriodParams {
  pub fn resolve(&self) -> Result<(Period, DateTime<Utc>), ApiError> {
    let period = match self.period.as_deref() {
      Some(raw) => Period::parse(raw)?,
      None => Period::default(),
    };
    Ok((period, self.at.unwrap_or_else(Utc::now)))
  }
}

/// `GET /leaderboard[?period=week|month|year|all][&at=...]`
pub async fn handler<S: VisitStore>(
  State(store): State<Arc<S>>,
  Query(params): Query<PeriodParams>,
) -> Result<Json<Leaderboard>, ApiError> {
  let (period, reference) = params.resolve()?;
  let board = store
    .leaderboard(period, reference)
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(board))
}
