//! Handlers for `/settings`: the point configuration.

use std::sync::Arc;

use axum::{
  Json,
  extract::{Query, State},
};
use banya_core::{
  config::{PointConfig, PointConfigUpdate},
  store::{RescoreReport, VisitStore},
};
use serde::Deserialize;

use crate::error::ApiError;

/// `GET /settings`
pub async fn current<S: VisitStore>(
  State(store): State<Arc<S>>,
) -> Result<Json<PointConfig>, ApiError> {
  let config = store.current_config().await.map_err(ApiError::from_store)?;
  Ok(Json(config))
}

/// `PUT /settings`; amounts left out keep their current value.
pub async fn update<S: VisitStore>(
  State(store): State<Arc<S>>,
  Json(update): Json<PointConfigUpdate>,
) -> Result<Json<PointConfig>, ApiError> {
  let config = store
    .update_config(update)
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(config))
}

#[derive(Debug, Default, Deserialize)]
pub struct RescoreParams {
  /// Configuration snapshot to score with; defaults to the latest.
  pub version: Option<u32>,
}

/// `POST /settings/rescore[?version=N]`
pub async fn rescore<S: VisitStore>(
  State(store): State<Arc<S>>,
  Query(params): Query<RescoreParams>,
) -> Result<Json<RescoreReport>, ApiError> {
  let report = store
    .rescore_all(params.version)
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(report))
}
