//! Handlers for reference data and the bath map.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/countries` | Body: [`NewCountry`]; returns 201 |
//! | `POST` | `/regions` | Body: [`NewRegion`]; returns 201 |
//! | `POST` | `/baths` | Body: [`NewBath`]; returns 201 |
//! | `GET`  | `/baths/{id}` | 404 if not found |
//! | `POST` | `/baths/{id}/merge` | Body: `{"into": <bath id>}` |
//! | `GET`  | `/baths/map` | `?period=week\|month\|year\|all`, optional `at` |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use banya_core::{
  aggregate::BathMap,
  bath::{Bath, NewBath, NewCountry, NewRegion},
  ids::BathId,
  store::VisitStore,
};
use serde::Deserialize;

use crate::{error::ApiError, leaderboard::PeriodParams};

// ─── Reference data ──────────────────────────────────────────────────────────

/// `POST /countries`
pub async fn add_country<S: VisitStore>(
  State(store): State<Arc<S>>,
  Json(body): Json<NewCountry>,
) -> Result<impl IntoResponse, ApiError> {
  let country = store.add_country(body).await.map_err(ApiError::from_store)?;
  Ok((StatusCode::CREATED, Json(country)))
}

/// `POST /regions`
pub async fn add_region<S: VisitStore>(
  State(store): State<Arc<S>>,
  Json(body): Json<NewRegion>,
) -> Result<impl IntoResponse, ApiError> {
  let region = store.add_region(body).await.map_err(ApiError::from_store)?;
  Ok((StatusCode::CREATED, Json(region)))
}

/// `POST /baths`
pub async fn add_bath<S: VisitStore>(
  State(store): State<Arc<S>>,
  Json(body): Json<NewBath>,
) -> Result<impl IntoResponse, ApiError> {
  if body.name.trim().is_empty() {
    return Err(ApiError::BadRequest("bath name must not be empty".into()));
  }
  let bath = store.add_bath(body).await.map_err(ApiError::from_store)?;
  Ok((StatusCode::CREATED, Json(bath)))
}

/// `GET /baths/{id}`
pub async fn get_one<S: VisitStore>(
  State(store): State<Arc<S>>,
  Path(id): Path<BathId>,
) -> Result<Json<Bath>, ApiError> {
  let bath = store
    .get_bath(id)
    .await
    .map_err(ApiError::from_store)?
    .ok_or_else(|| ApiError::NotFound(format!("bath {id} not found")))?;
  Ok(Json(bath))
}

// ─── Merge ───────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct MergeBody {
  /// The bath `{id}` duplicates.
  pub into: BathId,
}

/// `POST /baths/{id}/merge`; returns the canonical bath.
pub async fn merge<S: VisitStore>(
  State(store): State<Arc<S>>,
  Path(source): Path<BathId>,
  Json(body): Json<MergeBody>,
) -> Result<Json<Bath>, ApiError> {
  let bath = store
    .merge_baths(source, body.into)
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(bath))
}

// ─── Map ─────────────────────────────────────────────────────────────────────

/// `GET /baths/map[?period=...][&at=...]`
pub async fn map<S: VisitStore>(
  State(store): State<Arc<S>>,
  Query(params): Query<PeriodParams>,
) -> Result<Json<BathMap>, ApiError> {
  let (period, reference) = params.resolve()?;
  let map = store
    .bath_map(period, reference)
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(map))
}
