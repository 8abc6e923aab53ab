//! Handlers for `/visits` endpoints.
//!
//! | Method  | Path | Notes |
//! |---------|------|-------|
//! | `POST`  | `/visits` | Body: [`NewVisit`]; returns 201 + the draft visit |
//! | `GET`   | `/visits` | Filters: `status`, `bath_id`, `user_id`, `date_from`, `date_to`, `limit`, `offset` |
//! | `GET`   | `/visits/{id}` | Visit with its point-log rows |
//! | `PATCH` | `/visits/{id}` | Body: [`VisitPatch`] |
//! | `POST`  | `/visits/{id}/transition` | Body: `{"to":"confirmed","actor":"admin"}` |
//! | `GET`   | `/visits/weekly` | `?year=&week=`; defaults to the current ISO week |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use banya_core::{
  aggregate::WeeklyLeaderboard,
  ids::VisitId,
  period::IsoWeek,
  store::VisitStore,
  visit::{NewVisit, VisitDetail, VisitPatch, VisitQuery, VisitStatus},
  workflow::Actor,
};
use chrono::Utc;
use serde::Deserialize;
use tracing::debug;

use crate::error::ApiError;

// ─── Create ──────────────────────────────────────────────────────────────────

/// `POST /visits`
pub async fn create<S: VisitStore>(
  State(store): State<Arc<S>>,
  Json(body): Json<NewVisit>,
) -> Result<impl IntoResponse, ApiError> {
  let visit = store.create_visit(body).await.map_err(ApiError::from_store)?;
  Ok((StatusCode::CREATED, Json(visit)))
}

// ─── List ────────────────────────────────────────────────────────────────────

/// `GET /visits[?status=...][&user_id=...][&limit=...]`
pub async fn list<S: VisitStore>(
  State(store): State<Arc<S>>,
  Query(query): Query<VisitQuery>,
) -> Result<Json<Vec<VisitDetail>>, ApiError> {
  if let (Some(from), Some(to)) = (query.date_from, query.date_to)
    && from > to
  {
    return Err(ApiError::BadRequest("date_from is after date_to".into()));
  }
  let visits = store.list_visits(&query).await.map_err(ApiError::from_store)?;
  Ok(Json(visits))
}

// ─── Get / edit ──────────────────────────────────────────────────────────────

/// `GET /visits/{id}`
pub async fn get_one<S: VisitStore>(
  State(store): State<Arc<S>>,
  Path(id): Path<VisitId>,
) -> Result<Json<VisitDetail>, ApiError> {
  let visit = store
    .get_visit(id)
    .await
    .map_err(ApiError::from_store)?
    .ok_or_else(|| ApiError::NotFound(format!("visit {id} not found")))?;
  Ok(Json(visit))
}

/// `PATCH /visits/{id}`
pub async fn update<S: VisitStore>(
  State(store): State<Arc<S>>,
  Path(id): Path<VisitId>,
  Json(patch): Json<VisitPatch>,
) -> Result<Json<VisitDetail>, ApiError> {
  if patch.is_empty() {
    return Err(ApiError::BadRequest("patch changes nothing".into()));
  }
  let visit = store
    .update_visit(id, patch)
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(visit))
}

// ─── Transition ──────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct TransitionBody {
  pub to:    VisitStatus,
  #[serde(default)]
  pub actor: Actor,
}

/// `POST /visits/{id}/transition`
pub async fn transition<S: VisitStore>(
  State(store): State<Arc<S>>,
  Path(id): Path<VisitId>,
  Json(body): Json<TransitionBody>,
) -> Result<Json<VisitDetail>, ApiError> {
  debug!(visit_id = %id, to = %body.to, actor = %body.actor, "transition requested");
  let visit = store
    .transition(id, body.to, body.actor)
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(visit))
}

// ─── Weekly ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct WeekParams {
  pub year: Option<i32>,
  pub week: Option<u32>,
}

/// `GET /visits/weekly[?year=2024&week=2]`
pub async fn weekly<S: VisitStore>(
  State(store): State<Arc<S>>,
  Query(params): Query<WeekParams>,
) -> Result<Json<WeeklyLeaderboard>, ApiError> {
  let week = match (params.year, params.week) {
    (Some(year), Some(week)) => IsoWeek::new(year, week)?,
    (None, None) => IsoWeek::containing(Utc::now()),
    _ => return Err(ApiError::BadRequest("give both year and week, or neither".into())),
  };
  let board = store.weekly_visits(week).await.map_err(ApiError::from_store)?;
  Ok(Json(board))
}
