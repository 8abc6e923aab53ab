//! Handlers for `/users` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/users` | Body: [`NewUser`]; creates or refreshes the user |
//! | `GET`  | `/users/{id}` | 404 if not found |
//! | `PUT`  | `/users/{id}/flags` | Body: `{"is_admin":true}` and/or `{"is_active":false}` |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, State},
};
use banya_core::{
  ids::UserId,
  store::VisitStore,
  user::{NewUser, User, UserFlags},
};

use crate::error::ApiError;

/// `POST /users`
pub async fn upsert<S: VisitStore>(
  State(store): State<Arc<S>>,
  Json(body): Json<NewUser>,
) -> Result<Json<User>, ApiError> {
  let user = store.upsert_user(body).await.map_err(ApiError::from_store)?;
  Ok(Json(user))
}

/// `GET /users/{id}`
pub async fn get_one<S: VisitStore>(
  State(store): State<Arc<S>>,
  Path(id): Path<UserId>,
) -> Result<Json<User>, ApiError> {
  let user = store
    .get_user(id)
    .await
    .map_err(ApiError::from_store)?
    .ok_or_else(|| ApiError::NotFound(format!("user {id} not found")))?;
  Ok(Json(user))
}

/// `PUT /users/{id}/flags`
pub async fn set_flags<S: VisitStore>(
  State(store): State<Arc<S>>,
  Path(id): Path<UserId>,
  Json(flags): Json<UserFlags>,
) -> Result<Json<User>, ApiError> {
  let user = store
    .set_user_flags(id, flags)
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(user))
}
