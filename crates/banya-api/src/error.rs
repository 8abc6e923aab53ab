//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use banya_core::store::DomainError;
use serde_json::json;
use thiserror::Error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("not found: {0}")]
  NotFound(String),

  #[error("bad request: {0}")]
  BadRequest(String),

  /// A domain rule rejected the request.
  #[error("{message}")]
  Domain {
    kind:    &'static str,
    message: String,
  },

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl ApiError {
  /// Surface the domain error inside a backend error, if there is one.
  pub fn from_store<E>(err: E) -> Self
  where
    E: std::error::Error + DomainError + Send + Sync + 'static,
  {
    match err.domain() {
      Some(domain) => Self::Domain { kind: domain.kind(), message: domain.to_string() },
      None => Self::Store(Box::new(err)),
    }
  }

  pub fn kind(&self) -> &'static str {
    match self {
      Self::NotFound(_) => "not_found",
      Self::BadRequest(_) => "bad_request",
      Self::Domain { kind, .. } => *kind,
      Self::Store(_) => "internal",
    }
  }

  pub fn status(&self) -> StatusCode {
    match self.kind() {
      "not_found" => StatusCode::NOT_FOUND,
      "forbidden" => StatusCode::FORBIDDEN,
      "invalid_transition" | "incomplete_visit" | "concurrent_modification"
      | "alias_cycle" => StatusCode::CONFLICT,
      "bad_request" | "configuration_invalid" | "invalid_period" | "invalid_week" => {
        StatusCode::BAD_REQUEST
      }
      _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }
}

impl From<banya_core::Error> for ApiError {
  fn from(err: banya_core::Error) -> Self {
    Self::Domain { kind: err.kind(), message: err.to_string() }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let status = self.status();
    if status.is_server_error() {
      tracing::error!(error = %self, "request failed");
    }
    let body = json!({ "error": self.to_string(), "kind": self.kind() });
    (status, Json(body)).into_response()
  }
}
