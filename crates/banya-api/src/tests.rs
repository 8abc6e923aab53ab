//! Router tests against an in-memory SQLite store.

use std::sync::Arc;

use axum::{
  Router,
  body::Body,
  http::{Request, StatusCode, header},
};
use banya_store_sqlite::SqliteStore;
use serde_json::{Value, json};
use tower::ServiceExt as _;

use crate::api_router;

async fn app() -> Router {
  let store = SqliteStore::open_in_memory().await.expect("in-memory store");
  api_router(Arc::new(store))
}

async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
  let builder = Request::builder().method(method).uri(uri);
  let req = match body {
    Some(json) => builder
      .header(header::CONTENT_TYPE, "application/json")
      .body(Body::from(json.to_string())),
    None => builder.body(Body::empty()),
  }
  .unwrap();
  let resp = app.clone().oneshot(req).await.unwrap();
  let status = resp.status();
  let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
  let value = if bytes.is_empty() {
    Value::Null
  } else {
    serde_json::from_slice(&bytes).unwrap()
  };
  (status, value)
}

/// One user, Russia/Moscow and a bath there. Returns the bath id.
async fn seed(app: &Router) -> i64 {
  let (status, _) = call(app, "POST", "/users", Some(json!({ "user_id": 1, "display_name": "Ivan" }))).await;
  assert_eq!(status, StatusCode::OK);
  let (_, country) = call(app, "POST", "/countries", Some(json!({ "name": "Russia", "code": "RU" }))).await;
  let (_, region) = call(
    app,
    "POST",
    "/regions",
    Some(json!({ "name": "Moscow", "country_id": country["country_id"] })),
  )
  .await;
  let (status, bath) = call(
    app,
    "POST",
    "/baths",
    Some(json!({ "name": "Sanduny", "location": { "region_id": region["region_id"] } })),
  )
  .await;
  assert_eq!(status, StatusCode::CREATED);
  bath["bath_id"].as_i64().unwrap()
}

async fn create_visit(app: &Router, bath: i64, visited_at: &str) -> i64 {
  let (status, visit) = call(
    app,
    "POST",
    "/visits",
    Some(json!({ "bath_id": bath, "participants": [1], "visited_at": visited_at })),
  )
  .await;
  assert_eq!(status, StatusCode::CREATED);
  assert_eq!(visit["visit"]["status"], "draft");
  visit["visit"]["visit_id"].as_i64().unwrap()
}

async fn transition(app: &Router, id: i64, to: &str, actor: &str) -> (StatusCode, Value) {
  call(
    app,
    "POST",
    &format!("/visits/{id}/transition"),
    Some(json!({ "to": to, "actor": actor })),
  )
  .await
}

#[tokio::test]
async fn confirmed_visit_shows_on_leaderboard() {
  let app = app().await;
  let bath = seed(&app).await;
  let id = create_visit(&app, bath, "2024-01-10T18:00:00Z").await;

  let (status, _) = transition(&app, id, "pending", "member").await;
  assert_eq!(status, StatusCode::OK);
  let (status, visit) = transition(&app, id, "confirmed", "admin").await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(visit["total_points"], 3.0);

  let (status, board) =
    call(&app, "GET", "/leaderboard?period=all&at=2024-01-11T00:00:00Z", None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(board["period"], "all");
  assert_eq!(board["rows"][0]["user_id"], 1);
  assert_eq!(board["rows"][0]["display_points"], 3);

  let (_, user) = call(&app, "GET", "/users/1", None).await;
  assert_eq!(user["points"], 3.0);
}

#[tokio::test]
async fn member_cannot_confirm() {
  let app = app().await;
  let bath = seed(&app).await;
  let id = create_visit(&app, bath, "2024-01-10T18:00:00Z").await;
  transition(&app, id, "pending", "member").await;

  let (status, body) = transition(&app, id, "confirmed", "member").await;
  assert_eq!(status, StatusCode::FORBIDDEN);
  assert_eq!(body["kind"], "forbidden");
}

#[tokio::test]
async fn skipping_pending_is_a_conflict() {
  let app = app().await;
  let bath = seed(&app).await;
  let id = create_visit(&app, bath, "2024-01-10T18:00:00Z").await;

  let (status, body) = transition(&app, id, "confirmed", "admin").await;
  assert_eq!(status, StatusCode::CONFLICT);
  assert_eq!(body["kind"], "invalid_transition");
}

#[tokio::test]
async fn unknown_period_is_rejected() {
  let app = app().await;
  let (status, body) = call(&app, "GET", "/leaderboard?period=fortnight", None).await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert_eq!(body["kind"], "invalid_period");

  let (status, body) = call(&app, "GET", "/baths/map?period=decade", None).await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert_eq!(body["kind"], "invalid_period");
}

#[tokio::test]
async fn weekly_requires_a_real_week() {
  let app = app().await;
  let (status, body) = call(&app, "GET", "/visits/weekly?year=2023&week=53", None).await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert_eq!(body["kind"], "invalid_week");

  let (status, body) = call(&app, "GET", "/visits/weekly?year=2024&week=2", None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["week"], json!({ "year": 2024, "week": 2 }));

  let (status, _) = call(&app, "GET", "/visits/weekly?year=2024", None).await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn settings_update_and_validation() {
  let app = app().await;
  let (_, config) = call(&app, "GET", "/settings", None).await;
  assert_eq!(config["version"], 1);
  assert_eq!(config["base_points"], 1.0);

  let (status, body) = call(&app, "PUT", "/settings", Some(json!({ "long_bonus": -2 }))).await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert_eq!(body["kind"], "configuration_invalid");

  let (status, config) = call(&app, "PUT", "/settings", Some(json!({ "base_points": 10 }))).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(config["version"], 2);
  assert_eq!(config["long_bonus"], 1.0);

  let (status, report) = call(&app, "POST", "/settings/rescore", None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(report["config_version"], 2);

  let (status, body) = call(&app, "POST", "/settings/rescore?version=7", None).await;
  assert_eq!(status, StatusCode::NOT_FOUND);
  assert_eq!(body["kind"], "not_found");
}

#[tokio::test]
async fn missing_resources_are_404() {
  let app = app().await;
  for uri in ["/visits/42", "/users/42", "/baths/42"] {
    let (status, body) = call(&app, "GET", uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND, "{uri}");
    assert_eq!(body["kind"], "not_found");
  }
}

#[tokio::test]
async fn merging_a_bath_into_itself_is_a_conflict() {
  let app = app().await;
  let bath = seed(&app).await;
  let (status, body) = call(
    &app,
    "POST",
    &format!("/baths/{bath}/merge"),
    Some(json!({ "into": bath })),
  )
  .await;
  assert_eq!(status, StatusCode::CONFLICT);
  assert_eq!(body["kind"], "alias_cycle");
}

#[tokio::test]
async fn patch_and_list_visits() {
  let app = app().await;
  let bath = seed(&app).await;
  let id = create_visit(&app, bath, "2024-01-10T18:00:00Z").await;

  let (status, visit) = call(
    &app,
    "PATCH",
    &format!("/visits/{id}"),
    Some(json!({ "flag_long": true })),
  )
  .await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(visit["visit"]["flag_long"], true);

  let (status, _) = call(&app, "PATCH", &format!("/visits/{id}"), Some(json!({}))).await;
  assert_eq!(status, StatusCode::BAD_REQUEST);

  let (status, list) = call(&app, "GET", "/visits?status=draft&user_id=1", None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(list.as_array().unwrap().len(), 1);
}
