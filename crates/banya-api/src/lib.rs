//! JSON REST API for the banya visit tracker.
//!
//! Exposes an axum [`Router`] backed by any [`banya_core::store::VisitStore`].
//! Authentication, TLS and transport concerns are the caller's
//! responsibility; the acting role of a transition is part of its body.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", banya_api::api_router(store.clone()))
//! ```

pub mod baths;
pub mod error;
pub mod leaderboard;
pub mod settings;
pub mod users;
pub mod visits;

use std::sync::Arc;

use axum::{
  Router,
  routing::{get, post, put},
};
use banya_core::store::VisitStore;

pub use error::ApiError;

/// Build a fully-materialised API router for `store`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S>(store: Arc<S>) -> Router<()>
where
  S: VisitStore + 'static,
{
  Router::new()
    // Users
    .route("/users", post(users::upsert::<S>))
    .route("/users/{id}", get(users::get_one::<S>))
    .route("/users/{id}/flags", put(users::set_flags::<S>))
    // Reference data
    .route("/countries", post(baths::add_country::<S>))
    .route("/regions", post(baths::add_region::<S>))
    .route("/baths", post(baths::add_bath::<S>))
    .route("/baths/map", get(baths::map::<S>))
    .route("/baths/{id}", get(baths::get_one::<S>))
    .route("/baths/{id}/merge", post(baths::merge::<S>))
    // Visits
    .route("/visits", get(visits::list::<S>).post(visits::create::<S>))
    .route("/visits/weekly", get(visits::weekly::<S>))
    .route("/visits/{id}", get(visits::get_one::<S>).patch(visits::update::<S>))
    .route("/visits/{id}/transition", post(visits::transition::<S>))
    // Aggregation
    .route("/leaderboard", get(leaderboard::handler::<S>))
    // Settings
    .route("/settings", get(settings::current::<S>).put(settings::update::<S>))
    .route("/settings/rescore", post(settings::rescore::<S>))
    .with_state(store)
}

#[cfg(test)]
mod tests;
