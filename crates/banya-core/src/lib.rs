//! Core types and trait definitions for the banya visit tracker.
//!
//! Holds the pure parts of the engine: scoring, the visit workflow,
//! recomputation planning, period windows and ranking. This crate is free of
//! HTTP and database dependencies.

pub mod aggregate;
pub mod bath;
pub mod config;
pub mod error;
pub mod ids;
pub mod period;
pub mod recompute;
pub mod scoring;
pub mod store;
pub mod user;
pub mod visit;
pub mod workflow;

pub use error::{Error, Result};
