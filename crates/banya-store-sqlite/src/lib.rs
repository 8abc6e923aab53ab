//! SQLite backend for the banya visit store.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated
//! thread without blocking the async runtime. Every scoring write commits
//! its whole recomputation batch in one SQLite transaction.

mod aggregate;
mod encode;
mod locks;
mod recompute;
mod schema;
mod sql;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::{DEFAULT_LOCK_TIMEOUT, SqliteStore};
