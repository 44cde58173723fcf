//! SQLite backend for the schedwatch store.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. Concurrent appends from several
//! subject-processing tasks are serialised on that thread; duplicate events
//! are absorbed by the `events` unique index.

mod encode;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;

#[cfg(test)]
mod tests;
