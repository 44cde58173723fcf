//! Core types and trait definitions for schedwatch.
//!
//! This crate is deliberately free of HTTP and database dependencies. The
//! store, source and notifier crates all build on the types and traits
//! defined here.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod code;
pub mod diff;
pub mod error;
pub mod fingerprint;
pub mod record;
pub mod source;
pub mod store;
pub mod subject;
pub mod subscription;

pub use error::{Error, Result};
