//! The `ScheduleSource` trait: where payloads come from.
//!
//! Implementations absorb every network and parse failure at this boundary
//! and report it as [`Fetch::Failed`]; nothing here returns an error type.

use std::future::Future;

use crate::subject::SubjectKind;

/// Body historically returned in place of a schedule when retrieval failed.
/// Sources treat a payload equal to this as a failed fetch.
pub const FETCH_FAILED_SENTINEL: &str = r#"{"error":"fetch_failed"}"#;

/// Result of one retrieval attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fetch {
  Payload(String),
  /// Network error, timeout, non-2xx status or malformed body. The caller
  /// skips the subject for this cycle.
  Failed { reason: String },
}

impl Fetch {
  pub fn failed(reason: impl Into<String>) -> Self {
    Self::Failed { reason: reason.into() }
  }

  /// Classify a raw body, mapping the legacy sentinel to a failure.
  pub fn from_body(body: String) -> Self {
    if body.trim() == FETCH_FAILED_SENTINEL {
      Self::failed("source reported fetch_failed")
    } else {
      Self::Payload(body)
    }
  }
}

/// An external timetable system.
pub trait ScheduleSource: Send + Sync {
  /// Map free-form query text to the source's identifier for a subject.
  /// Returns `None` once every lookup strategy is exhausted.
  fn resolve_identifier<'a>(
    &'a self,
    kind: SubjectKind,
    query: &'a str,
  ) -> impl Future<Output = Option<String>> + Send + 'a;

  /// Retrieve the current schedule payload for a resolved identifier.
  fn fetch_payload<'a>(
    &'a self,
    kind: SubjectKind,
    external_id: &'a str,
  ) -> impl Future<Output = Fetch> + Send + 'a;
}
