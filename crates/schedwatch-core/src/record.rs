//! Append-only records: snapshots, change events and audit entries.
//!
//! None of these are ever updated or deleted once written.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  diff::Diff,
  fingerprint::{event_fingerprint, fingerprint},
};

// ─── Snapshots ───────────────────────────────────────────────────────────────

/// The payload observed for a subject at a point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
  pub snapshot_id: Uuid,
  pub subject_id:  Uuid,
  pub payload:     String,
  pub fingerprint: String,
  pub observed_at: DateTime<Utc>,
}

/// Input to [`crate::store::WatchStore::save_snapshot`].
#[derive(Debug, Clone)]
pub struct NewSnapshot {
  pub subject_id:  Uuid,
  pub payload:     String,
  pub fingerprint: String,
  pub observed_at: DateTime<Utc>,
}

impl NewSnapshot {
  /// Build a snapshot for `payload`, fingerprinting it.
  pub fn observe(
    subject_id: Uuid,
    payload: String,
    observed_at: DateTime<Utc>,
  ) -> Self {
    let fingerprint = fingerprint(&payload);
    Self { subject_id, payload, fingerprint, observed_at }
  }
}

// ─── Events ──────────────────────────────────────────────────────────────────

/// A detected change. Unique per (subject_id, fingerprint).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
  pub event_id:    Uuid,
  pub subject_id:  Uuid,
  pub observed_at: DateTime<Utc>,
  pub diff:        Diff,
  pub fingerprint: String,
  /// Server-assigned insertion time.
  pub created_at:  DateTime<Utc>,
}

/// Input to [`crate::store::WatchStore::insert_event`].
#[derive(Debug, Clone)]
pub struct NewEvent {
  pub subject_id:  Uuid,
  pub observed_at: DateTime<Utc>,
  pub diff:        Diff,
  pub fingerprint: String,
}

impl NewEvent {
  /// Build an event, deriving its deduplication fingerprint from the subject
  /// and the diff content.
  pub fn new(subject_id: Uuid, observed_at: DateTime<Utc>, diff: Diff) -> Self {
    let fingerprint = event_fingerprint(subject_id, &diff);
    Self { subject_id, observed_at, diff, fingerprint }
  }
}

/// Outcome of [`crate::store::WatchStore::record_change`].
#[derive(Debug, Clone)]
pub struct ChangeRecord {
  /// `None` when an identical event had already been recorded.
  pub event:    Option<Event>,
  pub snapshot: Snapshot,
}

// ─── Audit log ───────────────────────────────────────────────────────────────

/// Actor recorded for pipeline-initiated actions.
pub const ACTOR_SYSTEM: &str = "system";
/// Actor recorded for administrator corrections.
pub const ACTOR_ADMIN: &str = "admin";

/// A notification was dispatched to one recipient.
pub const ACTION_NOTIFY_SENT: &str = "NOTIFY_SENT";
/// Subscription filters were corrected.
pub const ACTION_FILTERS_EDITED: &str = "FILTERS_EDITED";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
  pub audit_id:   Uuid,
  pub actor:      String,
  pub action:     String,
  pub target_id:  Option<Uuid>,
  pub meta:       serde_json::Value,
  pub created_at: DateTime<Utc>,
}

/// Input to [`crate::store::WatchStore::append_audit`].
#[derive(Debug, Clone)]
pub struct NewAuditEntry {
  pub actor:     String,
  pub action:    String,
  pub target_id: Option<Uuid>,
  pub meta:      serde_json::Value,
}

impl NewAuditEntry {
  pub fn system(
    action: &str,
    target_id: Option<Uuid>,
    meta: serde_json::Value,
  ) -> Self {
    Self {
      actor: ACTOR_SYSTEM.to_owned(),
      action: action.to_owned(),
      target_id,
      meta,
    }
  }
}
