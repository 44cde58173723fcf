//! Encoding and decoding helpers between domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as fixed-width RFC 3339 strings (microsecond
//! precision, `Z` suffix) so that lexical order matches time order.
//! Structured fields (channels, filters, diffs, audit meta) are compact JSON.
//! UUIDs are hyphenated lowercase strings.

use chrono::{DateTime, SecondsFormat, SubsecRound as _, Utc};
use schedwatch_core::{
  diff::Diff,
  record::{AuditEntry, Event, Snapshot},
  subject::{Subject, SubjectKind},
  subscription::{Channel, Filters, Subscriber, Subscription, User},
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ─────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

/// Truncate to the precision the store keeps, so values read back compare
/// equal to values written.
pub fn stored_precision(dt: DateTime<Utc>) -> DateTime<Utc> { dt.trunc_subsecs(6) }

pub fn now() -> DateTime<Utc> { stored_precision(Utc::now()) }

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── JSON columns ────────────────────────────────────────────────────────────

pub fn encode_channels(channels: &[Channel]) -> Result<String> {
  Ok(serde_json::to_string(channels)?)
}

pub fn encode_filters(filters: &Filters) -> Result<String> {
  Ok(serde_json::to_string(filters)?)
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw strings read directly from a `users` row.
pub struct RawUser {
  pub user_id:    String,
  pub email:      Option<String>,
  pub created_at: String,
}

impl RawUser {
  pub fn into_user(self) -> Result<User> {
    Ok(User {
      user_id:    decode_uuid(&self.user_id)?,
      email:      self.email,
      created_at: decode_dt(&self.created_at)?,
    })
  }
}

/// Raw strings read directly from a `subjects` row.
pub struct RawSubject {
  pub subject_id:   String,
  pub kind:         String,
  pub external_key: String,
  pub name:         String,
  pub created_at:   String,
}

impl RawSubject {
  pub fn into_subject(self) -> Result<Subject> {
    Ok(Subject {
      subject_id:   decode_uuid(&self.subject_id)?,
      kind:         self.kind.parse::<SubjectKind>()?,
      external_key: self.external_key,
      name:         self.name,
      created_at:   decode_dt(&self.created_at)?,
    })
  }
}

/// Raw strings read directly from a `subscriptions` row.
pub struct RawSubscription {
  pub subscription_id: String,
  pub user_id:         String,
  pub subject_id:      String,
  pub important:       bool,
  pub channels:        String,
  pub filters:         String,
  pub created_at:      String,
}

impl RawSubscription {
  pub fn into_subscription(self) -> Result<Subscription> {
    Ok(Subscription {
      subscription_id: decode_uuid(&self.subscription_id)?,
      user_id:         decode_uuid(&self.user_id)?,
      subject_id:      decode_uuid(&self.subject_id)?,
      important:       self.important,
      channels:        serde_json::from_str(&self.channels)?,
      filters:         serde_json::from_str(&self.filters)?,
      created_at:      decode_dt(&self.created_at)?,
    })
  }
}

/// A `subscriptions` row left-joined with its `users` row.
pub struct RawSubscriber {
  pub subscription: RawSubscription,
  pub user:         Option<RawUser>,
}

impl RawSubscriber {
  pub fn into_subscriber(self) -> Result<Subscriber> {
    Ok(Subscriber {
      subscription: self.subscription.into_subscription()?,
      user:         self.user.map(RawUser::into_user).transpose()?,
    })
  }
}

/// Raw strings read directly from a `snapshots` row.
pub struct RawSnapshot {
  pub snapshot_id: String,
  pub subject_id:  String,
  pub payload:     String,
  pub fingerprint: String,
  pub observed_at: String,
}

impl RawSnapshot {
  pub fn into_snapshot(self) -> Result<Snapshot> {
    Ok(Snapshot {
      snapshot_id: decode_uuid(&self.snapshot_id)?,
      subject_id:  decode_uuid(&self.subject_id)?,
      payload:     self.payload,
      fingerprint: self.fingerprint,
      observed_at: decode_dt(&self.observed_at)?,
    })
  }
}

/// Raw strings read directly from an `events` row.
pub struct RawEvent {
  pub event_id:    String,
  pub subject_id:  String,
  pub observed_at: String,
  pub diff:        String,
  pub fingerprint: String,
  pub created_at:  String,
}

impl RawEvent {
  pub fn into_event(self) -> Result<Event> {
    // A diff column that no longer parses still marks a change.
    let diff = serde_json::from_str::<Diff>(&self.diff).unwrap_or_else(|_| Diff::coarse());
    Ok(Event {
      event_id: decode_uuid(&self.event_id)?,
      subject_id: decode_uuid(&self.subject_id)?,
      observed_at: decode_dt(&self.observed_at)?,
      diff,
      fingerprint: self.fingerprint,
      created_at: decode_dt(&self.created_at)?,
    })
  }
}

/// Raw strings read directly from an `audit_log` row.
pub struct RawAuditEntry {
  pub audit_id:   String,
  pub actor:      String,
  pub action:     String,
  pub target_id:  Option<String>,
  pub meta:       String,
  pub created_at: String,
}

impl RawAuditEntry {
  pub fn into_entry(self) -> Result<AuditEntry> {
    Ok(AuditEntry {
      audit_id:   decode_uuid(&self.audit_id)?,
      actor:      self.actor,
      action:     self.action,
      target_id:  self.target_id.as_deref().map(decode_uuid).transpose()?,
      meta:       serde_json::from_str(&self.meta)?,
      created_at: decode_dt(&self.created_at)?,
    })
  }
}
