//! The `WatchStore` trait.
//!
//! Implemented by storage backends (e.g. `schedwatch-store-sqlite`). The
//! poller, notifier and CLI depend on this abstraction, not on any concrete
//! backend.

use std::future::Future;

use uuid::Uuid;

use crate::{
  record::{
    AuditEntry, ChangeRecord, Event, NewAuditEntry, NewEvent, NewSnapshot,
    Snapshot,
  },
  subject::{NewSubject, Subject},
  subscription::{Filters, NewSubscription, Subscriber, Subscription, User},
};

/// Abstraction over a schedwatch store backend.
///
/// Snapshots, events and audit entries are append-only. Events are
/// deduplicated by (subject, fingerprint): inserting a duplicate is a no-op,
/// not an error.
///
/// All methods return `Send` futures so the store can be shared across tasks
/// of a multi-threaded runtime.
pub trait WatchStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Users ─────────────────────────────────────────────────────────────

  /// Return the user with `email`, creating it if needed.
  fn ensure_user(
    &self,
    email: String,
  ) -> impl Future<Output = Result<User, Self::Error>> + Send + '_;

  fn get_user(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<User>, Self::Error>> + Send + '_;

  // ── Subjects ──────────────────────────────────────────────────────────

  /// Return the subject with `input.external_key`, creating it if needed.
  fn upsert_subject(
    &self,
    input: NewSubject,
  ) -> impl Future<Output = Result<Subject, Self::Error>> + Send + '_;

  fn get_subject(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Subject>, Self::Error>> + Send + '_;

  /// Correct a subject's display name. Returns `false` if it does not exist.
  fn rename_subject(
    &self,
    id: Uuid,
    name: String,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// Distinct subjects referenced by at least one subscription.
  fn list_watched_subjects(
    &self,
  ) -> impl Future<Output = Result<Vec<Subject>, Self::Error>> + Send + '_;

  // ── Subscriptions ─────────────────────────────────────────────────────

  /// Create a subscription. Returns `None` if the user already subscribes
  /// to the subject.
  fn add_subscription(
    &self,
    input: NewSubscription,
  ) -> impl Future<Output = Result<Option<Subscription>, Self::Error>> + Send + '_;

  fn get_subscription(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Subscription>, Self::Error>> + Send + '_;

  fn list_subscriptions_for_user(
    &self,
    user_id: Uuid,
  ) -> impl Future<Output = Result<Vec<Subscription>, Self::Error>> + Send + '_;

  /// Subscriptions to a subject, each with its user loaded eagerly.
  fn subscribers_of(
    &self,
    subject_id: Uuid,
  ) -> impl Future<Output = Result<Vec<Subscriber>, Self::Error>> + Send + '_;

  /// Set the important flag. Returns `false` if the subscription does not
  /// exist.
  fn set_important(
    &self,
    id: Uuid,
    important: bool,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// Replace filters and (re)point the subscription at `subject_id`.
  /// Returns `false` if the subscription does not exist.
  fn update_subscription(
    &self,
    id: Uuid,
    subject_id: Uuid,
    filters: Filters,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// Delete a subscription. Snapshot and event history is untouched.
  fn delete_subscription(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  // ── Snapshots ─────────────────────────────────────────────────────────

  /// The snapshot with the greatest `observed_at` for a subject.
  fn latest_snapshot(
    &self,
    subject_id: Uuid,
  ) -> impl Future<Output = Result<Option<Snapshot>, Self::Error>> + Send + '_;

  fn save_snapshot(
    &self,
    input: NewSnapshot,
  ) -> impl Future<Output = Result<Snapshot, Self::Error>> + Send + '_;

  /// All snapshots for a subject, newest first.
  fn list_snapshots(
    &self,
    subject_id: Uuid,
  ) -> impl Future<Output = Result<Vec<Snapshot>, Self::Error>> + Send + '_;

  // ── Events ────────────────────────────────────────────────────────────

  /// Insert an event unless one with the same (subject, fingerprint)
  /// exists. Returns `None` for a duplicate.
  fn insert_event(
    &self,
    input: NewEvent,
  ) -> impl Future<Output = Result<Option<Event>, Self::Error>> + Send + '_;

  /// Insert an event (deduplicated) and then a snapshot, atomically.
  fn record_change(
    &self,
    event: NewEvent,
    snapshot: NewSnapshot,
  ) -> impl Future<Output = Result<ChangeRecord, Self::Error>> + Send + '_;

  /// Events for any of `subject_ids`, newest first.
  fn list_events<'a>(
    &'a self,
    subject_ids: &'a [Uuid],
  ) -> impl Future<Output = Result<Vec<Event>, Self::Error>> + Send + 'a;

  // ── Audit log ─────────────────────────────────────────────────────────

  fn append_audit(
    &self,
    input: NewAuditEntry,
  ) -> impl Future<Output = Result<AuditEntry, Self::Error>> + Send + '_;

  /// All audit entries, oldest first.
  fn list_audit(
    &self,
  ) -> impl Future<Output = Result<Vec<AuditEntry>, Self::Error>> + Send + '_;
}
