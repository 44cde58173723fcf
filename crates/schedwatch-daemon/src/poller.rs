//! One polling cycle: fetch, compare, record, notify.

use std::sync::Arc;

use chrono::Utc;
use futures::{StreamExt as _, stream};
use schedwatch_core::{
  diff::diff,
  record::{NewEvent, NewSnapshot},
  source::{Fetch, ScheduleSource},
  store::WatchStore,
  subject::Subject,
};
use schedwatch_notify::{Mailer, Notifier};
use serde::Serialize;
use tracing::{debug, info, warn};

/// Totals for one cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
  /// Watched subjects considered.
  pub subjects:        usize,
  pub unchanged:       usize,
  /// First observations and fingerprint changes.
  pub changed:         usize,
  pub events_recorded: usize,
  /// Changes whose event was already on record.
  pub duplicates:      usize,
  /// Resolve misses, fetch failures and store errors.
  pub failed:          usize,
  /// Messages handed to the mail transport.
  pub notifications:   usize,
}

enum Outcome {
  Unchanged,
  Changed { recorded: bool, notifications: usize },
  Failed,
}

impl CycleReport {
  fn add(&mut self, outcome: Outcome) {
    match outcome {
      Outcome::Unchanged => self.unchanged += 1,
      Outcome::Changed { recorded, notifications } => {
        self.changed += 1;
        if recorded {
          self.events_recorded += 1;
        } else {
          self.duplicates += 1;
        }
        self.notifications += notifications;
      }
      Outcome::Failed => self.failed += 1,
    }
  }
}

pub struct Poller<S, R, M> {
  store:       Arc<S>,
  source:      Arc<R>,
  notifier:    Arc<Notifier<S, M>>,
  concurrency: usize,
}

impl<S, R, M> Poller<S, R, M>
where
  S: WatchStore,
  R: ScheduleSource,
  M: Mailer,
{
  pub fn new(
    store: Arc<S>,
    source: Arc<R>,
    notifier: Arc<Notifier<S, M>>,
    concurrency: usize,
  ) -> Self {
    Self { store, source, notifier, concurrency: concurrency.max(1) }
  }

  /// Poll every watched subject once. Never fails: per-subject problems are
  /// logged and counted.
  pub async fn run_cycle(&self) -> CycleReport {
    let subjects = match self.store.list_watched_subjects().await {
      Ok(subjects) => subjects,
      Err(e) => {
        warn!("failed to list watched subjects: {e}");
        return CycleReport::default();
      }
    };

    let mut report = CycleReport { subjects: subjects.len(), ..CycleReport::default() };

    let outcomes: Vec<Outcome> = stream::iter(subjects)
      .map(|subject| async move {
        self.poll_subject(&subject).await.unwrap_or_else(|e| {
          warn!(subject = %subject.external_key, "store error while polling: {e}");
          Outcome::Failed
        })
      })
      .buffer_unordered(self.concurrency)
      .collect()
      .await;

    for outcome in outcomes {
      report.add(outcome);
    }

    info!(
      subjects = report.subjects,
      changed = report.changed,
      events = report.events_recorded,
      duplicates = report.duplicates,
      failed = report.failed,
      notifications = report.notifications,
      "poll cycle complete"
    );
    report
  }

  async fn poll_subject(&self, subject: &Subject) -> Result<Outcome, S::Error> {
    let key = subject.external_key.as_str();

    let Some(external_id) = self.source.resolve_identifier(subject.kind, key).await else {
      warn!(subject = key, kind = %subject.kind, "could not resolve identifier");
      return Ok(Outcome::Failed);
    };

    let payload = match self.source.fetch_payload(subject.kind, &external_id).await {
      Fetch::Payload(payload) => payload,
      Fetch::Failed { reason } => {
        warn!(subject = key, "fetch failed: {reason}");
        return Ok(Outcome::Failed);
      }
    };

    let observed_at = Utc::now();
    let snapshot = NewSnapshot::observe(subject.subject_id, payload, observed_at);
    let previous = self.store.latest_snapshot(subject.subject_id).await?;

    if previous.as_ref().is_some_and(|p| p.fingerprint == snapshot.fingerprint) {
      debug!(subject = key, "unchanged");
      return Ok(Outcome::Unchanged);
    }

    // Must precede the write: a failed read leaves the change for the next
    // cycle to pick up again.
    let subscribers = self.store.subscribers_of(subject.subject_id).await?;

    let diff = diff(previous.as_ref().map(|p| p.payload.as_str()), &snapshot.payload);
    let event = NewEvent::new(subject.subject_id, observed_at, diff.clone());
    let record = self.store.record_change(event, snapshot).await?;
    let recorded = record.event.is_some();
    debug!(subject = key, diff = diff.tag(), recorded, "change observed");

    let sent = self.notifier.notify(subject, &subscribers, &diff).await;

    Ok(Outcome::Changed { recorded, notifications: sent.sent })
  }
}
