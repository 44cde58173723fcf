//! [`SqliteStore`]: the SQLite implementation of [`WatchStore`].

use std::path::Path;

use rusqlite::OptionalExtension as _;
use uuid::Uuid;

use schedwatch_core::{
  record::{
    AuditEntry, ChangeRecord, Event, NewAuditEntry, NewEvent, NewSnapshot,
    Snapshot,
  },
  store::WatchStore,
  subject::{NewSubject, Subject},
  subscription::{Filters, NewSubscription, Subscriber, Subscription, User},
};

use crate::{
  encode::{
    encode_channels, encode_dt, encode_filters, encode_uuid, now,
    stored_precision, RawAuditEntry, RawEvent, RawSnapshot, RawSubject,
    RawSubscriber, RawSubscription, RawUser,
  },
  schema::SCHEMA,
  Error, Result,
};

// ─── Row mapping ─────────────────────────────────────────────────────────────

const USER_COLS: &str = "user_id, email, created_at";
const SUBJECT_COLS: &str = "subject_id, kind, external_key, name, created_at";
const SUBSCRIPTION_COLS: &str =
  "subscription_id, user_id, subject_id, important, channels, filters, created_at";
const SNAPSHOT_COLS: &str = "snapshot_id, subject_id, payload, fingerprint, observed_at";
const EVENT_COLS: &str =
  "event_id, subject_id, observed_at, diff, fingerprint, created_at";

fn user_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawUser> {
  Ok(RawUser {
    user_id:    row.get(0)?,
    email:      row.get(1)?,
    created_at: row.get(2)?,
  })
}

fn subject_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawSubject> {
  Ok(RawSubject {
    subject_id:   row.get(0)?,
    kind:         row.get(1)?,
    external_key: row.get(2)?,
    name:         row.get(3)?,
    created_at:   row.get(4)?,
  })
}

fn subscription_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawSubscription> {
  Ok(RawSubscription {
    subscription_id: row.get(0)?,
    user_id:         row.get(1)?,
    subject_id:      row.get(2)?,
    important:       row.get(3)?,
    channels:        row.get(4)?,
    filters:         row.get(5)?,
    created_at:      row.get(6)?,
  })
}

fn snapshot_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawSnapshot> {
  Ok(RawSnapshot {
    snapshot_id: row.get(0)?,
    subject_id:  row.get(1)?,
    payload:     row.get(2)?,
    fingerprint: row.get(3)?,
    observed_at: row.get(4)?,
  })
}

fn event_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawEvent> {
  Ok(RawEvent {
    event_id:    row.get(0)?,
    subject_id:  row.get(1)?,
    observed_at: row.get(2)?,
    diff:        row.get(3)?,
    fingerprint: row.get(4)?,
    created_at:  row.get(5)?,
  })
}

// ─── Shared writes ───────────────────────────────────────────────────────────

/// Column values for one `events` insert.
struct EventParams {
  event_id:    String,
  subject_id:  String,
  observed_at: String,
  diff:        String,
  fingerprint: String,
  created_at:  String,
}

/// Column values for one `snapshots` insert.
struct SnapshotParams {
  snapshot_id: String,
  subject_id:  String,
  payload:     String,
  fingerprint: String,
  observed_at: String,
}

/// Insert an event unless (subject_id, fingerprint) already exists.
/// Returns whether a row was written.
fn insert_event_row(
  conn: &rusqlite::Connection,
  p: &EventParams,
) -> rusqlite::Result<bool> {
  let written = conn.execute(
    "INSERT INTO events (event_id, subject_id, observed_at, diff, fingerprint, created_at)
     VALUES (?1, ?2, ?3, ?4, ?5, ?6)
     ON CONFLICT (subject_id, fingerprint) DO NOTHING",
    rusqlite::params![
      p.event_id,
      p.subject_id,
      p.observed_at,
      p.diff,
      p.fingerprint,
      p.created_at,
    ],
  )?;
  Ok(written > 0)
}

fn insert_snapshot_row(
  conn: &rusqlite::Connection,
  p: &SnapshotParams,
) -> rusqlite::Result<()> {
  conn.execute(
    "INSERT INTO snapshots (snapshot_id, subject_id, payload, fingerprint, observed_at)
     VALUES (?1, ?2, ?3, ?4, ?5)",
    rusqlite::params![
      p.snapshot_id,
      p.subject_id,
      p.payload,
      p.fingerprint,
      p.observed_at,
    ],
  )?;
  Ok(())
}

fn build_event(input: NewEvent) -> (Event, EventParams) {
  let event = Event {
    event_id:    Uuid::new_v4(),
    subject_id:  input.subject_id,
    observed_at: stored_precision(input.observed_at),
    diff:        input.diff,
    fingerprint: input.fingerprint,
    created_at:  now(),
  };
  let params = EventParams {
    event_id:    encode_uuid(event.event_id),
    subject_id:  encode_uuid(event.subject_id),
    observed_at: encode_dt(event.observed_at),
    diff:        event.diff.to_json(),
    fingerprint: event.fingerprint.clone(),
    created_at:  encode_dt(event.created_at),
  };
  (event, params)
}

fn build_snapshot(input: NewSnapshot) -> (Snapshot, SnapshotParams) {
  let snapshot = Snapshot {
    snapshot_id: Uuid::new_v4(),
    subject_id:  input.subject_id,
    payload:     input.payload,
    fingerprint: input.fingerprint,
    observed_at: stored_precision(input.observed_at),
  };
  let params = SnapshotParams {
    snapshot_id: encode_uuid(snapshot.snapshot_id),
    subject_id:  encode_uuid(snapshot.subject_id),
    payload:     snapshot.payload.clone(),
    fingerprint: snapshot.fingerprint.clone(),
    observed_at: encode_dt(snapshot.observed_at),
  };
  (snapshot, params)
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// A schedwatch store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Make every subsequent snapshot insert fail.
  #[cfg(test)]
  pub(crate) async fn reject_snapshot_inserts(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(
          "CREATE TRIGGER reject_snapshots BEFORE INSERT ON snapshots
           BEGIN SELECT RAISE(ABORT, 'snapshot insert rejected'); END;",
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  pub async fn find_user_by_email(&self, email: String) -> Result<Option<User>> {
    let raw: Option<RawUser> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!("SELECT {USER_COLS} FROM users WHERE email = ?1"),
            rusqlite::params![email],
            user_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawUser::into_user).transpose()
  }

  async fn find_subject_by_key(&self, key: String) -> Result<Option<Subject>> {
    let raw: Option<RawSubject> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!("SELECT {SUBJECT_COLS} FROM subjects WHERE external_key = ?1"),
            rusqlite::params![key],
            subject_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawSubject::into_subject).transpose()
  }
}

// ─── WatchStore impl ─────────────────────────────────────────────────────────

impl WatchStore for SqliteStore {
  type Error = Error;

  // ── Users ─────────────────────────────────────────────────────────────────

  async fn ensure_user(&self, email: String) -> Result<User> {
    let email = email.trim().to_owned();
    let id_str = encode_uuid(Uuid::new_v4());
    let at_str = encode_dt(now());
    let email_param = email.clone();

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO users (user_id, email, created_at) VALUES (?1, ?2, ?3)
           ON CONFLICT (email) DO NOTHING",
          rusqlite::params![id_str, email_param, at_str],
        )?;
        Ok(())
      })
      .await?;

    self
      .find_user_by_email(email.clone())
      .await?
      .ok_or(Error::Missing(format!("user {email}")))
  }

  async fn get_user(&self, id: Uuid) -> Result<Option<User>> {
    let id_str = encode_uuid(id);

    let raw: Option<RawUser> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!("SELECT {USER_COLS} FROM users WHERE user_id = ?1"),
            rusqlite::params![id_str],
            user_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawUser::into_user).transpose()
  }

  // ── Subjects ──────────────────────────────────────────────────────────────

  async fn upsert_subject(&self, input: NewSubject) -> Result<Subject> {
    let id_str   = encode_uuid(Uuid::new_v4());
    let at_str   = encode_dt(now());
    let kind_str = input.kind.as_str().to_owned();
    let key      = input.external_key.clone();
    let name     = input.name;

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO subjects (subject_id, kind, external_key, name, created_at)
           VALUES (?1, ?2, ?3, ?4, ?5)
           ON CONFLICT (external_key) DO NOTHING",
          rusqlite::params![id_str, kind_str, key, name, at_str],
        )?;
        Ok(())
      })
      .await?;

    self
      .find_subject_by_key(input.external_key.clone())
      .await?
      .ok_or(Error::Missing(format!("subject {}", input.external_key)))
  }

  async fn get_subject(&self, id: Uuid) -> Result<Option<Subject>> {
    let id_str = encode_uuid(id);

    let raw: Option<RawSubject> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!("SELECT {SUBJECT_COLS} FROM subjects WHERE subject_id = ?1"),
            rusqlite::params![id_str],
            subject_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawSubject::into_subject).transpose()
  }

  async fn rename_subject(&self, id: Uuid, name: String) -> Result<bool> {
    let id_str = encode_uuid(id);

    let updated = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE subjects SET name = ?2 WHERE subject_id = ?1",
          rusqlite::params![id_str, name],
        )?)
      })
      .await?;

    Ok(updated > 0)
  }

  async fn list_watched_subjects(&self) -> Result<Vec<Subject>> {
    let raws: Vec<RawSubject> = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(
          "SELECT s.subject_id, s.kind, s.external_key, s.name, s.created_at
           FROM subjects s
           WHERE EXISTS (
             SELECT 1 FROM subscriptions sub WHERE sub.subject_id = s.subject_id
           )
           ORDER BY s.created_at",
        )?;
        let rows = stmt
          .query_map([], subject_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawSubject::into_subject).collect()
  }

  // ── Subscriptions ─────────────────────────────────────────────────────────

  async fn add_subscription(
    &self,
    input: NewSubscription,
  ) -> Result<Option<Subscription>> {
    let subscription = Subscription {
      subscription_id: Uuid::new_v4(),
      user_id:         input.user_id,
      subject_id:      input.subject_id,
      important:       input.important,
      channels:        input.channels,
      filters:         input.filters,
      created_at:      now(),
    };

    let id_str       = encode_uuid(subscription.subscription_id);
    let user_str     = encode_uuid(subscription.user_id);
    let subject_str  = encode_uuid(subscription.subject_id);
    let important    = subscription.important;
    let channels_str = encode_channels(&subscription.channels)?;
    let filters_str  = encode_filters(&subscription.filters)?;
    let at_str       = encode_dt(subscription.created_at);

    let written = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "INSERT INTO subscriptions (
             subscription_id, user_id, subject_id, important, channels, filters, created_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
           ON CONFLICT (user_id, subject_id) DO NOTHING",
          rusqlite::params![
            id_str,
            user_str,
            subject_str,
            important,
            channels_str,
            filters_str,
            at_str,
          ],
        )?)
      })
      .await?;

    Ok((written > 0).then_some(subscription))
  }

  async fn get_subscription(&self, id: Uuid) -> Result<Option<Subscription>> {
    let id_str = encode_uuid(id);

    let raw: Option<RawSubscription> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!(
              "SELECT {SUBSCRIPTION_COLS} FROM subscriptions WHERE subscription_id = ?1"
            ),
            rusqlite::params![id_str],
            subscription_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawSubscription::into_subscription).transpose()
  }

  async fn list_subscriptions_for_user(
    &self,
    user_id: Uuid,
  ) -> Result<Vec<Subscription>> {
    let user_str = encode_uuid(user_id);

    let raws: Vec<RawSubscription> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {SUBSCRIPTION_COLS} FROM subscriptions
           WHERE user_id = ?1
           ORDER BY created_at"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![user_str], subscription_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws
      .into_iter()
      .map(RawSubscription::into_subscription)
      .collect()
  }

  async fn subscribers_of(&self, subject_id: Uuid) -> Result<Vec<Subscriber>> {
    let subject_str = encode_uuid(subject_id);

    let raws: Vec<RawSubscriber> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT
             s.subscription_id, s.user_id, s.subject_id, s.important,
             s.channels, s.filters, s.created_at,
             u.user_id, u.email, u.created_at
           FROM subscriptions s
           LEFT JOIN users u ON u.user_id = s.user_id
           WHERE s.subject_id = ?1
           ORDER BY s.created_at",
        )?;

        let rows = stmt
          .query_map(rusqlite::params![subject_str], |row| {
            let subscription = subscription_row(row)?;
            let user_id: Option<String> = row.get(7)?;
            let user = match user_id {
              Some(user_id) => Some(RawUser {
                user_id,
                email: row.get(8)?,
                created_at: row.get(9)?,
              }),
              None => None,
            };
            Ok(RawSubscriber { subscription, user })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(rows)
      })
      .await?;

    raws
      .into_iter()
      .map(RawSubscriber::into_subscriber)
      .collect()
  }

  async fn set_important(&self, id: Uuid, important: bool) -> Result<bool> {
    let id_str = encode_uuid(id);

    let updated = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE subscriptions SET important = ?2 WHERE subscription_id = ?1",
          rusqlite::params![id_str, important],
        )?)
      })
      .await?;

    Ok(updated > 0)
  }

  async fn update_subscription(
    &self,
    id: Uuid,
    subject_id: Uuid,
    filters: Filters,
  ) -> Result<bool> {
    let id_str      = encode_uuid(id);
    let subject_str = encode_uuid(subject_id);
    let filters_str = encode_filters(&filters)?;

    let updated = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE subscriptions SET subject_id = ?2, filters = ?3
           WHERE subscription_id = ?1",
          rusqlite::params![id_str, subject_str, filters_str],
        )?)
      })
      .await?;

    Ok(updated > 0)
  }

  async fn delete_subscription(&self, id: Uuid) -> Result<bool> {
    let id_str = encode_uuid(id);

    let deleted = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "DELETE FROM subscriptions WHERE subscription_id = ?1",
          rusqlite::params![id_str],
        )?)
      })
      .await?;

    Ok(deleted > 0)
  }

  // ── Snapshots ─────────────────────────────────────────────────────────────

  async fn latest_snapshot(&self, subject_id: Uuid) -> Result<Option<Snapshot>> {
    let subject_str = encode_uuid(subject_id);

    let raw: Option<RawSnapshot> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!(
              "SELECT {SNAPSHOT_COLS} FROM snapshots
               WHERE subject_id = ?1
               ORDER BY observed_at DESC, rowid DESC
               LIMIT 1"
            ),
            rusqlite::params![subject_str],
            snapshot_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawSnapshot::into_snapshot).transpose()
  }

  async fn save_snapshot(&self, input: NewSnapshot) -> Result<Snapshot> {
    let (snapshot, params) = build_snapshot(input);

    self
      .conn
      .call(move |conn| {
        insert_snapshot_row(conn, &params)?;
        Ok(())
      })
      .await?;

    Ok(snapshot)
  }

  async fn list_snapshots(&self, subject_id: Uuid) -> Result<Vec<Snapshot>> {
    let subject_str = encode_uuid(subject_id);

    let raws: Vec<RawSnapshot> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {SNAPSHOT_COLS} FROM snapshots
           WHERE subject_id = ?1
           ORDER BY observed_at DESC, rowid DESC"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![subject_str], snapshot_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawSnapshot::into_snapshot).collect()
  }

  // ── Events ────────────────────────────────────────────────────────────────

  async fn insert_event(&self, input: NewEvent) -> Result<Option<Event>> {
    let (event, params) = build_event(input);

    let inserted = self
      .conn
      .call(move |conn| Ok(insert_event_row(conn, &params)?))
      .await?;

    Ok(inserted.then_some(event))
  }

  async fn record_change(
    &self,
    event: NewEvent,
    snapshot: NewSnapshot,
  ) -> Result<ChangeRecord> {
    let (event, event_params) = build_event(event);
    let (snapshot, snapshot_params) = build_snapshot(snapshot);

    // Event first, so the snapshot is only written once the dedup outcome
    // is known; both land or neither does.
    let inserted = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let inserted = insert_event_row(&tx, &event_params)?;
        insert_snapshot_row(&tx, &snapshot_params)?;
        tx.commit()?;
        Ok(inserted)
      })
      .await?;

    Ok(ChangeRecord { event: inserted.then_some(event), snapshot })
  }

  async fn list_events(&self, subject_ids: &[Uuid]) -> Result<Vec<Event>> {
    if subject_ids.is_empty() {
      return Ok(vec![]);
    }

    let ids: Vec<String> = subject_ids.iter().copied().map(encode_uuid).collect();

    let raws: Vec<RawEvent> = self
      .conn
      .call(move |conn| {
        let placeholders = vec!["?"; ids.len()].join(", ");
        let mut stmt = conn.prepare(&format!(
          "SELECT {EVENT_COLS} FROM events
           WHERE subject_id IN ({placeholders})
           ORDER BY observed_at DESC, rowid DESC"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params_from_iter(ids.iter()), event_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawEvent::into_event).collect()
  }

  // ── Audit log ─────────────────────────────────────────────────────────────

  async fn append_audit(&self, input: NewAuditEntry) -> Result<AuditEntry> {
    let entry = AuditEntry {
      audit_id:   Uuid::new_v4(),
      actor:      input.actor,
      action:     input.action,
      target_id:  input.target_id,
      meta:       input.meta,
      created_at: now(),
    };

    let id_str     = encode_uuid(entry.audit_id);
    let actor      = entry.actor.clone();
    let action     = entry.action.clone();
    let target_str = entry.target_id.map(encode_uuid);
    let meta_str   = serde_json::to_string(&entry.meta)?;
    let at_str     = encode_dt(entry.created_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO audit_log (audit_id, actor, action, target_id, meta, created_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
          rusqlite::params![id_str, actor, action, target_str, meta_str, at_str],
        )?;
        Ok(())
      })
      .await?;

    Ok(entry)
  }

  async fn list_audit(&self) -> Result<Vec<AuditEntry>> {
    let raws: Vec<RawAuditEntry> = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(
          "SELECT audit_id, actor, action, target_id, meta, created_at
           FROM audit_log
           ORDER BY created_at, rowid",
        )?;
        let rows = stmt
          .query_map([], |row| {
            Ok(RawAuditEntry {
              audit_id:   row.get(0)?,
              actor:      row.get(1)?,
              action:     row.get(2)?,
              target_id:  row.get(3)?,
              meta:       row.get(4)?,
              created_at: row.get(5)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawAuditEntry::into_entry).collect()
  }
}
