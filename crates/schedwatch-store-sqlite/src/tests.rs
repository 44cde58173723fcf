//! Integration tests for `SqliteStore` against an in-memory database.

use chrono::{Duration, Utc};
use schedwatch_core::{
  diff::{diff, manual_diff},
  record::{NewAuditEntry, NewEvent, NewSnapshot, ACTION_NOTIFY_SENT},
  store::WatchStore,
  subject::{NewSubject, Subject, SubjectKind},
  subscription::{Channel, Filters, NewSubscription},
};
use uuid::Uuid;

use crate::SqliteStore;

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn course(key: &str) -> NewSubject {
  NewSubject {
    kind:         SubjectKind::Course,
    external_key: key.into(),
    name:         key.into(),
  }
}

async fn watched(s: &SqliteStore, key: &str, email: &str) -> Subject {
  let subject = s.upsert_subject(course(key)).await.unwrap();
  let user = s.ensure_user(email.into()).await.unwrap();
  s.add_subscription(NewSubscription::new(user.user_id, subject.subject_id))
    .await
    .unwrap()
    .expect("new subscription");
  subject
}

// ─── Users ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn ensure_user_is_idempotent() {
  let s = store().await;

  let a = s.ensure_user("alice@example.com".into()).await.unwrap();
  let b = s.ensure_user(" alice@example.com ".into()).await.unwrap();
  assert_eq!(a.user_id, b.user_id);
  assert_eq!(a.email.as_deref(), Some("alice@example.com"));

  let fetched = s.get_user(a.user_id).await.unwrap().unwrap();
  assert_eq!(fetched, a);
  assert!(s.get_user(Uuid::new_v4()).await.unwrap().is_none());
}

// ─── Subjects ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn upsert_subject_reuses_external_key() {
  let s = store().await;

  let first = s.upsert_subject(course("3530901/10001")).await.unwrap();
  let second = s
    .upsert_subject(NewSubject { name: "other name".into(), ..course("3530901/10001") })
    .await
    .unwrap();

  assert_eq!(first.subject_id, second.subject_id);
  assert_eq!(second.name, "3530901/10001");
  assert_eq!(second.kind, SubjectKind::Course);
}

#[tokio::test]
async fn rename_subject_changes_display_name_only() {
  let s = store().await;
  let subject = s.upsert_subject(course("Math")).await.unwrap();

  assert!(s.rename_subject(subject.subject_id, "Mathematics".into()).await.unwrap());
  let renamed = s.get_subject(subject.subject_id).await.unwrap().unwrap();
  assert_eq!(renamed.name, "Mathematics");
  assert_eq!(renamed.external_key, "Math");

  assert!(!s.rename_subject(Uuid::new_v4(), "x".into()).await.unwrap());
}

#[tokio::test]
async fn watched_subjects_are_distinct_and_subscribed() {
  let s = store().await;
  let math = watched(&s, "Math", "a@example.com").await;
  let user_b = s.ensure_user("b@example.com".into()).await.unwrap();
  s.add_subscription(NewSubscription::new(user_b.user_id, math.subject_id))
    .await
    .unwrap();
  // Known but unwatched.
  s.upsert_subject(course("Physics")).await.unwrap();

  let subjects = s.list_watched_subjects().await.unwrap();
  assert_eq!(subjects.len(), 1);
  assert_eq!(subjects[0].subject_id, math.subject_id);
}

// ─── Subscriptions ───────────────────────────────────────────────────────────

#[tokio::test]
async fn subscription_is_unique_per_user_and_subject() {
  let s = store().await;
  let subject = s.upsert_subject(course("Math")).await.unwrap();
  let user = s.ensure_user("a@example.com".into()).await.unwrap();

  let input = NewSubscription::new(user.user_id, subject.subject_id);
  assert!(s.add_subscription(input.clone()).await.unwrap().is_some());
  assert!(s.add_subscription(input).await.unwrap().is_none());
  assert_eq!(s.list_subscriptions_for_user(user.user_id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn subscription_fields_roundtrip() {
  let s = store().await;
  let subject = s.upsert_subject(course("Math")).await.unwrap();
  let user = s.ensure_user("a@example.com".into()).await.unwrap();

  let mut input = NewSubscription::new(user.user_id, subject.subject_id);
  input.important = true;
  input.channels = vec![Channel::Web];
  input.filters = Filters { room: Some("101".into()), ..Filters::default() };
  let created = s.add_subscription(input).await.unwrap().unwrap();

  let fetched = s.get_subscription(created.subscription_id).await.unwrap().unwrap();
  assert_eq!(fetched, created);
  assert!(!fetched.wants(Channel::Email));
}

#[tokio::test]
async fn subscribers_carry_their_user() {
  let s = store().await;
  let subject = watched(&s, "Math", "a@example.com").await;

  let subs = s.subscribers_of(subject.subject_id).await.unwrap();
  assert_eq!(subs.len(), 1);
  let user = subs[0].user.as_ref().expect("joined user");
  assert_eq!(user.email.as_deref(), Some("a@example.com"));
  assert_eq!(user.user_id, subs[0].subscription.user_id);
}

#[tokio::test]
async fn update_and_toggle_subscription() {
  let s = store().await;
  let subject = watched(&s, "Math", "a@example.com").await;
  let other = s.upsert_subject(course("Physics")).await.unwrap();
  let sub = s.subscribers_of(subject.subject_id).await.unwrap()[0]
    .subscription
    .clone();

  assert!(s.set_important(sub.subscription_id, true).await.unwrap());
  let filters = Filters { room: Some("303".into()), ..Filters::default() };
  assert!(
    s.update_subscription(sub.subscription_id, other.subject_id, filters.clone())
      .await
      .unwrap()
  );

  let fetched = s.get_subscription(sub.subscription_id).await.unwrap().unwrap();
  assert!(fetched.important);
  assert_eq!(fetched.subject_id, other.subject_id);
  assert_eq!(fetched.filters, filters);

  assert!(!s.set_important(Uuid::new_v4(), true).await.unwrap());
}

#[tokio::test]
async fn deleting_subscription_keeps_history() {
  let s = store().await;
  let subject = watched(&s, "Math", "a@example.com").await;
  let sub = s.subscribers_of(subject.subject_id).await.unwrap()[0]
    .subscription
    .clone();

  let now = Utc::now();
  let payload = r#"{"room":"101"}"#.to_owned();
  s.record_change(
    NewEvent::new(subject.subject_id, now, diff(None, &payload)),
    NewSnapshot::observe(subject.subject_id, payload, now),
  )
  .await
  .unwrap();

  assert!(s.delete_subscription(sub.subscription_id).await.unwrap());
  assert!(!s.delete_subscription(sub.subscription_id).await.unwrap());

  assert!(s.list_watched_subjects().await.unwrap().is_empty());
  assert_eq!(s.list_snapshots(subject.subject_id).await.unwrap().len(), 1);
  assert_eq!(s.list_events(&[subject.subject_id]).await.unwrap().len(), 1);
}

// ─── Snapshots ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn latest_snapshot_is_by_observation_time() {
  let s = store().await;
  let subject = s.upsert_subject(course("Math")).await.unwrap();
  assert!(s.latest_snapshot(subject.subject_id).await.unwrap().is_none());

  let now = Utc::now();
  let newer = s
    .save_snapshot(NewSnapshot::observe(subject.subject_id, "new".into(), now))
    .await
    .unwrap();
  // Saved later but observed earlier.
  s.save_snapshot(NewSnapshot::observe(
    subject.subject_id,
    "old".into(),
    now - Duration::minutes(5),
  ))
  .await
  .unwrap();

  let latest = s.latest_snapshot(subject.subject_id).await.unwrap().unwrap();
  assert_eq!(latest, newer);
  assert_eq!(latest.payload, "new");

  let all = s.list_snapshots(subject.subject_id).await.unwrap();
  assert_eq!(all.len(), 2);
  assert_eq!(all[1].payload, "old");
}

// ─── Events ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn duplicate_event_is_absorbed() {
  let s = store().await;
  let subject = s.upsert_subject(course("Math")).await.unwrap();
  let d = diff(Some(r#"{"room":"101"}"#), r#"{"room":"303"}"#);

  let first = s
    .insert_event(NewEvent::new(subject.subject_id, Utc::now(), d.clone()))
    .await
    .unwrap();
  let second = s
    .insert_event(NewEvent::new(subject.subject_id, Utc::now(), d.clone()))
    .await
    .unwrap();

  let first = first.expect("first insert writes");
  assert!(second.is_none());
  assert_eq!(first.diff, d);

  let events = s.list_events(&[subject.subject_id]).await.unwrap();
  assert_eq!(events.len(), 1);
  assert_eq!(events[0], first);
}

#[tokio::test]
async fn same_diff_on_other_subject_is_not_a_duplicate() {
  let s = store().await;
  let math = s.upsert_subject(course("Math")).await.unwrap();
  let physics = s.upsert_subject(course("Physics")).await.unwrap();
  let d = diff(Some(r#"{"room":"101"}"#), r#"{"room":"303"}"#);

  assert!(s.insert_event(NewEvent::new(math.subject_id, Utc::now(), d.clone())).await.unwrap().is_some());
  assert!(s.insert_event(NewEvent::new(physics.subject_id, Utc::now(), d)).await.unwrap().is_some());

  let events = s.list_events(&[math.subject_id, physics.subject_id]).await.unwrap();
  assert_eq!(events.len(), 2);
  assert!(s.list_events(&[]).await.unwrap().is_empty());
}

#[tokio::test]
async fn record_change_writes_snapshot_even_for_duplicate_event() {
  let s = store().await;
  let subject = s.upsert_subject(course("Math")).await.unwrap();
  let d = manual_diff(
    &Filters { room: Some("101".into()), ..Filters::default() },
    &Filters { room: Some("303".into()), ..Filters::default() },
  );

  let now = Utc::now();
  let first = s
    .record_change(
      NewEvent::new(subject.subject_id, now, d.clone()),
      NewSnapshot::observe(subject.subject_id, "a".into(), now),
    )
    .await
    .unwrap();
  let second = s
    .record_change(
      NewEvent::new(subject.subject_id, now, d),
      NewSnapshot::observe(subject.subject_id, "b".into(), now + Duration::seconds(1)),
    )
    .await
    .unwrap();

  assert!(first.event.is_some());
  assert!(second.event.is_none());
  assert_eq!(s.list_events(&[subject.subject_id]).await.unwrap().len(), 1);
  assert_eq!(s.list_snapshots(subject.subject_id).await.unwrap().len(), 2);
  assert_eq!(
    s.latest_snapshot(subject.subject_id).await.unwrap().unwrap(),
    second.snapshot
  );
}

#[tokio::test]
async fn event_for_unknown_subject_is_rejected() {
  let s = store().await;
  let ghost = Uuid::new_v4();

  let result = s.insert_event(NewEvent::new(ghost, Utc::now(), diff(None, "{}"))).await;

  assert!(result.is_err());
  assert!(s.list_events(&[ghost]).await.unwrap().is_empty());
}

#[tokio::test]
async fn record_change_rolls_back_event_when_snapshot_fails() {
  let s = store().await;
  let subject = watched(&s, "3530901/10001", "a@example.com").await;
  let now = Utc::now();
  s.reject_snapshot_inserts().await.unwrap();

  let result = s
    .record_change(
      NewEvent::new(subject.subject_id, now, diff(None, r#"{"room":"101"}"#)),
      NewSnapshot::observe(subject.subject_id, r#"{"room":"101"}"#.into(), now),
    )
    .await;

  assert!(result.is_err());
  assert!(s.list_events(&[subject.subject_id]).await.unwrap().is_empty());
  assert!(s.list_snapshots(subject.subject_id).await.unwrap().is_empty());
}

// ─── Audit log ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn audit_entries_are_appended_in_order() {
  let s = store().await;
  let target = Uuid::new_v4();

  s.append_audit(NewAuditEntry::system(
    ACTION_NOTIFY_SENT,
    Some(target),
    serde_json::json!({ "channel": "email", "email": "a@example.com" }),
  ))
  .await
  .unwrap();
  s.append_audit(NewAuditEntry::system(ACTION_NOTIFY_SENT, None, serde_json::json!({})))
    .await
    .unwrap();

  let log = s.list_audit().await.unwrap();
  assert_eq!(log.len(), 2);
  assert_eq!(log[0].actor, "system");
  assert_eq!(log[0].action, "NOTIFY_SENT");
  assert_eq!(log[0].target_id, Some(target));
  assert_eq!(log[0].meta["email"], "a@example.com");
  assert!(log[1].target_id.is_none());
}

// ─── On-disk ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn reopened_file_keeps_state() {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("schedwatch.db");

  let subject_id = {
    let s = SqliteStore::open(&path).await.unwrap();
    s.upsert_subject(course("Math")).await.unwrap().subject_id
  };

  let s = SqliteStore::open(&path).await.unwrap();
  let subject = s.get_subject(subject_id).await.unwrap().unwrap();
  assert_eq!(subject.external_key, "Math");
}
