//! SQL schema for the schedwatch SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS users (
    user_id     TEXT PRIMARY KEY,
    email       TEXT UNIQUE,
    created_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS subjects (
    subject_id    TEXT PRIMARY KEY,
    kind          TEXT NOT NULL,      -- 'course' | 'teacher'
    external_key  TEXT NOT NULL UNIQUE,
    name          TEXT NOT NULL,
    created_at    TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS subscriptions (
    subscription_id TEXT PRIMARY KEY,
    user_id         TEXT NOT NULL REFERENCES users(user_id),
    subject_id      TEXT NOT NULL REFERENCES subjects(subject_id),
    important       INTEGER NOT NULL DEFAULT 0,
    channels        TEXT NOT NULL DEFAULT '[\"web\",\"email\"]',
    filters         TEXT NOT NULL DEFAULT '{}',
    created_at      TEXT NOT NULL,
    UNIQUE (user_id, subject_id)
);

-- Snapshots are strictly append-only.
CREATE TABLE IF NOT EXISTS snapshots (
    snapshot_id  TEXT PRIMARY KEY,
    subject_id   TEXT NOT NULL REFERENCES subjects(subject_id),
    payload      TEXT NOT NULL,
    fingerprint  TEXT NOT NULL,
    observed_at  TEXT NOT NULL        -- RFC 3339 UTC, fixed width
);

-- Events are append-only and deduplicated per subject.
CREATE TABLE IF NOT EXISTS events (
    event_id     TEXT PRIMARY KEY,
    subject_id   TEXT NOT NULL REFERENCES subjects(subject_id),
    observed_at  TEXT NOT NULL,
    diff         TEXT NOT NULL,       -- JSON
    fingerprint  TEXT NOT NULL,
    created_at   TEXT NOT NULL,
    UNIQUE (subject_id, fingerprint)
);

CREATE TABLE IF NOT EXISTS audit_log (
    audit_id    TEXT PRIMARY KEY,
    actor       TEXT NOT NULL,
    action      TEXT NOT NULL,
    target_id   TEXT,
    meta        TEXT NOT NULL DEFAULT '{}',
    created_at  TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS subscriptions_subject_idx ON subscriptions(subject_id);
CREATE INDEX IF NOT EXISTS subscriptions_user_idx    ON subscriptions(user_id);
CREATE INDEX IF NOT EXISTS snapshots_latest_idx      ON snapshots(subject_id, observed_at);
CREATE INDEX IF NOT EXISTS events_time_idx           ON events(observed_at);

PRAGMA user_version = 1;
";
