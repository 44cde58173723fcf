//! Subjects: watched courses and teachers.
//!
//! A subject is identified by its external key, the string the timetable
//! source understands (a group code, or a teacher code such as `T-4874`).

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::Error;

/// The kind of entity a subject represents. Each kind has its own search
/// and retrieval endpoints on the timetable source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubjectKind {
  Course,
  Teacher,
}

impl SubjectKind {
  /// The discriminant string stored in the `kind` column.
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Course => "course",
      Self::Teacher => "teacher",
    }
  }
}

impl fmt::Display for SubjectKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for SubjectKind {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "course" => Ok(Self::Course),
      "teacher" => Ok(Self::Teacher),
      other => Err(Error::UnknownSubjectKind(other.to_owned())),
    }
  }
}

/// A watched entity. Only `name` may change after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
  pub subject_id:   Uuid,
  pub kind:         SubjectKind,
  /// Unique key used to query the timetable source.
  pub external_key: String,
  pub name:         String,
  pub created_at:   DateTime<Utc>,
}

/// Input to [`crate::store::WatchStore::upsert_subject`].
#[derive(Debug, Clone)]
pub struct NewSubject {
  pub kind:         SubjectKind,
  pub external_key: String,
  pub name:         String,
}
