//! Users, subscriptions and their display filters.
//!
//! A subscription pairs a user with a subject. Its filters narrow what the
//! user cares about (a room, a date, a time window, a teacher override) but
//! never change what is fetched from the timetable source.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::Error;

// ─── Users ───────────────────────────────────────────────────────────────────

/// A notification recipient. Identity is owned by the surrounding
/// application; the pipeline only needs a contact address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
  pub user_id:    Uuid,
  pub email:      Option<String>,
  pub created_at: DateTime<Utc>,
}

// ─── Channels ────────────────────────────────────────────────────────────────

/// Where a subscription wants to hear about changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
  /// Listed on the user's event feed.
  Web,
  Email,
}

impl Channel {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Web => "web",
      Self::Email => "email",
    }
  }
}

impl fmt::Display for Channel {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for Channel {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "web" => Ok(Self::Web),
      "email" => Ok(Self::Email),
      other => Err(Error::UnknownChannel(other.to_owned())),
    }
  }
}

/// Channels assigned to a subscription created without explicit choice.
pub fn default_channels() -> Vec<Channel> { vec![Channel::Web, Channel::Email] }

// ─── Filters ─────────────────────────────────────────────────────────────────

/// Display-only refinement of a subscription over a fixed vocabulary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filters {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub room:    Option<String>,
  /// `YYYY-MM-DD`.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub date:    Option<String>,
  /// `HH:MM`.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub from:    Option<String>,
  /// `HH:MM`.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub to:      Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub teacher: Option<String>,
}

impl Filters {
  /// The filter vocabulary, in the order changes are reported.
  pub const KEYS: [&'static str; 5] = ["room", "date", "from", "to", "teacher"];

  pub fn get(&self, key: &str) -> Option<&str> {
    match key {
      "room" => self.room.as_deref(),
      "date" => self.date.as_deref(),
      "from" => self.from.as_deref(),
      "to" => self.to.as_deref(),
      "teacher" => self.teacher.as_deref(),
      _ => None,
    }
  }

  /// Trim every value and drop the blank ones.
  pub fn normalized(self) -> Self {
    fn clean(v: Option<String>) -> Option<String> {
      v.map(|s| s.trim().to_owned()).filter(|s| !s.is_empty())
    }
    Self {
      room:    clean(self.room),
      date:    clean(self.date),
      from:    clean(self.from),
      to:      clean(self.to),
      teacher: clean(self.teacher),
    }
  }

  pub fn is_empty(&self) -> bool {
    Self::KEYS.iter().all(|k| self.get(k).is_none())
  }
}

// ─── Subscription ────────────────────────────────────────────────────────────

/// A (user, subject) pairing. Unique per pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
  pub subscription_id: Uuid,
  pub user_id:         Uuid,
  pub subject_id:      Uuid,
  /// Important subscriptions get a distinct mail subject prefix.
  pub important:       bool,
  pub channels:        Vec<Channel>,
  pub filters:         Filters,
  pub created_at:      DateTime<Utc>,
}

impl Subscription {
  pub fn wants(&self, channel: Channel) -> bool { self.channels.contains(&channel) }
}

/// Input to [`crate::store::WatchStore::add_subscription`].
#[derive(Debug, Clone)]
pub struct NewSubscription {
  pub user_id:    Uuid,
  pub subject_id: Uuid,
  pub important:  bool,
  pub channels:   Vec<Channel>,
  pub filters:    Filters,
}

impl NewSubscription {
  /// Convenience constructor: not important, default channels, no filters.
  pub fn new(user_id: Uuid, subject_id: Uuid) -> Self {
    Self {
      user_id,
      subject_id,
      important: false,
      channels: default_channels(),
      filters: Filters::default(),
    }
  }
}

/// A subscription with its owning user loaded eagerly, as handed to the
/// notifier. `user` is `None` only when the user row could not be joined.
#[derive(Debug, Clone)]
pub struct Subscriber {
  pub subscription: Subscription,
  pub user:         Option<User>,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn normalized_drops_blank_values() {
    let filters = Filters {
      room: Some("  303 ".into()),
      date: Some("   ".into()),
      ..Filters::default()
    }
    .normalized();

    assert_eq!(filters.room.as_deref(), Some("303"));
    assert!(filters.date.is_none());
    assert!(!filters.is_empty());
  }

  #[test]
  fn filters_serialize_without_empty_keys() {
    let filters = Filters { room: Some("101".into()), ..Filters::default() };
    assert_eq!(serde_json::to_string(&filters).unwrap(), r#"{"room":"101"}"#);
    assert_eq!(serde_json::to_string(&Filters::default()).unwrap(), "{}");
  }

  #[test]
  fn default_subscription_wants_email() {
    let sub = NewSubscription::new(Uuid::new_v4(), Uuid::new_v4());
    assert!(sub.channels.contains(&Channel::Email));
    assert!(sub.channels.contains(&Channel::Web));
    assert!(!sub.important);
  }
}
