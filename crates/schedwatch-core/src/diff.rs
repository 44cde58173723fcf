//! Schedule diff: old payload + new payload → field-level changes.
//!
//! Payloads are opaque documents. When both sides are JSON objects the diff
//! reports every key present on both sides whose value changed; anything
//! else degrades to a bare `changed` marker so the detector can still record
//! that the schedule moved even when it cannot say how.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::subscription::Filters;

// ─── Types ───────────────────────────────────────────────────────────────────

/// One field that changed between two payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueChange {
  pub old: String,
  pub new: String,
}

/// One filter value changed by an administrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterChange {
  pub from: String,
  pub to:   String,
}

/// Structured difference stored on every event.
///
/// Maps are ordered so the serialised form, and hence the event fingerprint,
/// is deterministic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Diff {
  /// First observation of a subject; never announced.
  Initial,
  /// The source payload changed.
  Changed {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    changes:        BTreeMap<String, ValueChange>,
    /// Present only when both payloads were comparable key/value documents.
    #[serde(
      rename = "changedFields",
      default,
      skip_serializing_if = "Option::is_none"
    )]
    changed_fields: Option<usize>,
  },
  /// Subscription filters were corrected by an administrator.
  Manual {
    #[serde(default)]
    changes: BTreeMap<String, FilterChange>,
  },
}

impl Diff {
  /// A `changed` diff with no detail.
  pub fn coarse() -> Self {
    Self::Changed { changes: BTreeMap::new(), changed_fields: None }
  }

  /// The `type` tag of the serialised form.
  pub fn tag(&self) -> &'static str {
    match self {
      Self::Initial => "initial",
      Self::Changed { .. } => "changed",
      Self::Manual { .. } => "manual",
    }
  }

  pub fn change_count(&self) -> usize {
    match self {
      Self::Initial => 0,
      Self::Changed { changes, .. } => changes.len(),
      Self::Manual { changes } => changes.len(),
    }
  }

  /// Whether this diff is worth telling anyone about: not the first
  /// observation, and at least one field actually changed.
  pub fn is_meaningful(&self) -> bool {
    !matches!(self, Self::Initial) && self.change_count() > 0
  }

  /// `field: old -> new` for each change that has a value on either side.
  pub fn lines(&self) -> Vec<String> {
    let pairs: Vec<(&str, &str, &str)> = match self {
      Self::Initial => vec![],
      Self::Changed { changes, .. } => changes
        .iter()
        .map(|(k, c)| (k.as_str(), c.old.as_str(), c.new.as_str()))
        .collect(),
      Self::Manual { changes } => changes
        .iter()
        .map(|(k, c)| (k.as_str(), c.from.as_str(), c.to.as_str()))
        .collect(),
    };

    pairs
      .into_iter()
      .filter(|(_, from, to)| !from.is_empty() || !to.is_empty())
      .map(|(key, from, to)| format!("{key}: {from} -> {to}"))
      .collect()
  }

  /// Plain-text rendering for notification bodies. Falls back to the raw
  /// JSON form when there are no structured changes to list.
  pub fn render_plain(&self) -> String {
    let lines = self.lines();
    if lines.is_empty() {
      self.to_json()
    } else {
      lines.join("\n")
    }
  }

  /// Compact JSON form, as stored in the `diff` column.
  pub fn to_json(&self) -> String {
    serde_json::to_string(self).unwrap_or_else(|_| r#"{"type":"changed"}"#.to_owned())
  }
}

// ─── Schedule diff ───────────────────────────────────────────────────────────

/// Compare two schedule payloads.
///
/// - `old` absent or blank → [`Diff::Initial`].
/// - Both JSON objects → per-key comparison of keys present on both sides.
///   Added and removed keys are not reported.
/// - Anything else, including unparseable input → [`Diff::coarse`].
pub fn diff(old: Option<&str>, new: &str) -> Diff {
  let Some(old) = old.filter(|o| !o.trim().is_empty()) else {
    return Diff::Initial;
  };

  let (Ok(old), Ok(new)) = (
    serde_json::from_str::<Value>(old),
    serde_json::from_str::<Value>(new),
  ) else {
    return Diff::coarse();
  };

  let (Value::Object(old), Value::Object(new)) = (&old, &new) else {
    return Diff::coarse();
  };

  let changes: BTreeMap<String, ValueChange> = old
    .iter()
    .filter_map(|(key, old_value)| {
      let new_value = new.get(key)?;
      let (old_text, new_text) = (as_text(old_value), as_text(new_value));
      (old_text != new_text).then(|| {
        (key.clone(), ValueChange { old: old_text, new: new_text })
      })
    })
    .collect();

  let count = changes.len();
  Diff::Changed { changes, changed_fields: Some(count) }
}

/// Strings compare by content; every other value by its compact JSON text.
fn as_text(value: &Value) -> String {
  match value {
    Value::String(s) => s.clone(),
    other => other.to_string(),
  }
}

// ─── Manual filter diff ──────────────────────────────────────────────────────

/// Compare two filter sets over [`Filters::KEYS`]. A missing value compares as
/// the empty string.
pub fn manual_diff(old: &Filters, new: &Filters) -> Diff {
  let changes = Filters::KEYS
    .iter()
    .filter_map(|key| {
      let from = old.get(key).unwrap_or_default();
      let to = new.get(key).unwrap_or_default();
      (from != to).then(|| {
        ((*key).to_owned(), FilterChange { from: from.to_owned(), to: to.to_owned() })
      })
    })
    .collect();

  Diff::Manual { changes }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
