//! Runtime settings.
//!
//! Read from an optional TOML file layered under `SCHEDWATCH_*` environment
//! variables. Nested keys use `__`, e.g. `SCHEDWATCH_POLLER__INTERVAL_MS`.

use std::{
  path::{Path, PathBuf},
  time::Duration,
};

use schedwatch_ruz::DEFAULT_BASE_URL;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
  pub store_path: PathBuf,
  pub poller:     PollerSettings,
  pub source:     SourceSettings,
  pub mail:       MailSettings,
}

impl Default for Settings {
  fn default() -> Self {
    Self {
      store_path: PathBuf::from("~/.local/share/schedwatch/schedwatch.db"),
      poller:     PollerSettings::default(),
      source:     SourceSettings::default(),
      mail:       MailSettings::default(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PollerSettings {
  /// Delay between the end of one cycle and the start of the next.
  pub interval_ms: u64,
  /// Subjects polled at once within a cycle.
  pub concurrency: usize,
}

impl Default for PollerSettings {
  fn default() -> Self { Self { interval_ms: 60_000, concurrency: 4 } }
}

impl PollerSettings {
  pub fn interval(&self) -> Duration { Duration::from_millis(self.interval_ms.max(1)) }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SourceSettings {
  pub base_url:     String,
  pub timeout_secs: u64,
}

impl Default for SourceSettings {
  fn default() -> Self {
    Self { base_url: DEFAULT_BASE_URL.to_owned(), timeout_secs: 30 }
  }
}

impl SourceSettings {
  pub fn timeout(&self) -> Duration { Duration::from_secs(self.timeout_secs) }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MailTransport {
  #[default]
  Log,
  Http,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MailSettings {
  pub transport:    MailTransport,
  /// Required for the `http` transport.
  pub relay_url:    Option<String>,
  pub from:         Option<String>,
  pub timeout_secs: u64,
}

impl Default for MailSettings {
  fn default() -> Self {
    Self {
      transport:    MailTransport::Log,
      relay_url:    None,
      from:         None,
      timeout_secs: 15,
    }
  }
}

impl MailSettings {
  pub fn timeout(&self) -> Duration { Duration::from_secs(self.timeout_secs) }
}

impl Settings {
  /// Load settings from `path` (if it exists) and the environment.
  pub fn load(path: &Path) -> Result<Self, config::ConfigError> {
    config::Config::builder()
      .add_source(config::File::from(path).required(false))
      .add_source(
        config::Environment::with_prefix("SCHEDWATCH")
          .prefix_separator("_")
          .separator("__"),
      )
      .build()?
      .try_deserialize()
  }

  /// The store path with a leading `~` expanded.
  pub fn store_path(&self) -> PathBuf { expand_tilde(&self.store_path) }
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn missing_file_yields_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let settings = Settings::load(&dir.path().join("absent.toml")).unwrap();

    assert_eq!(settings.poller.interval_ms, 60_000);
    assert_eq!(settings.poller.concurrency, 4);
    assert_eq!(settings.source.base_url, DEFAULT_BASE_URL);
    assert_eq!(settings.source.timeout_secs, 30);
    assert_eq!(settings.mail.transport, MailTransport::Log);
    assert_eq!(settings.mail.timeout_secs, 15);
  }

  #[test]
  fn file_overrides_only_what_it_sets() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("schedwatch.toml");
    std::fs::write(
      &path,
      r#"
store_path = "/var/lib/schedwatch/db.sqlite"

[poller]
interval_ms = 5000

[mail]
transport = "http"
relay_url = "http://relay.local/send"
"#,
    )
    .unwrap();

    let settings = Settings::load(&path).unwrap();
    assert_eq!(settings.store_path(), PathBuf::from("/var/lib/schedwatch/db.sqlite"));
    assert_eq!(settings.poller.interval(), Duration::from_secs(5));
    assert_eq!(settings.poller.concurrency, 4);
    assert_eq!(settings.mail.transport, MailTransport::Http);
    assert_eq!(settings.mail.relay_url.as_deref(), Some("http://relay.local/send"));
  }

  #[test]
  fn tilde_expansion() {
    let expanded = expand_tilde(Path::new("~/data/db.sqlite"));
    if let Ok(home) = std::env::var("HOME") {
      assert_eq!(expanded, PathBuf::from(home).join("data/db.sqlite"));
    }
    assert_eq!(expand_tilde(Path::new("/abs/db")), PathBuf::from("/abs/db"));
  }
}
