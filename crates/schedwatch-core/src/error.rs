//! Error types for `schedwatch-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("unknown subject kind: {0:?}")]
  UnknownSubjectKind(String),

  #[error("unknown notification channel: {0:?}")]
  UnknownChannel(String),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
