//! Content fingerprints for payloads and change events.
//!
//! A fingerprint is the lowercase hex SHA-256 of the raw bytes, so it is
//! stable across restarts and comparable with digests computed elsewhere.

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::diff::Diff;

/// SHA-256 hex digest of `payload`.
pub fn fingerprint(payload: impl AsRef<[u8]>) -> String {
  hex::encode(Sha256::digest(payload.as_ref()))
}

/// Best-effort 64-bit FNV-1a digest, hex encoded.
///
/// Not collision resistant. Used only where the cryptographic input could not
/// be produced, so the pipeline keeps running with a degraded key.
pub fn fallback_fingerprint(payload: impl AsRef<[u8]>) -> String {
  const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
  const PRIME: u64 = 0x0000_0100_0000_01b3;

  let hash = payload
    .as_ref()
    .iter()
    .fold(OFFSET, |acc, b| (acc ^ u64::from(*b)).wrapping_mul(PRIME));
  format!("{hash:016x}")
}

/// Deduplication key for an event: the digest of `"{subject_id}:{diff}"`.
pub fn event_fingerprint(subject_id: Uuid, diff: &Diff) -> String {
  match serde_json::to_string(diff) {
    Ok(json) => fingerprint(format!("{subject_id}:{json}")),
    Err(_) => fallback_fingerprint(format!("{subject_id}:{diff:?}")),
  }
}
