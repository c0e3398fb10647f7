//! Content digests for run provenance.

use serde::Serialize;
use sha2::{Digest, Sha256};

use super::error::Result;

/// SHA-256 hex digest of the canonical JSON form of `value`.
///
/// Object keys are emitted in sorted order (serde_json's default map), so
/// semantically equal values hash identically regardless of source layout.
pub fn compute_digest<T: Serialize>(value: &T) -> Result<String> {
    let canonical = serde_json::to_value(value)?;
    let bytes = serde_json::to_vec(&canonical)?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}
