//! Payload digests binding authorization evidence to one exact proposal
//!
//! A confirmation code or dummy-transaction signature must only ever
//! authorize the payload it was issued for. Both are bound to the SHA-256
//! digest of the proposal's canonical JSON serialization; verification
//! re-checks the digest against the request still in flight, so a leaked
//! code or a stale signature cannot be replayed against a different,
//! larger change.

use covault_core::{CovaultError, CovaultResult};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// SHA-256 digest of a policy-change payload.
///
/// Serialization is serde_json over value types whose maps are `BTreeMap`,
/// so the byte stream is stable for equal payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PolicyChangeDigest([u8; 32]);

impl PolicyChangeDigest {
    /// Digest the canonical serialization of `payload`.
    pub fn compute<T: Serialize>(payload: &T) -> CovaultResult<Self> {
        let bytes = serde_json::to_vec(payload)
            .map_err(|e| CovaultError::internal(format!("payload serialization failed: {e}")))?;
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        Ok(Self(hasher.finalize().into()))
    }

    /// Raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for PolicyChangeDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}
