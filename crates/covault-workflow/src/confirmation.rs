//! One-time confirmation codes for low-quorum policy changes
//!
//! A single-owner wallet has nobody to co-sign a policy change, so the
//! change is confirmed with a short-lived one-time code delivered out of
//! band. Each code is bound to the digest of the exact proposed payload:
//! verifying re-checks the digest, so a code stolen from one proposal can
//! never authorize another.
//!
//! Verification is atomic with respect to single use. The issued-code
//! table lives behind one mutex and a successful verify removes the entry
//! under that lock, so two racing verifies of the same code cannot both
//! succeed.

use crate::digest::PolicyChangeDigest;
use covault_core::{CovaultError, CovaultResult, PhysicalTime};
use parking_lot::Mutex;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tracing::debug;
use uuid::Uuid;

/// Default code lifetime: five minutes.
pub const DEFAULT_CODE_TTL_SECS: u64 = 300;

/// Identifier of one issued code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CodeId(pub String);

impl CodeId {
    fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl fmt::Display for CodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An issued code, returned to the caller for out-of-band delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedCode {
    /// Identifier to verify against later
    pub code_id: CodeId,
    /// The code itself; the engine hands it to the delivery channel and
    /// forgets it
    pub code: String,
    /// When the code stops being accepted
    pub expires_at: PhysicalTime,
}

/// Proof that a code was verified against a specific payload digest.
///
/// The workflow re-checks `digest` against its own in-flight request; a
/// token minted for a different proposal never advances a workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifiedCodeToken {
    /// The code that was consumed
    pub code_id: CodeId,
    /// Action the code was issued for
    pub action: String,
    /// Digest of the payload the code was bound to
    pub digest: PolicyChangeDigest,
    /// When verification happened
    pub verified_at: PhysicalTime,
}

#[derive(Debug)]
struct PendingCode {
    code: String,
    action: String,
    digest: PolicyChangeDigest,
    expires_at: PhysicalTime,
}

/// Issues and verifies one-time confirmation codes.
#[derive(Debug)]
pub struct ConfirmationCodeService {
    ttl_secs: u64,
    pending: Mutex<HashMap<CodeId, PendingCode>>,
}

impl Default for ConfirmationCodeService {
    fn default() -> Self {
        Self::new(DEFAULT_CODE_TTL_SECS)
    }
}

impl ConfirmationCodeService {
    /// Create a service with the given code lifetime.
    pub fn new(ttl_secs: u64) -> Self {
        Self {
            ttl_secs,
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Issue a code for `action`, bound to `digest`.
    ///
    /// The returned code goes to the out-of-band delivery channel; the
    /// code id is what the caller quotes back at verification.
    pub fn issue(
        &self,
        action: impl Into<String>,
        digest: PolicyChangeDigest,
        now: PhysicalTime,
    ) -> IssuedCode {
        let code_id = CodeId::generate();
        let code = generate_code();
        let expires_at = now.plus_secs(self.ttl_secs);

        self.pending.lock().insert(
            code_id.clone(),
            PendingCode {
                code: code.clone(),
                action: action.into(),
                digest,
                expires_at,
            },
        );
        debug!(%code_id, %expires_at, "issued confirmation code");

        IssuedCode {
            code_id,
            code,
            expires_at,
        }
    }

    /// Verify a code against the payload digest of the request in flight.
    ///
    /// Success consumes the code. A wrong code or mismatched digest leaves
    /// the code pending (the legitimate holder may still use it); an
    /// expired code is discarded. All failure modes surface as
    /// `InvalidOrExpiredCode` without distinguishing which check failed.
    pub fn verify(
        &self,
        code_id: &CodeId,
        code: &str,
        digest: &PolicyChangeDigest,
        now: PhysicalTime,
    ) -> CovaultResult<VerifiedCodeToken> {
        let mut pending = self.pending.lock();

        let entry = pending
            .get(code_id)
            .ok_or_else(|| CovaultError::invalid_or_expired_code("unknown or already used code"))?;

        if now >= entry.expires_at {
            pending.remove(code_id);
            return Err(CovaultError::invalid_or_expired_code("code expired"));
        }
        if entry.code != code {
            return Err(CovaultError::invalid_or_expired_code("code mismatch"));
        }
        if &entry.digest != digest {
            return Err(CovaultError::invalid_or_expired_code(
                "code bound to a different payload",
            ));
        }

        // All checks passed; consume under the same lock.
        let entry = match pending.remove(code_id) {
            Some(entry) => entry,
            None => {
                return Err(CovaultError::invalid_or_expired_code(
                    "unknown or already used code",
                ))
            }
        };
        debug!(%code_id, "confirmation code verified and consumed");

        Ok(VerifiedCodeToken {
            code_id: code_id.clone(),
            action: entry.action,
            digest: entry.digest,
            verified_at: now,
        })
    }

    /// Drop expired codes. Callers may run this periodically; `verify`
    /// already rejects expired codes on its own.
    pub fn sweep_expired(&self, now: PhysicalTime) {
        self.pending.lock().retain(|_, entry| now < entry.expires_at);
    }
}

/// Six decimal digits, zero-padded.
fn generate_code() -> String {
    let n: u32 = rand::thread_rng().gen_range(0..1_000_000);
    format!("{n:06}")
}
