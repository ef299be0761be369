//! Identifier newtypes for wallets, groups, and members
//!
//! UUID-backed identifiers are used for entities this engine addresses
//! directly. Handles issued by remote collaborators (dummy transactions,
//! policy version tokens, confirmation code ids) stay opaque strings: the
//! engine never inspects their structure, only compares them.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Wallet identifier
///
/// Identifies one assisted wallet. A wallet belongs to exactly one group
/// and carries exactly one server key whose policy this engine governs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WalletId(pub Uuid);

impl WalletId {
    /// Create a wallet ID from caller-provided entropy.
    pub fn new_from_entropy(entropy: [u8; 32]) -> Self {
        let mut uuid_bytes = [0u8; 16];
        uuid_bytes.copy_from_slice(&entropy[..16]);
        Self(Uuid::from_bytes(uuid_bytes))
    }

    /// Create from a UUID
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl fmt::Display for WalletId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for WalletId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(WalletId(Uuid::parse_str(s)?))
    }
}

/// Group identifier
///
/// Identifies the membership group an assisted wallet belongs to. The
/// roster collaborator is keyed by group, not by wallet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupId(pub Uuid);

impl GroupId {
    /// Create a group ID from caller-provided entropy.
    pub fn new_from_entropy(entropy: [u8; 32]) -> Self {
        let mut uuid_bytes = [0u8; 16];
        uuid_bytes.copy_from_slice(&entropy[..16]);
        Self(Uuid::from_bytes(uuid_bytes))
    }

    /// Create from a UUID
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for GroupId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(GroupId(Uuid::parse_str(s)?))
    }
}

/// Membership identifier
///
/// Identifies one member within a group. Distinct from any account or
/// device identity; the same person re-invited to a group gets a new
/// membership id, which is what evidence and per-member limits key on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MembershipId(pub Uuid);

impl MembershipId {
    /// Create a membership ID from caller-provided entropy.
    pub fn new_from_entropy(entropy: [u8; 32]) -> Self {
        let mut uuid_bytes = [0u8; 16];
        uuid_bytes.copy_from_slice(&entropy[..16]);
        Self(Uuid::from_bytes(uuid_bytes))
    }

    /// Create from a UUID
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl fmt::Display for MembershipId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "member-{}", self.0)
    }
}

impl FromStr for MembershipId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let uuid_str = s.strip_prefix("member-").unwrap_or(s);
        Ok(MembershipId(Uuid::parse_str(uuid_str)?))
    }
}

/// Opaque identifier of a transaction held by the co-signing service
///
/// Covers both real spend transactions (delay windows) and dummy
/// transactions used to collect policy-change signatures.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TransactionId(pub String);

impl TransactionId {
    /// Wrap a server-issued transaction id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The raw id string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Optimistic-concurrency token for the remote policy store
///
/// Compared at commit time; a mismatch means another device committed
/// first and the local workflow must not overwrite.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VersionToken(pub String);

impl VersionToken {
    /// Wrap a store-issued version token.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The raw token string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VersionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
