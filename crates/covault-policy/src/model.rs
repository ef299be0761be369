//! Co-signing policy value types
//!
//! A `GroupKeyPolicy` describes when the server key may auto-sign on a
//! wallet: per-member or uniform spending limits, a mandatory signing
//! delay, and whether co-signed transactions are broadcast automatically.
//!
//! The uniform/per-member choice is a tagged union rather than a pair of
//! optional fields, so a policy with both (or neither) populated cannot be
//! constructed. Structural invariants are checked once, in the validating
//! constructor; everything downstream can assume a well-formed policy.

use covault_core::{Amount, CovaultError, CovaultResult, MembershipId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Calendar window a spending limit applies over.
///
/// Windows are calendar-aligned, not rolling: `Daily` resets at the UTC
/// day boundary, `Weekly` on Monday, `Monthly` on the 1st, `Yearly` on
/// January 1st.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SpendingTimeUnit {
    /// Per UTC calendar day
    Daily,
    /// Per ISO week (Monday start)
    Weekly,
    /// Per calendar month
    Monthly,
    /// Per calendar year
    Yearly,
}

impl fmt::Display for SpendingTimeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SpendingTimeUnit::Daily => "daily",
            SpendingTimeUnit::Weekly => "weekly",
            SpendingTimeUnit::Monthly => "monthly",
            SpendingTimeUnit::Yearly => "yearly",
        };
        write!(f, "{name}")
    }
}

/// One spending limit: an amount per calendar window.
///
/// A limit of zero is meaningful, not absent: it grants no autonomous
/// spending at all (the configuration used for `KeyHolderLimited` members
/// who must always collect manual signatures).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpendingPolicy {
    /// Maximum total auto-signed spend per window
    pub limit: Amount,
    /// Window the limit applies over
    pub window: SpendingTimeUnit,
}

impl SpendingPolicy {
    /// Create a spending limit.
    pub fn new(limit: Amount, window: SpendingTimeUnit) -> Self {
        Self { limit, window }
    }

    /// Whether `self` is at most as permissive as `other`.
    ///
    /// Only defined when both limits share the same currency unit and the
    /// same window; any other combination needs a price quote or window
    /// arithmetic and is conservatively treated as incomparable.
    pub fn is_at_most(&self, other: &SpendingPolicy) -> bool {
        self.window == other.window
            && matches!(
                self.limit.partial_cmp_same_unit(&other.limit),
                Some(std::cmp::Ordering::Less | std::cmp::Ordering::Equal)
            )
    }
}

impl fmt::Display for SpendingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.limit, self.window)
    }
}

/// How spending limits apply across the wallet's members.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpendingLimits {
    /// One limit shared by every member
    Uniform(SpendingPolicy),
    /// An individual limit per membership id
    ///
    /// A member with no entry has no autonomous limit at all: resolution
    /// fails closed and the evaluator denies.
    PerMember(BTreeMap<MembershipId, SpendingPolicy>),
}

/// The aggregate co-signing policy for a wallet's server key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupKeyPolicy {
    /// Spending limits, uniform or per member
    pub limits: SpendingLimits,
    /// Mandatory delay between co-signing and broadcast, in seconds
    pub signing_delay_secs: u32,
    /// Whether the service broadcasts automatically once the delay elapses
    pub auto_broadcast: bool,
}

impl GroupKeyPolicy {
    /// Create a policy with a uniform limit for all members.
    pub fn uniform(limit: SpendingPolicy, signing_delay_secs: u32, auto_broadcast: bool) -> Self {
        Self {
            limits: SpendingLimits::Uniform(limit),
            signing_delay_secs,
            auto_broadcast,
        }
    }

    /// Create a policy with per-member limits.
    ///
    /// An empty map is rejected as `MalformedPolicy`: a per-member policy
    /// that names nobody would deny every member while claiming to be
    /// configured, which is always a caller bug.
    pub fn per_member(
        limits: BTreeMap<MembershipId, SpendingPolicy>,
        signing_delay_secs: u32,
        auto_broadcast: bool,
    ) -> CovaultResult<Self> {
        if limits.is_empty() {
            return Err(CovaultError::malformed_policy(
                "per-member policy must name at least one member",
            ));
        }
        Ok(Self {
            limits: SpendingLimits::PerMember(limits),
            signing_delay_secs,
            auto_broadcast,
        })
    }

    /// Whether one uniform limit applies to every member.
    pub fn applies_to_all_members(&self) -> bool {
        matches!(self.limits, SpendingLimits::Uniform(_))
    }

    /// Resolve the limit applicable to a member.
    ///
    /// Fails closed: `None` for a member absent from a per-member map.
    pub fn limit_for(&self, member: &MembershipId) -> Option<&SpendingPolicy> {
        match &self.limits {
            SpendingLimits::Uniform(limit) => Some(limit),
            SpendingLimits::PerMember(map) => map.get(member),
        }
    }
}
