//! Member roles and roster snapshots
//!
//! Roles form a closed capability set; every authorization decision in the
//! engine is an exhaustive match over this enum so that adding a role forces
//! each decision point to be revisited. There is no default branch anywhere.

use crate::identifiers::MembershipId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Capability tier of a group member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Wallet owner; full control including policy proposals
    Master,
    /// Co-administrator; may propose and co-authorize policy changes
    Admin,
    /// Holds a key and may spend within policy, no policy control
    KeyHolder,
    /// Holds a key with a restricted (possibly zero) spending limit
    KeyHolderLimited,
    /// Read-only visibility, no key and no spend capability
    Observer,
    /// Facilitating service operator; administers membership, never funds
    FacilitatorAdmin,
}

impl Role {
    /// Whether this role holds a key in the wallet.
    ///
    /// Key-holder-tier members are the ones a per-member spending limit can
    /// apply to, and the ones counted when deciding whether a sole master
    /// has anyone to co-sign with.
    pub fn is_key_holder_tier(self) -> bool {
        match self {
            Role::Master | Role::Admin | Role::KeyHolder | Role::KeyHolderLimited => true,
            Role::Observer | Role::FacilitatorAdmin => false,
        }
    }

    /// Whether this role may co-authorize a policy change.
    pub fn can_authorize_policy_change(self) -> bool {
        match self {
            Role::Master | Role::Admin => true,
            Role::KeyHolder | Role::KeyHolderLimited | Role::Observer | Role::FacilitatorAdmin => {
                false
            }
        }
    }

    /// Whether this role may create a policy-change proposal.
    pub fn can_propose_policy_change(self) -> bool {
        match self {
            Role::Master | Role::Admin => true,
            Role::KeyHolder | Role::KeyHolderLimited | Role::Observer | Role::FacilitatorAdmin => {
                false
            }
        }
    }

    /// Whether the server key may ever auto-sign spends for this role.
    ///
    /// Observer and facilitator members have no spend capability at all;
    /// for them the evaluator denies before looking at any limit.
    pub fn can_spend_autonomously(self) -> bool {
        match self {
            Role::Master | Role::Admin | Role::KeyHolder | Role::KeyHolderLimited => true,
            Role::Observer | Role::FacilitatorAdmin => false,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Role::Master => "master",
            Role::Admin => "admin",
            Role::KeyHolder => "keyholder",
            Role::KeyHolderLimited => "keyholder-limited",
            Role::Observer => "observer",
            Role::FacilitatorAdmin => "facilitator-admin",
        };
        write!(f, "{name}")
    }
}

/// One member of a group, as seen in a roster snapshot.
///
/// The roster is owned by the membership collaborator; the engine receives
/// it as a read-only snapshot per operation and never caches or mutates it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    /// Membership identifier, the key evidence and limits are indexed by
    pub membership_id: MembershipId,
    /// Contact email
    pub email: String,
    /// Display name, if the member has set one
    pub display_name: Option<String>,
    /// Capability tier
    pub role: Role,
}

impl Member {
    /// Create a member snapshot.
    pub fn new(
        membership_id: MembershipId,
        email: impl Into<String>,
        display_name: Option<String>,
        role: Role,
    ) -> Self {
        Self {
            membership_id,
            email: email.into(),
            display_name,
            role,
        }
    }
}
