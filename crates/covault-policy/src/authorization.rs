//! Required-authorization calculation for policy changes
//!
//! Given the current policy, a proposed replacement, and a roster
//! snapshot, [`RequiredAuthorizationCalculator`] decides what evidence a
//! change needs before it may be committed:
//!
//! - a change that only tightens is fast-tracked with no authorization;
//! - a sole master with nobody else holding a key confirms with a
//!   one-time code sent out of band;
//! - every other change collects signatures from a majority of the
//!   wallet's masters and admins over a dummy transaction.
//!
//! The tighten/loosen asymmetry is a deliberate safety property: loosening
//! any limit or shortening the delay always takes full authorization.
//!
//! The client-side count is advisory. The remote policy service recomputes
//! and enforces its own requirement at commit time; this calculator exists
//! so the workflow knows what evidence to collect, and it must be run
//! against a fresh roster snapshot at proposal time, never a cached one.

use crate::model::{GroupKeyPolicy, SpendingLimits};
use covault_core::{Member, MembershipId, TransactionId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::debug;

/// What kind of evidence a policy change requires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthorizationKind {
    /// No evidence: the change only tightens
    None,
    /// A one-time confirmation code delivered out of band
    ConfirmationCode,
    /// Signatures over a dummy transaction from eligible members
    MemberSignatures {
        /// Distinct eligible signatures required
        required_count: u32,
        /// Members whose signatures count
        eligible: BTreeSet<MembershipId>,
    },
}

/// The authorization requirement attached to one policy-change request.
///
/// Computed once per request and immutable thereafter; a new proposal gets
/// a fresh computation against a fresh roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequiredAuthorization {
    /// Kind of evidence required
    pub kind: AuthorizationKind,
    /// Dummy transaction collecting signatures, once created
    pub dummy_transaction_id: Option<TransactionId>,
}

impl RequiredAuthorization {
    /// Requirement that needs no evidence.
    pub fn none() -> Self {
        Self {
            kind: AuthorizationKind::None,
            dummy_transaction_id: None,
        }
    }

    /// Requirement satisfied by a one-time confirmation code.
    pub fn confirmation_code() -> Self {
        Self {
            kind: AuthorizationKind::ConfirmationCode,
            dummy_transaction_id: None,
        }
    }

    /// Requirement satisfied by member signatures.
    pub fn member_signatures(required_count: u32, eligible: BTreeSet<MembershipId>) -> Self {
        Self {
            kind: AuthorizationKind::MemberSignatures {
                required_count,
                eligible,
            },
            dummy_transaction_id: None,
        }
    }

    /// Attach the dummy transaction id once the collaborator created it.
    pub fn with_dummy_transaction(mut self, id: TransactionId) -> Self {
        self.dummy_transaction_id = Some(id);
        self
    }

    /// Whether a member's signature counts toward this requirement.
    pub fn is_eligible(&self, member: &MembershipId) -> bool {
        match &self.kind {
            AuthorizationKind::None | AuthorizationKind::ConfirmationCode => false,
            AuthorizationKind::MemberSignatures { eligible, .. } => eligible.contains(member),
        }
    }
}

/// Computes the authorization requirement for a proposed policy change.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequiredAuthorizationCalculator;

impl RequiredAuthorizationCalculator {
    /// Create a calculator.
    pub fn new() -> Self {
        Self
    }

    /// Compute the requirement for replacing `current` with `proposed`.
    ///
    /// `roster` must be a fresh snapshot taken at proposal time;
    /// membership can change between proposal and commit, and a stale
    /// snapshot would compute a stale quorum.
    pub fn compute(
        &self,
        current: &GroupKeyPolicy,
        proposed: &GroupKeyPolicy,
        roster: &[Member],
    ) -> RequiredAuthorization {
        if is_strict_tightening(current, proposed) {
            debug!("policy change only tightens, fast-tracking without authorization");
            return RequiredAuthorization::none();
        }

        let eligible: BTreeSet<MembershipId> = roster
            .iter()
            .filter(|m| m.role.can_authorize_policy_change())
            .map(|m| m.membership_id)
            .collect();

        let key_holders = roster
            .iter()
            .filter(|m| m.role.is_key_holder_tier())
            .count();
        let sole_master =
            key_holders == 1 && roster.iter().any(|m| m.role == covault_core::Role::Master);

        // A sole master has nobody to co-sign with; the same holds if the
        // roster somehow carries no eligible signer at all. Both routes go
        // through the out-of-band code.
        if sole_master || eligible.is_empty() {
            debug!(
                key_holders,
                eligible = eligible.len(),
                "routing policy change to confirmation code"
            );
            return RequiredAuthorization::confirmation_code();
        }

        let required_count = majority(eligible.len());
        debug!(
            required_count,
            eligible = eligible.len(),
            "policy change requires member signatures"
        );
        RequiredAuthorization::member_signatures(required_count, eligible)
    }
}

/// Majority of `n`, rounding up: 2-of-2, 2-of-3, 3-of-4, 3-of-5.
fn majority(n: usize) -> u32 {
    (n as u32) / 2 + 1
}

/// Whether `proposed` is at most as permissive as `current` in every
/// dimension.
///
/// Comparisons are conservative: a limit whose currency unit or window
/// changed is never considered a tighten, because ordering it against the
/// old limit would need a price quote and this function is pure.
fn is_strict_tightening(current: &GroupKeyPolicy, proposed: &GroupKeyPolicy) -> bool {
    if proposed.signing_delay_secs < current.signing_delay_secs {
        return false;
    }
    // Enabling auto-broadcast removes a manual checkpoint.
    if proposed.auto_broadcast && !current.auto_broadcast {
        return false;
    }

    match (&current.limits, &proposed.limits) {
        (SpendingLimits::Uniform(old), SpendingLimits::Uniform(new)) => new.is_at_most(old),
        // Splitting a uniform limit tightens only if nobody gained headroom.
        (SpendingLimits::Uniform(old), SpendingLimits::PerMember(new)) => {
            new.values().all(|limit| limit.is_at_most(old))
        }
        // Collapsing to a uniform limit tightens only if it is under every
        // existing per-member limit (members without an entry had nothing,
        // so a uniform grant always loosens for them).
        (SpendingLimits::PerMember(_), SpendingLimits::Uniform(_)) => false,
        // Entry dropped from the new map: that member now fails closed,
        // which is a tighten. Entry added: a grant they did not have.
        (SpendingLimits::PerMember(old), SpendingLimits::PerMember(new)) => new
            .iter()
            .all(|(id, limit)| old.get(id).is_some_and(|o| limit.is_at_most(o))),
    }
}
