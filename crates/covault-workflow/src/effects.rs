//! Effect traits for the external collaborators
//!
//! The engine performs no I/O of its own. These traits are the boundary:
//! the surrounding application implements them over its network and
//! storage layers, and tests implement them in memory. Contracts follow
//! the collaborator descriptions the engine depends on; nothing more is
//! assumed about the other side.

use crate::digest::PolicyChangeDigest;
use async_trait::async_trait;
use covault_core::{CovaultResult, GroupId, Member, TransactionId, VersionToken, WalletId};
use covault_policy::GroupKeyPolicy;

/// Remote policy store holding the authoritative `GroupKeyPolicy`.
///
/// The store owns the policy; the engine only ever holds read snapshots.
/// Optimistic concurrency: `commit_policy` compares the caller's version
/// token and fails with `StalePolicyVersion` instead of overwriting a
/// policy someone else changed.
#[async_trait]
pub trait PolicyStoreEffects: Send + Sync {
    /// Fetch the current policy and its version token.
    async fn get_policy(
        &self,
        group: &GroupId,
        wallet: &WalletId,
    ) -> CovaultResult<(GroupKeyPolicy, VersionToken)>;

    /// Replace the policy, guarded by the expected version token.
    ///
    /// Returns the new version token on success and
    /// `CovaultError::StalePolicyVersion` when `expected` no longer
    /// matches the stored version.
    async fn commit_policy(
        &self,
        group: &GroupId,
        wallet: &WalletId,
        policy: &GroupKeyPolicy,
        expected: &VersionToken,
    ) -> CovaultResult<VersionToken>;
}

/// Membership roster, read-only.
#[async_trait]
pub trait RosterEffects: Send + Sync {
    /// Snapshot of the group's members at this instant.
    async fn get_members(&self, group: &GroupId) -> CovaultResult<Vec<Member>>;
}

/// Dummy-transaction collaborator.
///
/// A dummy transaction is a signable stand-in payload for a proposed
/// policy change; member signatures over it constitute authorization
/// evidence without moving funds. The engine only consumes the resulting
/// `membership -> signature` pairs, it never parses the payload itself.
#[async_trait]
pub trait DummyTransactionEffects: Send + Sync {
    /// Create a dummy transaction carrying the proposal digest.
    async fn create_dummy_transaction(
        &self,
        group: &GroupId,
        wallet: &WalletId,
        payload_digest: &PolicyChangeDigest,
    ) -> CovaultResult<TransactionId>;

    /// Cancel a dummy transaction so its partial signatures can never be
    /// replayed into a different proposal. Idempotent: cancelling an
    /// unknown or already-cancelled transaction succeeds.
    async fn cancel_dummy_transaction(
        &self,
        group: &GroupId,
        wallet: &WalletId,
        transaction: &TransactionId,
    ) -> CovaultResult<()>;
}

/// Everything the policy-change workflow needs from the outside world.
pub trait WorkflowEffects: PolicyStoreEffects + RosterEffects + DummyTransactionEffects {}

impl<T> WorkflowEffects for T where T: PolicyStoreEffects + RosterEffects + DummyTransactionEffects {}
