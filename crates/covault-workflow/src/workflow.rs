//! Policy-change workflow state machine
//!
//! One workflow instance shepherds one `PolicyChangeRequest` from draft to
//! commit:
//!
//! ```text
//! Draft -> AwaitingAuthorization -> Authorized -> Committing -> Committed
//!              |                        |
//!              v (deadline passed)     |
//!           Expired                    |
//!                                      v (version conflict)
//!   any non-terminal state ------> Cancelled
//! ```
//!
//! The request and its evidence are owned exclusively by the workflow and
//! discarded with it. Evidence accumulation is commutative and idempotent:
//! signatures land in a map keyed by membership id, so out-of-order or
//! duplicate submissions converge to the same state. The commit is guarded
//! by the policy store's version token; a conflict cancels the workflow
//! rather than overwriting a policy another device changed.

use crate::confirmation::VerifiedCodeToken;
use crate::digest::PolicyChangeDigest;
use crate::effects::DummyTransactionEffects;
use covault_core::{
    CovaultError, CovaultResult, GroupId, Member, MembershipId, PhysicalTime, VersionToken,
    WalletId,
};
use covault_policy::{
    AuthorizationKind, GroupKeyPolicy, RequiredAuthorization, RequiredAuthorizationCalculator,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// A proposed policy change with provenance.
///
/// Immutable after creation: evidence attaches to the workflow, never to
/// the request, and changing the proposal itself means a new request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyChangeRequest {
    /// Wallet whose server key the change targets
    pub wallet_id: WalletId,
    /// Group the wallet belongs to
    pub group_id: GroupId,
    /// Member who proposed the change
    pub proposed_by: MembershipId,
    /// The replacement policy
    pub proposed_policy: GroupKeyPolicy,
    /// When the proposal was created
    pub created_at: PhysicalTime,
}

/// Evidence collected toward a workflow's authorization requirement.
///
/// Grows monotonically; nothing is ever removed while the workflow is
/// alive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationEvidence {
    /// Signatures over the dummy transaction, keyed by signer
    pub signatures: BTreeMap<MembershipId, String>,
    /// Verified confirmation-code token, for code-authorized flows
    pub code_token: Option<VerifiedCodeToken>,
}

/// Lifecycle state of a policy-change workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkflowState {
    /// Created, authorization requirement not yet computed
    Draft,
    /// Collecting evidence against the attached requirement
    AwaitingAuthorization,
    /// Evidence satisfies the requirement; ready to commit
    Authorized,
    /// Commit in progress against the remote store
    Committing,
    /// Committed; the store returned the new version token
    Committed {
        /// Version token of the committed policy
        version: VersionToken,
    },
    /// Cancelled by a member or forced by a commit conflict
    Cancelled,
    /// Evidence collection exceeded its deadline
    Expired,
}

impl WorkflowState {
    /// Whether the workflow can make no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WorkflowState::Committed { .. } | WorkflowState::Cancelled | WorkflowState::Expired
        )
    }
}

/// State machine for one policy-change request.
#[derive(Debug)]
pub struct PolicyChangeWorkflow {
    request: PolicyChangeRequest,
    digest: PolicyChangeDigest,
    /// Policy snapshot the proposal was computed against
    current_policy: GroupKeyPolicy,
    /// Store version the snapshot carried; the commit guard
    current_version: VersionToken,
    required: Option<RequiredAuthorization>,
    evidence: AuthorizationEvidence,
    deadline: Option<PhysicalTime>,
    state: WorkflowState,
}

impl PolicyChangeWorkflow {
    /// Create a draft workflow for `request` against a fresh policy
    /// snapshot from the store.
    pub fn new(
        request: PolicyChangeRequest,
        current_policy: GroupKeyPolicy,
        current_version: VersionToken,
    ) -> CovaultResult<Self> {
        let digest = PolicyChangeDigest::compute(&request)?;
        Ok(Self {
            request,
            digest,
            current_policy,
            current_version,
            required: None,
            evidence: AuthorizationEvidence::default(),
            deadline: None,
            state: WorkflowState::Draft,
        })
    }

    /// The request this workflow shepherds.
    pub fn request(&self) -> &PolicyChangeRequest {
        &self.request
    }

    /// Digest binding codes and dummy-transaction signatures to this
    /// exact proposal.
    pub fn digest(&self) -> &PolicyChangeDigest {
        &self.digest
    }

    /// Current lifecycle state.
    pub fn state(&self) -> &WorkflowState {
        &self.state
    }

    /// The attached authorization requirement, once computed.
    pub fn required_authorization(&self) -> Option<&RequiredAuthorization> {
        self.required.as_ref()
    }

    /// Evidence collected so far.
    pub fn evidence(&self) -> &AuthorizationEvidence {
        &self.evidence
    }

    /// Distinct eligible signatures collected so far.
    pub fn collected_signatures(&self) -> u32 {
        match self.required.as_ref().map(|r| &r.kind) {
            Some(AuthorizationKind::MemberSignatures { eligible, .. }) => self
                .evidence
                .signatures
                .keys()
                .filter(|id| eligible.contains(id))
                .count() as u32,
            _ => 0,
        }
    }

    /// Signatures still missing before the quorum is met, for progress
    /// display on a reattached in-flight change.
    pub fn pending_signatures(&self) -> u32 {
        match self.required.as_ref().map(|r| &r.kind) {
            Some(AuthorizationKind::MemberSignatures { required_count, .. }) => {
                required_count.saturating_sub(self.collected_signatures())
            }
            _ => 0,
        }
    }

    /// Compute and attach the authorization requirement, leaving `Draft`.
    ///
    /// The roster must be a snapshot taken now, not at request creation.
    /// A requirement of kind `None` (pure tightening) advances straight to
    /// `Authorized`; `MemberSignatures` creates the dummy transaction the
    /// signatures will be collected over; `ConfirmationCode` waits for a
    /// verified token. `deadline` bounds evidence collection.
    pub async fn begin_authorization<D: DummyTransactionEffects + ?Sized>(
        &mut self,
        roster: &[Member],
        deadline: PhysicalTime,
        dummy_transactions: &D,
    ) -> CovaultResult<&WorkflowState> {
        if self.state != WorkflowState::Draft {
            return Err(CovaultError::invalid_transition(format!(
                "begin_authorization from {:?}",
                self.state
            )));
        }

        let proposer = roster
            .iter()
            .find(|m| m.membership_id == self.request.proposed_by)
            .ok_or_else(|| {
                CovaultError::insufficient_authorization("proposer is not a group member")
            })?;
        if !proposer.role.can_propose_policy_change() {
            return Err(CovaultError::insufficient_authorization(format!(
                "role {} cannot propose policy changes",
                proposer.role
            )));
        }

        let required = RequiredAuthorizationCalculator::new().compute(
            &self.current_policy,
            &self.request.proposed_policy,
            roster,
        );

        match &required.kind {
            AuthorizationKind::None => {
                info!(wallet = %self.request.wallet_id, "tightening change, authorized without evidence");
                self.required = Some(required);
                self.state = WorkflowState::Authorized;
            }
            AuthorizationKind::ConfirmationCode => {
                debug!(wallet = %self.request.wallet_id, "awaiting confirmation code");
                self.required = Some(required);
                self.deadline = Some(deadline);
                self.state = WorkflowState::AwaitingAuthorization;
            }
            AuthorizationKind::MemberSignatures {
                required_count,
                eligible,
            } => {
                debug!(
                    wallet = %self.request.wallet_id,
                    required_count,
                    eligible = eligible.len(),
                    "awaiting member signatures"
                );
                let tx = dummy_transactions
                    .create_dummy_transaction(
                        &self.request.group_id,
                        &self.request.wallet_id,
                        &self.digest,
                    )
                    .await?;
                self.required = Some(required.with_dummy_transaction(tx));
                self.deadline = Some(deadline);
                self.state = WorkflowState::AwaitingAuthorization;
            }
        }

        Ok(&self.state)
    }

    /// Submit one member's signature over the dummy transaction.
    ///
    /// Idempotent per member: resubmission never raises the effective
    /// count. Signatures from ineligible members are rejected and leave
    /// the state untouched.
    pub fn submit_signature(
        &mut self,
        member: MembershipId,
        signature: impl Into<String>,
        now: PhysicalTime,
    ) -> CovaultResult<&WorkflowState> {
        self.check_expiry(now)?;
        self.ensure_awaiting("submit_signature")?;

        let required = match self.required.as_ref() {
            Some(required) => required,
            None => {
                return Err(CovaultError::invalid_transition(
                    "no authorization requirement attached",
                ))
            }
        };
        let (required_count, is_eligible) = match &required.kind {
            AuthorizationKind::MemberSignatures {
                required_count,
                eligible,
            } => (*required_count, eligible.contains(&member)),
            AuthorizationKind::None | AuthorizationKind::ConfirmationCode => {
                return Err(CovaultError::invalid_transition(
                    "workflow does not collect member signatures",
                ))
            }
        };
        if !is_eligible {
            warn!(%member, "rejected signature from ineligible member");
            return Err(CovaultError::insufficient_authorization(format!(
                "{member} is not eligible to authorize this change"
            )));
        }

        // First signature wins; a duplicate neither replaces nor recounts.
        self.evidence.signatures.entry(member).or_insert_with(|| signature.into());

        let collected = self.collected_signatures();
        debug!(%member, collected, required_count, "signature recorded");
        if collected >= required_count {
            info!(wallet = %self.request.wallet_id, "signature quorum met");
            self.state = WorkflowState::Authorized;
        }
        Ok(&self.state)
    }

    /// Submit a verified confirmation-code token.
    ///
    /// The token's digest must match this workflow's payload digest; a
    /// token minted for a different proposal is rejected even though the
    /// code itself was valid.
    pub fn submit_code_token(
        &mut self,
        token: VerifiedCodeToken,
        now: PhysicalTime,
    ) -> CovaultResult<&WorkflowState> {
        self.check_expiry(now)?;
        self.ensure_awaiting("submit_code_token")?;

        let kind = self.required.as_ref().map(|r| &r.kind);
        if !matches!(kind, Some(AuthorizationKind::ConfirmationCode)) {
            return Err(CovaultError::invalid_transition(
                "workflow is not code-authorized",
            ));
        }
        if token.digest != self.digest {
            warn!(wallet = %self.request.wallet_id, "code token bound to a different payload");
            return Err(CovaultError::invalid_or_expired_code(
                "token does not match the proposal in flight",
            ));
        }

        info!(wallet = %self.request.wallet_id, "confirmation code accepted");
        self.evidence.code_token = Some(token);
        self.state = WorkflowState::Authorized;
        Ok(&self.state)
    }

    /// Commit the proposed policy to the remote store, exactly once.
    ///
    /// A version conflict means another device changed the policy since
    /// this proposal was drafted; the workflow cancels itself and
    /// surfaces `StalePolicyVersion` instead of overwriting. Transient
    /// store failures return the workflow to `Authorized` so the caller
    /// may retry.
    pub async fn commit<S: crate::effects::PolicyStoreEffects + ?Sized>(
        &mut self,
        store: &S,
    ) -> CovaultResult<VersionToken> {
        if self.state != WorkflowState::Authorized {
            return Err(CovaultError::invalid_transition(format!(
                "commit from {:?}",
                self.state
            )));
        }
        self.state = WorkflowState::Committing;

        let result = store
            .commit_policy(
                &self.request.group_id,
                &self.request.wallet_id,
                &self.request.proposed_policy,
                &self.current_version,
            )
            .await;

        match result {
            Ok(version) => {
                info!(wallet = %self.request.wallet_id, %version, "policy committed");
                self.state = WorkflowState::Committed {
                    version: version.clone(),
                };
                Ok(version)
            }
            Err(err @ CovaultError::StalePolicyVersion { .. }) => {
                warn!(wallet = %self.request.wallet_id, "commit conflict, cancelling workflow");
                self.state = WorkflowState::Cancelled;
                Err(err)
            }
            Err(err) => {
                warn!(wallet = %self.request.wallet_id, %err, "commit failed, returning to authorized");
                self.state = WorkflowState::Authorized;
                Err(err)
            }
        }
    }

    /// Cancel the workflow.
    ///
    /// Cancels the outstanding dummy transaction, if any, so its partial
    /// signatures can never back a different proposal. Cancelling an
    /// already-cancelled or expired workflow is a no-op; a committed
    /// workflow cannot be cancelled.
    pub async fn cancel<D: DummyTransactionEffects + ?Sized>(
        &mut self,
        dummy_transactions: &D,
    ) -> CovaultResult<()> {
        match &self.state {
            WorkflowState::Committed { .. } => {
                return Err(CovaultError::invalid_transition(
                    "cannot cancel a committed workflow",
                ))
            }
            WorkflowState::Cancelled | WorkflowState::Expired => return Ok(()),
            WorkflowState::Draft
            | WorkflowState::AwaitingAuthorization
            | WorkflowState::Authorized
            | WorkflowState::Committing => {}
        }

        if let Some(tx) = self
            .required
            .as_ref()
            .and_then(|r| r.dummy_transaction_id.clone())
        {
            dummy_transactions
                .cancel_dummy_transaction(&self.request.group_id, &self.request.wallet_id, &tx)
                .await?;
        }
        info!(wallet = %self.request.wallet_id, "workflow cancelled");
        self.state = WorkflowState::Cancelled;
        Ok(())
    }

    /// Expire the workflow if its evidence-collection deadline passed.
    ///
    /// Returns `WorkflowExpired` exactly when the transition to `Expired`
    /// happens (or already happened); otherwise does nothing.
    pub fn check_expiry(&mut self, now: PhysicalTime) -> CovaultResult<()> {
        if self.state == WorkflowState::Expired {
            return Err(CovaultError::workflow_expired("deadline passed"));
        }
        if self.state != WorkflowState::AwaitingAuthorization {
            return Ok(());
        }
        if let Some(deadline) = self.deadline {
            if now >= deadline {
                warn!(wallet = %self.request.wallet_id, %deadline, "evidence collection expired");
                self.state = WorkflowState::Expired;
                return Err(CovaultError::workflow_expired("deadline passed"));
            }
        }
        Ok(())
    }

    fn ensure_awaiting(&self, op: &str) -> CovaultResult<()> {
        if self.state != WorkflowState::AwaitingAuthorization {
            return Err(CovaultError::invalid_transition(format!(
                "{op} from {:?}",
                self.state
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::{DummyTransactionEffects, PolicyStoreEffects};
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use covault_core::{Amount, Role, TransactionId};
    use covault_policy::{SpendingPolicy, SpendingTimeUnit};
    use parking_lot::Mutex;
    use std::collections::HashMap;

    /// In-memory policy store with a monotonically bumped version token.
    struct MemoryStore {
        state: Mutex<(GroupKeyPolicy, u64)>,
    }

    impl MemoryStore {
        fn new(policy: GroupKeyPolicy) -> Self {
            Self {
                state: Mutex::new((policy, 1)),
            }
        }

        fn version(&self) -> VersionToken {
            VersionToken::new(format!("v{}", self.state.lock().1))
        }

        /// Simulate another device committing first.
        fn external_bump(&self) {
            self.state.lock().1 += 1;
        }
    }

    #[async_trait]
    impl PolicyStoreEffects for MemoryStore {
        async fn get_policy(
            &self,
            _group: &GroupId,
            _wallet: &WalletId,
        ) -> CovaultResult<(GroupKeyPolicy, VersionToken)> {
            let state = self.state.lock();
            Ok((state.0.clone(), VersionToken::new(format!("v{}", state.1))))
        }

        async fn commit_policy(
            &self,
            _group: &GroupId,
            _wallet: &WalletId,
            policy: &GroupKeyPolicy,
            expected: &VersionToken,
        ) -> CovaultResult<VersionToken> {
            let mut state = self.state.lock();
            if expected.as_str() != format!("v{}", state.1) {
                return Err(CovaultError::stale_policy_version(format!(
                    "expected {expected}, store at v{}",
                    state.1
                )));
            }
            state.0 = policy.clone();
            state.1 += 1;
            Ok(VersionToken::new(format!("v{}", state.1)))
        }
    }

    /// Records created and cancelled dummy transactions.
    #[derive(Default)]
    struct MemoryDummyTransactions {
        created: Mutex<HashMap<TransactionId, PolicyChangeDigest>>,
        cancelled: Mutex<Vec<TransactionId>>,
    }

    #[async_trait]
    impl DummyTransactionEffects for MemoryDummyTransactions {
        async fn create_dummy_transaction(
            &self,
            _group: &GroupId,
            _wallet: &WalletId,
            payload_digest: &PolicyChangeDigest,
        ) -> CovaultResult<TransactionId> {
            let mut created = self.created.lock();
            let tx = TransactionId::new(format!("dummy-{}", created.len() + 1));
            created.insert(tx.clone(), *payload_digest);
            Ok(tx)
        }

        async fn cancel_dummy_transaction(
            &self,
            _group: &GroupId,
            _wallet: &WalletId,
            transaction: &TransactionId,
        ) -> CovaultResult<()> {
            self.cancelled.lock().push(transaction.clone());
            Ok(())
        }
    }

    fn member(seed: u8, role: Role) -> Member {
        Member::new(
            MembershipId::new_from_entropy([seed; 32]),
            format!("m{seed}@example.com"),
            None,
            role,
        )
    }

    fn uniform_usd_daily(cents: u64) -> GroupKeyPolicy {
        GroupKeyPolicy::uniform(
            SpendingPolicy::new(Amount::fiat(cents, "USD"), SpendingTimeUnit::Daily),
            0,
            true,
        )
    }

    fn request(proposer: &Member, cents: u64) -> PolicyChangeRequest {
        PolicyChangeRequest {
            wallet_id: WalletId::new_from_entropy([10u8; 32]),
            group_id: GroupId::new_from_entropy([11u8; 32]),
            proposed_by: proposer.membership_id,
            proposed_policy: uniform_usd_daily(cents),
            created_at: PhysicalTime::from_secs(1_000),
        }
    }

    const NOW: PhysicalTime = PhysicalTime::from_secs(1_000);
    const DEADLINE: PhysicalTime = PhysicalTime::from_secs(10_000);

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }

    /// Alice (master), Bob (admin), Carol (keyholder); loosening
    /// 5000 -> 10000 USD/day needs 2 of {Alice, Bob}.
    #[tokio::test]
    async fn loosening_collects_two_signatures_then_commits() {
        init_tracing();
        let alice = member(1, Role::Master);
        let bob = member(2, Role::Admin);
        let carol = member(3, Role::KeyHolder);
        let roster = vec![alice.clone(), bob.clone(), carol.clone()];

        let store = MemoryStore::new(uniform_usd_daily(5_000_00));
        let dummies = MemoryDummyTransactions::default();
        let request = request(&alice, 10_000_00);
        let (current, version) = store.get_policy(&request.group_id, &request.wallet_id).await.unwrap();

        let mut workflow = PolicyChangeWorkflow::new(request, current, version).unwrap();
        assert_eq!(workflow.state(), &WorkflowState::Draft);

        workflow
            .begin_authorization(&roster, DEADLINE, &dummies)
            .await
            .unwrap();
        assert_eq!(workflow.state(), &WorkflowState::AwaitingAuthorization);
        let required = workflow.required_authorization().unwrap();
        assert!(required.dummy_transaction_id.is_some());
        match &required.kind {
            AuthorizationKind::MemberSignatures {
                required_count,
                eligible,
            } => {
                assert_eq!(*required_count, 2);
                assert!(eligible.contains(&alice.membership_id));
                assert!(eligible.contains(&bob.membership_id));
                assert!(!eligible.contains(&carol.membership_id));
            }
            other => panic!("expected member signatures, got {other:?}"),
        }

        workflow
            .submit_signature(alice.membership_id, "sig-alice", NOW)
            .unwrap();
        assert_eq!(workflow.state(), &WorkflowState::AwaitingAuthorization);
        assert_eq!(workflow.pending_signatures(), 1);

        workflow
            .submit_signature(bob.membership_id, "sig-bob", NOW)
            .unwrap();
        assert_eq!(workflow.state(), &WorkflowState::Authorized);

        let version = workflow.commit(&store).await.unwrap();
        assert_eq!(version, VersionToken::new("v2"));
        assert_eq!(workflow.state(), &WorkflowState::Committed { version });
        assert_eq!(store.state.lock().0, uniform_usd_daily(10_000_00));
    }

    #[tokio::test]
    async fn duplicate_signatures_do_not_advance_the_quorum() {
        let alice = member(1, Role::Master);
        let bob = member(2, Role::Admin);
        let roster = vec![alice.clone(), bob.clone()];

        let store = MemoryStore::new(uniform_usd_daily(5_000_00));
        let dummies = MemoryDummyTransactions::default();
        let request = request(&alice, 10_000_00);
        let mut workflow =
            PolicyChangeWorkflow::new(request, uniform_usd_daily(5_000_00), store.version())
                .unwrap();
        workflow
            .begin_authorization(&roster, DEADLINE, &dummies)
            .await
            .unwrap();

        workflow
            .submit_signature(alice.membership_id, "sig-1", NOW)
            .unwrap();
        workflow
            .submit_signature(alice.membership_id, "sig-2", NOW)
            .unwrap();

        assert_eq!(workflow.collected_signatures(), 1);
        assert_eq!(workflow.state(), &WorkflowState::AwaitingAuthorization);
        // The first submission is the one kept.
        assert_eq!(
            workflow.evidence().signatures.get(&alice.membership_id),
            Some(&"sig-1".to_string())
        );
    }

    #[tokio::test]
    async fn ineligible_signature_is_rejected_without_state_change() {
        let alice = member(1, Role::Master);
        let bob = member(2, Role::Admin);
        let carol = member(3, Role::KeyHolder);
        let roster = vec![alice.clone(), bob.clone(), carol.clone()];

        let store = MemoryStore::new(uniform_usd_daily(5_000_00));
        let dummies = MemoryDummyTransactions::default();
        let mut workflow = PolicyChangeWorkflow::new(
            request(&alice, 10_000_00),
            uniform_usd_daily(5_000_00),
            store.version(),
        )
        .unwrap();
        workflow
            .begin_authorization(&roster, DEADLINE, &dummies)
            .await
            .unwrap();

        let err = workflow
            .submit_signature(carol.membership_id, "sig-carol", NOW)
            .unwrap_err();
        assert_matches!(err, CovaultError::InsufficientAuthorization { .. });
        assert_eq!(workflow.collected_signatures(), 0);
        assert_eq!(workflow.state(), &WorkflowState::AwaitingAuthorization);
    }

    #[tokio::test]
    async fn tightening_skips_evidence_collection() {
        let alice = member(1, Role::Master);
        let bob = member(2, Role::Admin);
        let roster = vec![alice.clone(), bob.clone()];

        let store = MemoryStore::new(uniform_usd_daily(5_000_00));
        let dummies = MemoryDummyTransactions::default();
        let mut workflow = PolicyChangeWorkflow::new(
            request(&alice, 1_000_00),
            uniform_usd_daily(5_000_00),
            store.version(),
        )
        .unwrap();

        workflow
            .begin_authorization(&roster, DEADLINE, &dummies)
            .await
            .unwrap();
        assert_eq!(workflow.state(), &WorkflowState::Authorized);
        assert!(dummies.created.lock().is_empty());

        workflow.commit(&store).await.unwrap();
        assert_matches!(workflow.state(), WorkflowState::Committed { .. });
    }

    #[tokio::test]
    async fn commit_conflict_cancels_instead_of_overwriting() {
        let alice = member(1, Role::Master);
        let bob = member(2, Role::Admin);
        let roster = vec![alice.clone(), bob.clone()];

        let store = MemoryStore::new(uniform_usd_daily(5_000_00));
        let dummies = MemoryDummyTransactions::default();
        let mut workflow = PolicyChangeWorkflow::new(
            request(&alice, 10_000_00),
            uniform_usd_daily(5_000_00),
            store.version(),
        )
        .unwrap();
        workflow
            .begin_authorization(&roster, DEADLINE, &dummies)
            .await
            .unwrap();
        workflow
            .submit_signature(alice.membership_id, "a", NOW)
            .unwrap();
        workflow
            .submit_signature(bob.membership_id, "b", NOW)
            .unwrap();

        // Another device commits first.
        store.external_bump();

        let err = workflow.commit(&store).await.unwrap_err();
        assert_matches!(err, CovaultError::StalePolicyVersion { .. });
        assert_eq!(workflow.state(), &WorkflowState::Cancelled);
        // The stale proposal never reached the store.
        assert_eq!(store.state.lock().0, uniform_usd_daily(5_000_00));
    }

    #[tokio::test]
    async fn cancel_revokes_the_dummy_transaction() {
        let alice = member(1, Role::Master);
        let bob = member(2, Role::Admin);
        let roster = vec![alice.clone(), bob.clone()];

        let store = MemoryStore::new(uniform_usd_daily(5_000_00));
        let dummies = MemoryDummyTransactions::default();
        let mut workflow = PolicyChangeWorkflow::new(
            request(&alice, 10_000_00),
            uniform_usd_daily(5_000_00),
            store.version(),
        )
        .unwrap();
        workflow
            .begin_authorization(&roster, DEADLINE, &dummies)
            .await
            .unwrap();
        let tx = workflow
            .required_authorization()
            .unwrap()
            .dummy_transaction_id
            .clone()
            .unwrap();

        workflow.cancel(&dummies).await.unwrap();
        assert_eq!(workflow.state(), &WorkflowState::Cancelled);
        assert_eq!(dummies.cancelled.lock().as_slice(), &[tx]);

        // Idempotent.
        workflow.cancel(&dummies).await.unwrap();
        assert_eq!(dummies.cancelled.lock().len(), 1);
    }

    #[tokio::test]
    async fn committed_workflow_cannot_be_cancelled() {
        let alice = member(1, Role::Master);
        let bob = member(2, Role::Admin);
        let roster = vec![alice.clone(), bob.clone()];

        let store = MemoryStore::new(uniform_usd_daily(5_000_00));
        let dummies = MemoryDummyTransactions::default();
        let mut workflow = PolicyChangeWorkflow::new(
            request(&alice, 1_000_00),
            uniform_usd_daily(5_000_00),
            store.version(),
        )
        .unwrap();
        workflow
            .begin_authorization(&roster, DEADLINE, &dummies)
            .await
            .unwrap();
        workflow.commit(&store).await.unwrap();

        let err = workflow.cancel(&dummies).await.unwrap_err();
        assert_matches!(err, CovaultError::InvalidTransition { .. });
    }

    #[tokio::test]
    async fn deadline_expires_evidence_collection() {
        let alice = member(1, Role::Master);
        let bob = member(2, Role::Admin);
        let roster = vec![alice.clone(), bob.clone()];

        let store = MemoryStore::new(uniform_usd_daily(5_000_00));
        let dummies = MemoryDummyTransactions::default();
        let mut workflow = PolicyChangeWorkflow::new(
            request(&alice, 10_000_00),
            uniform_usd_daily(5_000_00),
            store.version(),
        )
        .unwrap();
        workflow
            .begin_authorization(&roster, DEADLINE, &dummies)
            .await
            .unwrap();

        let err = workflow
            .submit_signature(alice.membership_id, "late", DEADLINE)
            .unwrap_err();
        assert_matches!(err, CovaultError::WorkflowExpired { .. });
        assert_eq!(workflow.state(), &WorkflowState::Expired);
    }

    #[tokio::test]
    async fn keyholder_cannot_propose() {
        let alice = member(1, Role::Master);
        let carol = member(3, Role::KeyHolder);
        let roster = vec![alice.clone(), carol.clone()];

        let store = MemoryStore::new(uniform_usd_daily(5_000_00));
        let dummies = MemoryDummyTransactions::default();
        let mut workflow = PolicyChangeWorkflow::new(
            request(&carol, 10_000_00),
            uniform_usd_daily(5_000_00),
            store.version(),
        )
        .unwrap();

        let err = workflow
            .begin_authorization(&roster, DEADLINE, &dummies)
            .await
            .unwrap_err();
        assert_matches!(err, CovaultError::InsufficientAuthorization { .. });
        assert_eq!(workflow.state(), &WorkflowState::Draft);
    }

    #[tokio::test]
    async fn code_token_for_another_proposal_is_rejected() {
        let alice = member(1, Role::Master);
        let roster = vec![alice.clone()];

        let store = MemoryStore::new(uniform_usd_daily(5_000_00));
        let dummies = MemoryDummyTransactions::default();
        let mut workflow = PolicyChangeWorkflow::new(
            request(&alice, 10_000_00),
            uniform_usd_daily(5_000_00),
            store.version(),
        )
        .unwrap();
        workflow
            .begin_authorization(&roster, DEADLINE, &dummies)
            .await
            .unwrap();
        assert_eq!(workflow.state(), &WorkflowState::AwaitingAuthorization);
        assert_matches!(
            workflow.required_authorization().unwrap().kind,
            AuthorizationKind::ConfirmationCode
        );

        // Token bound to a different payload digest.
        let foreign = crate::confirmation::VerifiedCodeToken {
            code_id: crate::confirmation::CodeId("other".into()),
            action: "update_server_key".into(),
            digest: PolicyChangeDigest::compute(&"another payload").unwrap(),
            verified_at: NOW,
        };
        let err = workflow.submit_code_token(foreign, NOW).unwrap_err();
        assert_matches!(err, CovaultError::InvalidOrExpiredCode { .. });
        assert_eq!(workflow.state(), &WorkflowState::AwaitingAuthorization);

        // The right token authorizes.
        let token = crate::confirmation::VerifiedCodeToken {
            code_id: crate::confirmation::CodeId("mine".into()),
            action: "update_server_key".into(),
            digest: *workflow.digest(),
            verified_at: NOW,
        };
        workflow.submit_code_token(token, NOW).unwrap();
        assert_eq!(workflow.state(), &WorkflowState::Authorized);
    }

    #[tokio::test]
    async fn signature_submission_order_does_not_matter() {
        let alice = member(1, Role::Master);
        let bob = member(2, Role::Admin);
        let charlie = member(4, Role::Admin);
        let roster = vec![alice.clone(), bob.clone(), charlie.clone()];

        let store = MemoryStore::new(uniform_usd_daily(5_000_00));

        let mut orders = vec![
            vec![&alice, &bob],
            vec![&bob, &alice],
            vec![&charlie, &alice],
        ];
        for order in orders.drain(..) {
            let dummies = MemoryDummyTransactions::default();
            let mut workflow = PolicyChangeWorkflow::new(
                request(&alice, 10_000_00),
                uniform_usd_daily(5_000_00),
                store.version(),
            )
            .unwrap();
            workflow
                .begin_authorization(&roster, DEADLINE, &dummies)
                .await
                .unwrap();
            for signer in order {
                workflow
                    .submit_signature(signer.membership_id, "sig", NOW)
                    .unwrap();
            }
            assert_eq!(workflow.state(), &WorkflowState::Authorized);
        }
    }
}
