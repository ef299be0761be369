//! Per-wallet policy-change coordination
//!
//! The coordinator is the surface the application layer calls. It owns at
//! most one live workflow per wallet: a second proposal for the same
//! wallet is rejected with `ConflictingProposal` until the first reaches a
//! terminal state. This is an in-process convenience guard; across
//! devices the policy store's version token remains the authoritative
//! single-writer gate, and a workflow that loses that race cancels at
//! commit time.

use crate::confirmation::VerifiedCodeToken;
use crate::effects::WorkflowEffects;
use crate::workflow::{PolicyChangeRequest, PolicyChangeWorkflow, WorkflowState};
use covault_core::{CovaultError, CovaultResult, MembershipId, PhysicalTime, VersionToken, WalletId};
use covault_policy::RequiredAuthorization;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// Coordinates policy-change workflows across the wallets of one client.
pub struct PolicyChangeCoordinator<E: WorkflowEffects> {
    effects: Arc<E>,
    workflows: Mutex<HashMap<WalletId, PolicyChangeWorkflow>>,
}

impl<E: WorkflowEffects> PolicyChangeCoordinator<E> {
    /// Create a coordinator over the given collaborators.
    pub fn new(effects: Arc<E>) -> Self {
        Self {
            effects,
            workflows: Mutex::new(HashMap::new()),
        }
    }

    /// Propose a policy change.
    ///
    /// Fetches a fresh policy snapshot and roster, computes the
    /// authorization requirement, and leaves the workflow awaiting
    /// evidence (or already authorized, for a pure tightening). Fails
    /// with `ConflictingProposal` while another workflow for the wallet
    /// is still live.
    pub async fn propose(
        &self,
        request: PolicyChangeRequest,
        deadline: PhysicalTime,
    ) -> CovaultResult<WorkflowState> {
        let wallet_id = request.wallet_id;
        let mut workflows = self.workflows.lock().await;

        if let Some(existing) = workflows.get_mut(&wallet_id) {
            // A workflow whose deadline already passed must not hold the
            // slot against the new proposal.
            let _ = existing.check_expiry(request.created_at);
            if !existing.state().is_terminal() {
                return Err(CovaultError::conflicting_proposal(format!(
                    "wallet {wallet_id} already has a policy change in flight"
                )));
            }
            debug!(%wallet_id, "replacing terminal workflow");
        }

        let (current_policy, version) = self
            .effects
            .get_policy(&request.group_id, &request.wallet_id)
            .await?;
        let roster = self.effects.get_members(&request.group_id).await?;

        let mut workflow = PolicyChangeWorkflow::new(request, current_policy, version)?;
        workflow
            .begin_authorization(&roster, deadline, self.effects.as_ref())
            .await?;

        let state = workflow.state().clone();
        workflows.insert(wallet_id, workflow);
        Ok(state)
    }

    /// Submit one member's signature for the wallet's in-flight change.
    pub async fn submit_signature(
        &self,
        wallet_id: &WalletId,
        member: MembershipId,
        signature: impl Into<String>,
        now: PhysicalTime,
    ) -> CovaultResult<WorkflowState> {
        let mut workflows = self.workflows.lock().await;
        let workflow = in_flight(&mut workflows, wallet_id)?;
        let state = workflow.submit_signature(member, signature, now)?.clone();
        Ok(state)
    }

    /// Submit a verified confirmation-code token for the wallet's
    /// in-flight change.
    pub async fn submit_code_token(
        &self,
        wallet_id: &WalletId,
        token: VerifiedCodeToken,
        now: PhysicalTime,
    ) -> CovaultResult<WorkflowState> {
        let mut workflows = self.workflows.lock().await;
        let workflow = in_flight(&mut workflows, wallet_id)?;
        let state = workflow.submit_code_token(token, now)?.clone();
        Ok(state)
    }

    /// Commit the wallet's authorized change to the policy store.
    pub async fn commit(&self, wallet_id: &WalletId) -> CovaultResult<VersionToken> {
        let mut workflows = self.workflows.lock().await;
        let workflow = in_flight(&mut workflows, wallet_id)?;
        workflow.commit(self.effects.as_ref()).await
    }

    /// Cancel the wallet's in-flight change, revoking its dummy
    /// transaction.
    pub async fn cancel(&self, wallet_id: &WalletId) -> CovaultResult<()> {
        let mut workflows = self.workflows.lock().await;
        let workflow = in_flight(&mut workflows, wallet_id)?;
        workflow.cancel(self.effects.as_ref()).await
    }

    /// State of the wallet's most recent workflow, applying expiry first.
    pub async fn state(&self, wallet_id: &WalletId, now: PhysicalTime) -> Option<WorkflowState> {
        let mut workflows = self.workflows.lock().await;
        let workflow = workflows.get_mut(wallet_id)?;
        // Expiry is a state transition, not an error, from this view.
        let _ = workflow.check_expiry(now);
        Some(workflow.state().clone())
    }

    /// Authorization requirement of the wallet's most recent workflow,
    /// for rendering progress on a reattached in-flight change.
    pub async fn required_authorization(
        &self,
        wallet_id: &WalletId,
    ) -> Option<RequiredAuthorization> {
        let workflows = self.workflows.lock().await;
        workflows
            .get(wallet_id)?
            .required_authorization()
            .cloned()
    }
}

fn in_flight<'a>(
    workflows: &'a mut HashMap<WalletId, PolicyChangeWorkflow>,
    wallet_id: &WalletId,
) -> CovaultResult<&'a mut PolicyChangeWorkflow> {
    workflows
        .get_mut(wallet_id)
        .ok_or_else(|| CovaultError::not_found(format!("no policy change in flight for {wallet_id}")))
}
