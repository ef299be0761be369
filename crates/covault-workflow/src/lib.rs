//! # Covault Workflow
//!
//! Effectful orchestration around the pure policy core: the policy-change
//! workflow state machine, the per-wallet coordinator, one-time
//! confirmation codes for single-owner wallets, payload digests that bind
//! evidence to one exact proposal, and the signing-delay scheduler.
//!
//! External collaborators (remote policy store, membership roster,
//! dummy-transaction service) are reached only through the traits in
//! [`effects`]; the engine performs no I/O of its own and takes every
//! timestamp as an argument.

#![forbid(unsafe_code)]

/// One-time confirmation codes for low-quorum policy changes
pub mod confirmation;

/// Per-wallet policy-change coordination
pub mod coordinator;

/// Payload digests binding evidence to a proposal
pub mod digest;

/// Effect traits for external collaborators
pub mod effects;

/// Signing-delay windows between co-signing and broadcast
pub mod scheduler;

/// Policy-change workflow state machine
pub mod workflow;

pub use confirmation::{
    CodeId, ConfirmationCodeService, IssuedCode, VerifiedCodeToken, DEFAULT_CODE_TTL_SECS,
};
pub use coordinator::PolicyChangeCoordinator;
pub use digest::PolicyChangeDigest;
pub use effects::{
    DummyTransactionEffects, PolicyStoreEffects, RosterEffects, WorkflowEffects,
};
pub use scheduler::{
    CoSignOutcome, DelayedBroadcastWindow, SigningDelayScheduler, WindowStatus,
};
pub use workflow::{
    AuthorizationEvidence, PolicyChangeRequest, PolicyChangeWorkflow, WorkflowState,
};

pub use covault_core::{CovaultError, CovaultResult};
