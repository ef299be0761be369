//! Unified error system for Covault
//!
//! A single message-carrying error type shared by every crate in the
//! workspace. Callers match on the variant, never on the message text;
//! user-facing presentation lives outside this engine.

use serde::{Deserialize, Serialize};

/// Unified error type for all Covault operations
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, thiserror::Error)]
pub enum CovaultError {
    /// A policy value violated a structural invariant at construction time
    #[error("Malformed policy: {message}")]
    MalformedPolicy {
        /// Description of the violated invariant
        message: String,
    },

    /// Collected evidence does not satisfy the required authorization
    #[error("Insufficient authorization: {message}")]
    InsufficientAuthorization {
        /// Description of what is missing
        message: String,
    },

    /// Another policy change is already in flight for the wallet
    #[error("Conflicting proposal: {message}")]
    ConflictingProposal {
        /// Description of the conflicting proposal
        message: String,
    },

    /// The remote policy changed underneath an in-flight commit
    #[error("Stale policy version: {message}")]
    StalePolicyVersion {
        /// Description of the version mismatch
        message: String,
    },

    /// Currency conversion was unavailable; spend evaluation fails closed
    #[error("Conversion unavailable: {message}")]
    ConversionUnavailable {
        /// Description of the failed conversion
        message: String,
    },

    /// A confirmation code was wrong, already used, or past its expiry
    #[error("Invalid or expired code: {message}")]
    InvalidOrExpiredCode {
        /// Description of the rejection
        message: String,
    },

    /// The workflow's evidence-collection deadline passed
    #[error("Workflow expired: {message}")]
    WorkflowExpired {
        /// Description of the expired workflow
        message: String,
    },

    /// A state-machine transition was requested from the wrong state
    #[error("Invalid transition: {message}")]
    InvalidTransition {
        /// Description of the rejected transition
        message: String,
    },

    /// Resource not found
    #[error("Not found: {message}")]
    NotFound {
        /// Description of what was not found
        message: String,
    },

    /// Internal error in a collaborator or in the engine itself
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error
        message: String,
    },
}

impl CovaultError {
    /// Create a malformed-policy error
    pub fn malformed_policy(message: impl Into<String>) -> Self {
        Self::MalformedPolicy {
            message: message.into(),
        }
    }

    /// Create an insufficient-authorization error
    pub fn insufficient_authorization(message: impl Into<String>) -> Self {
        Self::InsufficientAuthorization {
            message: message.into(),
        }
    }

    /// Create a conflicting-proposal error
    pub fn conflicting_proposal(message: impl Into<String>) -> Self {
        Self::ConflictingProposal {
            message: message.into(),
        }
    }

    /// Create a stale-policy-version error
    pub fn stale_policy_version(message: impl Into<String>) -> Self {
        Self::StalePolicyVersion {
            message: message.into(),
        }
    }

    /// Create a conversion-unavailable error
    pub fn conversion_unavailable(message: impl Into<String>) -> Self {
        Self::ConversionUnavailable {
            message: message.into(),
        }
    }

    /// Create an invalid-or-expired-code error
    pub fn invalid_or_expired_code(message: impl Into<String>) -> Self {
        Self::InvalidOrExpiredCode {
            message: message.into(),
        }
    }

    /// Create a workflow-expired error
    pub fn workflow_expired(message: impl Into<String>) -> Self {
        Self::WorkflowExpired {
            message: message.into(),
        }
    }

    /// Create an invalid-transition error
    pub fn invalid_transition(message: impl Into<String>) -> Self {
        Self::InvalidTransition {
            message: message.into(),
        }
    }

    /// Create a not-found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

/// Standard Result type for Covault operations
pub type CovaultResult<T> = std::result::Result<T, CovaultError>;
