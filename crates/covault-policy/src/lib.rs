//! # Covault Policy
//!
//! Pure domain logic for server-key co-signing policies: the policy model,
//! the spending-limit evaluator, and the required-authorization
//! calculator for policy changes.
//!
//! Nothing in this crate performs I/O or reads the wall clock. Timestamps
//! and price quotes come in as arguments, which makes every decision here
//! deterministic and directly testable. The effectful workflow around
//! these functions lives in `covault-workflow`.

#![forbid(unsafe_code)]

/// Required-authorization calculation for policy changes
pub mod authorization;

/// Policy value types
pub mod model;

/// Spending-limit evaluation
pub mod spending;

pub use authorization::{
    AuthorizationKind, RequiredAuthorization, RequiredAuthorizationCalculator,
};
pub use model::{GroupKeyPolicy, SpendingLimits, SpendingPolicy, SpendingTimeUnit};
pub use spending::{
    window_start, DenyReason, PriceSource, SpendDecision, SpendingLimitEvaluator,
};
