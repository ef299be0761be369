//! # Covault Core
//!
//! Foundation types for the Covault co-signing policy engine: identifiers,
//! physical time, monetary amounts, member roles, and the unified error
//! type shared by every crate in the workspace.
//!
//! This crate has no I/O and no wall-clock access. Everything here is a
//! plain value type; the policy and workflow crates build on top.

#![forbid(unsafe_code)]

/// Monetary amounts in integer minor units
pub mod amount;

/// Unified error type and result alias
pub mod errors;

/// Identifier newtypes for wallets, groups, members, and opaque handles
pub mod identifiers;

/// Member roles and roster snapshots
pub mod roles;

/// Millisecond physical time
pub mod time;

pub use amount::{Amount, CurrencyUnit};
pub use errors::{CovaultError, CovaultResult};
pub use identifiers::{GroupId, MembershipId, TransactionId, VersionToken, WalletId};
pub use roles::{Member, Role};
pub use time::PhysicalTime;
