//! Physical time as millisecond timestamps
//!
//! The engine never reads the wall clock. Every operation that depends on
//! time takes a `PhysicalTime` argument supplied by the caller, which keeps
//! the policy core deterministic and unit-testable with injected clocks.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A point in physical time, milliseconds since the Unix epoch (UTC).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
pub struct PhysicalTime {
    /// Milliseconds since the Unix epoch
    pub ts_ms: u64,
}

impl PhysicalTime {
    /// Create from milliseconds since the Unix epoch.
    pub const fn from_millis(ts_ms: u64) -> Self {
        Self { ts_ms }
    }

    /// Create from whole seconds since the Unix epoch.
    pub const fn from_secs(secs: u64) -> Self {
        Self {
            ts_ms: secs * 1_000,
        }
    }

    /// This instant advanced by `secs` seconds, saturating on overflow.
    pub fn plus_secs(self, secs: u64) -> Self {
        Self {
            ts_ms: self.ts_ms.saturating_add(secs.saturating_mul(1_000)),
        }
    }

    /// Convert to a UTC calendar datetime.
    ///
    /// Returns `None` for timestamps outside chrono's representable range.
    pub fn to_utc(self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.ts_ms as i64).single()
    }

    /// Convert from a UTC calendar datetime. Pre-epoch instants clamp to 0.
    pub fn from_utc(dt: DateTime<Utc>) -> Self {
        Self {
            ts_ms: dt.timestamp_millis().max(0) as u64,
        }
    }
}

impl fmt::Display for PhysicalTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_utc() {
            Some(dt) => write!(f, "{}", dt.to_rfc3339()),
            None => write!(f, "{}ms", self.ts_ms),
        }
    }
}
