//! Monetary amounts in integer minor units
//!
//! Amounts are unsigned integers in the smallest unit of their currency:
//! satoshis for the native unit, cents (or the currency's equivalent) for
//! fiat. All arithmetic is checked; comparisons are only defined between
//! amounts of the same unit, and anything that would need a price quote is
//! pushed to the conversion seam rather than guessed here.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The unit an amount or spending limit is denominated in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CurrencyUnit {
    /// The wallet's native unit (satoshis)
    Native,
    /// A fiat currency, ISO 4217 code (e.g. "USD")
    Fiat(String),
}

impl CurrencyUnit {
    /// Fiat unit from a currency code, normalized to upper case.
    pub fn fiat(code: impl AsRef<str>) -> Self {
        Self::Fiat(code.as_ref().to_ascii_uppercase())
    }
}

impl fmt::Display for CurrencyUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CurrencyUnit::Native => write!(f, "sat"),
            CurrencyUnit::Fiat(code) => write!(f, "{code}"),
        }
    }
}

/// An amount of money in minor units of its currency.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Amount {
    /// Value in minor units (satoshis, cents)
    pub value: u64,
    /// Unit the value is denominated in
    pub unit: CurrencyUnit,
}

impl Amount {
    /// Create an amount.
    pub fn new(value: u64, unit: CurrencyUnit) -> Self {
        Self { value, unit }
    }

    /// An amount in the native unit (satoshis).
    pub fn native(sats: u64) -> Self {
        Self::new(sats, CurrencyUnit::Native)
    }

    /// An amount in a fiat currency's minor units.
    pub fn fiat(value: u64, code: impl AsRef<str>) -> Self {
        Self::new(value, CurrencyUnit::fiat(code))
    }

    /// Whether this amount is zero.
    pub fn is_zero(&self) -> bool {
        self.value == 0
    }

    /// Checked addition. `None` if the units differ or the value overflows.
    pub fn checked_add(&self, other: &Amount) -> Option<Amount> {
        if self.unit != other.unit {
            return None;
        }
        Some(Amount {
            value: self.value.checked_add(other.value)?,
            unit: self.unit.clone(),
        })
    }

    /// Same-unit comparison. `None` when the units differ: ordering across
    /// units requires a price quote and must go through the conversion seam.
    pub fn partial_cmp_same_unit(&self, other: &Amount) -> Option<std::cmp::Ordering> {
        if self.unit != other.unit {
            return None;
        }
        Some(self.value.cmp(&other.value))
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.value, self.unit)
    }
}
