//! Spending-limit evaluation
//!
//! Decides whether the server key may auto-sign a candidate outgoing
//! amount for a member under the wallet's policy. The evaluator is a pure
//! function of its inputs: the caller supplies the window anchor timestamp
//! and the amount already auto-signed inside the current window, and price
//! quotes come through the [`PriceSource`] seam.
//!
//! Every ambiguous situation denies. A member without a resolvable limit,
//! a failed currency conversion, and arithmetic overflow all fail closed;
//! nothing in this module ever defaults to "allow".

use crate::model::{GroupKeyPolicy, SpendingTimeUnit};
use chrono::{Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use covault_core::{Amount, CurrencyUnit, Member, PhysicalTime};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Conversion seam to the external price collaborator.
///
/// Implementations quote the value of `amount` in `to` at the given
/// instant. `None` means the quote is unavailable; the evaluator treats
/// that as a denial, never as parity.
pub trait PriceSource {
    /// Convert `amount` into `to` units at time `at`.
    fn convert(&self, amount: &Amount, to: &CurrencyUnit, at: PhysicalTime) -> Option<Amount>;
}

/// Why a spend was denied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DenyReason {
    /// The member's role can never spend autonomously
    NoSpendCapability,
    /// Per-member policy with no entry for this member
    NoLimitConfigured,
    /// Currency conversion to the limit's unit was unavailable
    ConversionUnavailable,
    /// Window total would exceed the limit
    LimitExceeded {
        /// The applicable limit
        limit: Amount,
        /// Prior window spend plus the candidate, in the limit's unit
        attempted: Amount,
    },
    /// Window total overflowed; treated the same as exceeding the limit
    ArithmeticOverflow,
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DenyReason::NoSpendCapability => write!(f, "role has no autonomous spend capability"),
            DenyReason::NoLimitConfigured => write!(f, "no spending limit configured for member"),
            DenyReason::ConversionUnavailable => write!(f, "currency conversion unavailable"),
            DenyReason::LimitExceeded { limit, attempted } => {
                write!(f, "window total {attempted} exceeds limit {limit}")
            }
            DenyReason::ArithmeticOverflow => write!(f, "window total overflowed"),
        }
    }
}

/// Outcome of evaluating a candidate spend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpendDecision {
    /// The server key may auto-sign
    Allow,
    /// The server key must not auto-sign
    Deny(DenyReason),
}

impl SpendDecision {
    /// Whether the decision allows auto-signing.
    pub fn is_allowed(&self) -> bool {
        matches!(self, SpendDecision::Allow)
    }
}

/// Start of the calendar window containing `anchor`.
///
/// Windows are aligned to UTC calendar boundaries: midnight for daily,
/// Monday midnight for weekly, the 1st for monthly, January 1st for
/// yearly. Callers use this to aggregate prior spend for the window.
/// Returns `None` only for timestamps outside the representable calendar
/// range.
pub fn window_start(unit: SpendingTimeUnit, anchor: PhysicalTime) -> Option<PhysicalTime> {
    let dt = anchor.to_utc()?;
    let date = dt.date_naive();

    let start_date: NaiveDate = match unit {
        SpendingTimeUnit::Daily => date,
        SpendingTimeUnit::Weekly => {
            date - Duration::days(i64::from(date.weekday().num_days_from_monday()))
        }
        SpendingTimeUnit::Monthly => NaiveDate::from_ymd_opt(date.year(), date.month(), 1)?,
        SpendingTimeUnit::Yearly => NaiveDate::from_ymd_opt(date.year(), 1, 1)?,
    };

    let start = Utc.from_utc_datetime(&start_date.and_time(NaiveTime::MIN));
    Some(PhysicalTime::from_utc(start))
}

/// Evaluates candidate spends against a wallet's co-signing policy.
///
/// Stateless; one value can be shared freely. Holds nothing but the
/// conversion seam would make it a ZST, so it is constructed per call site
/// for clarity.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpendingLimitEvaluator;

impl SpendingLimitEvaluator {
    /// Create an evaluator.
    pub fn new() -> Self {
        Self
    }

    /// Decide whether the server key may auto-sign `candidate` for
    /// `member`.
    ///
    /// `prior_spend_in_window` is the total already auto-signed for this
    /// member inside the window containing `window_anchor` (the caller
    /// aggregates it using [`window_start`]). Deterministic given
    /// identical inputs.
    pub fn evaluate(
        &self,
        policy: &GroupKeyPolicy,
        member: &Member,
        candidate: &Amount,
        window_anchor: PhysicalTime,
        prior_spend_in_window: &Amount,
        price: &dyn PriceSource,
    ) -> SpendDecision {
        if !member.role.can_spend_autonomously() {
            return SpendDecision::Deny(DenyReason::NoSpendCapability);
        }

        let limit = match policy.limit_for(&member.membership_id) {
            Some(limit) => limit,
            None => return SpendDecision::Deny(DenyReason::NoLimitConfigured),
        };

        let candidate = match to_unit(candidate, &limit.limit.unit, window_anchor, price) {
            Some(amount) => amount,
            None => return SpendDecision::Deny(DenyReason::ConversionUnavailable),
        };
        let prior = match to_unit(prior_spend_in_window, &limit.limit.unit, window_anchor, price) {
            Some(amount) => amount,
            None => return SpendDecision::Deny(DenyReason::ConversionUnavailable),
        };

        let total = match prior.checked_add(&candidate) {
            Some(total) => total,
            None => return SpendDecision::Deny(DenyReason::ArithmeticOverflow),
        };

        match total.partial_cmp_same_unit(&limit.limit) {
            Some(std::cmp::Ordering::Less | std::cmp::Ordering::Equal) => SpendDecision::Allow,
            Some(std::cmp::Ordering::Greater) => SpendDecision::Deny(DenyReason::LimitExceeded {
                limit: limit.limit.clone(),
                attempted: total,
            }),
            // Unreachable after conversion, but fail closed rather than panic.
            None => SpendDecision::Deny(DenyReason::ConversionUnavailable),
        }
    }
}

fn to_unit(
    amount: &Amount,
    unit: &CurrencyUnit,
    at: PhysicalTime,
    price: &dyn PriceSource,
) -> Option<Amount> {
    if &amount.unit == unit {
        return Some(amount.clone());
    }
    let converted = price.convert(amount, unit, at)?;
    // A converter answering in the wrong unit is a broken collaborator.
    if &converted.unit != unit {
        return None;
    }
    Some(converted)
}
