//! Signing-delay windows between co-signing and broadcast
//!
//! A nonzero signing delay gives wallet members a window to notice and
//! cancel a co-signed transaction before it broadcasts. The scheduler only
//! tracks windows and answers whether one has elapsed; wall-clock timers
//! and the actual broadcast belong to the external task-scheduling
//! collaborator, which polls [`SigningDelayScheduler::is_due`] with its
//! own notion of now. That keeps this module free of clock side effects.

use covault_core::{PhysicalTime, TransactionId, WalletId};
use covault_policy::GroupKeyPolicy;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// Status of one delayed-broadcast window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WindowStatus {
    /// Waiting for the delay to elapse
    Pending,
    /// Broadcast happened; terminal
    Broadcast,
    /// Cancelled before broadcast; terminal
    Cancelled,
}

/// One co-signed transaction waiting out its signing delay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelayedBroadcastWindow {
    /// Wallet the transaction belongs to
    pub wallet_id: WalletId,
    /// The co-signed transaction
    pub transaction_id: TransactionId,
    /// When the server key co-signed
    pub queued_at: PhysicalTime,
    /// Delay from the policy at co-signing time, in seconds
    pub delay_secs: u32,
    /// Current status
    pub status: WindowStatus,
}

impl DelayedBroadcastWindow {
    /// Whether the delay has elapsed and the window is still pending.
    ///
    /// Cancelled and already-broadcast windows are never due.
    pub fn is_due(&self, now: PhysicalTime) -> bool {
        self.status == WindowStatus::Pending
            && now >= self.queued_at.plus_secs(u64::from(self.delay_secs))
    }
}

/// Outcome of co-signing under a policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoSignOutcome {
    /// No delay applies; broadcasting is the caller's business
    ImmediateBroadcast,
    /// The transaction waits out this window
    Delayed(DelayedBroadcastWindow),
}

/// Tracks delayed-broadcast windows per transaction.
#[derive(Debug, Default)]
pub struct SigningDelayScheduler {
    windows: Mutex<HashMap<TransactionId, DelayedBroadcastWindow>>,
}

impl SigningDelayScheduler {
    /// Create an empty scheduler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a co-signed transaction under `policy`.
    ///
    /// With a zero delay, or with auto-broadcast off (the members
    /// broadcast manually), no window is created.
    pub fn on_co_signed(
        &self,
        wallet_id: WalletId,
        transaction_id: TransactionId,
        policy: &GroupKeyPolicy,
        now: PhysicalTime,
    ) -> CoSignOutcome {
        if policy.signing_delay_secs == 0 || !policy.auto_broadcast {
            return CoSignOutcome::ImmediateBroadcast;
        }

        let window = DelayedBroadcastWindow {
            wallet_id,
            transaction_id: transaction_id.clone(),
            queued_at: now,
            delay_secs: policy.signing_delay_secs,
            status: WindowStatus::Pending,
        };
        debug!(%transaction_id, delay_secs = policy.signing_delay_secs, "delay window opened");
        self.windows
            .lock()
            .insert(transaction_id, window.clone());
        CoSignOutcome::Delayed(window)
    }

    /// Whether the transaction's window has elapsed. Unknown transactions
    /// are never due.
    pub fn is_due(&self, transaction_id: &TransactionId, now: PhysicalTime) -> bool {
        self.windows
            .lock()
            .get(transaction_id)
            .is_some_and(|w| w.is_due(now))
    }

    /// Cancel a window, e.g. because the policy changed or the
    /// transaction was replaced.
    ///
    /// Idempotent: unknown, already-cancelled, and already-broadcast
    /// windows are left alone.
    pub fn cancel(&self, transaction_id: &TransactionId) {
        let mut windows = self.windows.lock();
        if let Some(window) = windows.get_mut(transaction_id) {
            if window.status == WindowStatus::Pending {
                debug!(%transaction_id, "delay window cancelled");
                window.status = WindowStatus::Cancelled;
            }
        }
    }

    /// Mark a window broadcast once the task scheduler has fired it.
    /// No-op unless the window is still pending.
    pub fn mark_broadcast(&self, transaction_id: &TransactionId) {
        let mut windows = self.windows.lock();
        if let Some(window) = windows.get_mut(transaction_id) {
            if window.status == WindowStatus::Pending {
                window.status = WindowStatus::Broadcast;
            }
        }
    }

    /// Snapshot of a tracked window.
    pub fn window(&self, transaction_id: &TransactionId) -> Option<DelayedBroadcastWindow> {
        self.windows.lock().get(transaction_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use covault_core::Amount;
    use covault_policy::{SpendingPolicy, SpendingTimeUnit};

    fn policy(delay_secs: u32, auto_broadcast: bool) -> GroupKeyPolicy {
        GroupKeyPolicy::uniform(
            SpendingPolicy::new(Amount::fiat(5_000_00, "USD"), SpendingTimeUnit::Daily),
            delay_secs,
            auto_broadcast,
        )
    }

    fn wallet() -> WalletId {
        WalletId::new_from_entropy([1u8; 32])
    }

    const T: PhysicalTime = PhysicalTime::from_secs(50_000);

    #[test]
    fn zero_delay_broadcasts_immediately() {
        let scheduler = SigningDelayScheduler::new();
        let outcome = scheduler.on_co_signed(wallet(), TransactionId::new("tx"), &policy(0, true), T);
        assert_eq!(outcome, CoSignOutcome::ImmediateBroadcast);
        assert!(scheduler.window(&TransactionId::new("tx")).is_none());
    }

    #[test]
    fn manual_broadcast_wallets_get_no_window() {
        let scheduler = SigningDelayScheduler::new();
        let outcome =
            scheduler.on_co_signed(wallet(), TransactionId::new("tx"), &policy(3_600, false), T);
        assert_eq!(outcome, CoSignOutcome::ImmediateBroadcast);
    }

    #[test]
    fn window_becomes_due_exactly_at_the_boundary() {
        let scheduler = SigningDelayScheduler::new();
        let tx = TransactionId::new("tx");
        scheduler.on_co_signed(wallet(), tx.clone(), &policy(3_600, true), T);

        assert!(!scheduler.is_due(&tx, T.plus_secs(3_599)));
        assert!(scheduler.is_due(&tx, T.plus_secs(3_600)));
        assert!(scheduler.is_due(&tx, T.plus_secs(4_000)));
    }

    #[test]
    fn cancelled_window_is_never_due() {
        let scheduler = SigningDelayScheduler::new();
        let tx = TransactionId::new("tx");
        scheduler.on_co_signed(wallet(), tx.clone(), &policy(3_600, true), T);

        scheduler.cancel(&tx);
        assert!(!scheduler.is_due(&tx, T.plus_secs(3_600)));
        assert_eq!(
            scheduler.window(&tx).unwrap().status,
            WindowStatus::Cancelled
        );
    }

    #[test]
    fn cancel_is_idempotent_and_preserves_broadcast() {
        let scheduler = SigningDelayScheduler::new();
        let tx = TransactionId::new("tx");
        scheduler.on_co_signed(wallet(), tx.clone(), &policy(60, true), T);

        // Double cancel: still just cancelled.
        scheduler.cancel(&tx);
        scheduler.cancel(&tx);
        assert_eq!(
            scheduler.window(&tx).unwrap().status,
            WindowStatus::Cancelled
        );

        // Cancelling a broadcast window does not un-broadcast it.
        let tx2 = TransactionId::new("tx2");
        scheduler.on_co_signed(wallet(), tx2.clone(), &policy(60, true), T);
        scheduler.mark_broadcast(&tx2);
        scheduler.cancel(&tx2);
        assert_eq!(
            scheduler.window(&tx2).unwrap().status,
            WindowStatus::Broadcast
        );

        // Unknown transaction: no-op, no panic.
        scheduler.cancel(&TransactionId::new("missing"));
    }

    #[test]
    fn unknown_transactions_are_never_due() {
        let scheduler = SigningDelayScheduler::new();
        assert!(!scheduler.is_due(&TransactionId::new("missing"), T));
    }

    #[test]
    fn broadcast_window_is_no_longer_due() {
        let scheduler = SigningDelayScheduler::new();
        let tx = TransactionId::new("tx");
        scheduler.on_co_signed(wallet(), tx.clone(), &policy(60, true), T);

        assert!(scheduler.is_due(&tx, T.plus_secs(60)));
        scheduler.mark_broadcast(&tx);
        assert!(!scheduler.is_due(&tx, T.plus_secs(60)));
    }
}
