//! Swipe balance ledger
//!
//! Single source of truth for how many swipes each donor can give away
//! right now. Balances are created lazily with the configured default
//! allotment and mutated only by the transfer engine: debit on transfer
//! creation, credit on cancellation refund.

use dashmap::DashMap;
use thiserror::Error;
use tracing::debug;

use crate::core_types::{SwipeCount, UserId};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("insufficient balance: {available} available, {requested} requested")]
    InsufficientBalance {
        available: SwipeCount,
        requested: SwipeCount,
    },
}

/// Per-user swipe balances.
///
/// # Concurrency
/// Debit and credit against the same user serialize on the map entry:
/// two concurrent debits against a balance of 1 cannot both succeed.
pub struct SwipeLedger {
    balances: DashMap<UserId, SwipeCount>,
    default_allotment: SwipeCount,
}

impl SwipeLedger {
    pub fn new(default_allotment: SwipeCount) -> Self {
        Self {
            balances: DashMap::new(),
            default_allotment,
        }
    }

    /// Current balance. Users unseen before report the default allotment;
    /// reading does not create an entry.
    pub fn balance(&self, user_id: &UserId) -> SwipeCount {
        self.balances
            .get(user_id)
            .map(|b| *b)
            .unwrap_or(self.default_allotment)
    }

    /// Atomically remove `quantity` swipes. Rejects overdraft: a debit
    /// that would go negative fails and leaves the balance unchanged.
    pub fn debit(
        &self,
        user_id: &UserId,
        quantity: SwipeCount,
    ) -> Result<SwipeCount, LedgerError> {
        let mut entry = self
            .balances
            .entry(user_id.clone())
            .or_insert(self.default_allotment);

        let available = *entry;
        if available < quantity {
            return Err(LedgerError::InsufficientBalance {
                available,
                requested: quantity,
            });
        }

        *entry -= quantity;
        let remaining = *entry;
        drop(entry);

        debug!(user_id = %user_id, quantity, remaining, "swipes debited");
        Ok(remaining)
    }

    /// Atomically add `quantity` swipes (cancellation refund). No upper
    /// bound is enforced here; weekly plan caps are an external concern.
    pub fn credit(&self, user_id: &UserId, quantity: SwipeCount) -> SwipeCount {
        let mut entry = self
            .balances
            .entry(user_id.clone())
            .or_insert(self.default_allotment);

        *entry = entry.saturating_add(quantity);
        let balance = *entry;
        drop(entry);

        debug!(user_id = %user_id, quantity, balance, "swipes credited");
        balance
    }
}
