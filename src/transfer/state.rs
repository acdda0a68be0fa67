//! Transfer lifecycle states
//!
//! ```text
//! PENDING → ACTIVE → USED → COMPLETED
//!    ↓        ↓  ↘
//! CANCELLED   ↓   EXPIRED
//!          CANCELLED
//! ```
//!
//! PENDING is transient: the engine auto-advances PENDING→ACTIVE inside
//! `create_transfer` so the recipient can redeem immediately. COMPLETED,
//! CANCELLED, and EXPIRED are terminal.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Transfer status - the closed state enumeration.
///
/// All transitions go through [`TransferStatus::can_transition_to`]; any
/// pair not in the table is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransferStatus {
    /// Just created; not yet visible to the recipient.
    Pending,
    /// Credential live and redeemable.
    Active,
    /// Credential redeemed at a dining hall.
    Used,
    /// Terminal: redemption settled downstream.
    Completed,
    /// Terminal: withdrawn by a party before use; balance refunded.
    Cancelled,
    /// Terminal: redemption window elapsed without use.
    Expired,
}

impl TransferStatus {
    /// Terminal states admit no further transitions.
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransferStatus::Completed | TransferStatus::Cancelled | TransferStatus::Expired
        )
    }

    /// The transition table.
    pub fn can_transition_to(self, next: TransferStatus) -> bool {
        use TransferStatus::*;
        matches!(
            (self, next),
            (Pending, Active)
                | (Pending, Cancelled)
                | (Active, Used)
                | (Active, Cancelled)
                | (Active, Expired)
                | (Used, Completed)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransferStatus::Pending => "PENDING",
            TransferStatus::Active => "ACTIVE",
            TransferStatus::Used => "USED",
            TransferStatus::Completed => "COMPLETED",
            TransferStatus::Cancelled => "CANCELLED",
            TransferStatus::Expired => "EXPIRED",
        }
    }

    pub fn all() -> [TransferStatus; 6] {
        [
            TransferStatus::Pending,
            TransferStatus::Active,
            TransferStatus::Used,
            TransferStatus::Completed,
            TransferStatus::Cancelled,
            TransferStatus::Expired,
        ]
    }
}

impl fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
