//! Transfer & Redemption Lifecycle Engine
//!
//! Turns a matched offer/request pair into a secured, time-bounded,
//! exactly-once-redeemable credential and manages its state through
//! issuance, activation, redemption, cancellation, and expiry.
//!
//! # State Machine
//!
//! ```text
//! PENDING → ACTIVE → USED → COMPLETED
//!    ↓        ↓  ↘
//!    └──→ CANCELLED  EXPIRED
//! ```
//!
//! # Safety Invariants
//!
//! 1. **Balance conservation**: a transfer debits its giver exactly once
//!    at creation and credits exactly once on cancellation.
//! 2. **Exactly-once redemption**: concurrent redeems serialize on the
//!    store's ACTIVE→USED CAS; only the first succeeds.
//! 3. **Terminal means terminal**: nothing leaves COMPLETED, CANCELLED, or
//!    EXPIRED - attempts fail loudly, never silently.
//! 4. **No partial creation**: a failed debit or a lost origin race leaves
//!    no transfer record behind.

pub mod engine;
pub mod error;
pub mod state;
pub mod types;

// Re-exports for convenience
pub use engine::TransferEngine;
pub use error::TransferError;
pub use state::TransferStatus;
pub use types::{
    InitiatedBy, IssueReport, RatingSide, RedemptionReceipt, SweepReport, Transfer,
    TransferDetails, TransferId, TransferOrigin, TransferStats, UserTransfers,
};
