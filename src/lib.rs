//! SwipeShare - Campus Meal-Swipe Sharing Engine
//!
//! Students with surplus dining-hall swipes donate them to students in
//! need; redemption is proven through a digitally issued, single-use
//! credential (encrypted QR payload + human-readable backup code).
//!
//! # Modules
//!
//! - [`core_types`] - shared aliases (UserId, SwipeCount, LocationRule)
//! - [`models`] - Offer and Request entities with lifecycle status
//! - [`credential`] - credential issuance and validation
//! - [`ledger`] - donor swipe balances (debit on issue, credit on cancel)
//! - [`store`] - repository traits and in-memory stores
//! - [`transfer`] - the transfer lifecycle state machine (the core)
//! - [`matching`] - scorer-driven match selection with heuristic fallback

// Core types - must be first!
pub mod core_types;

// Platform components
pub mod credential;
pub mod ledger;
pub mod matching;
pub mod models;
pub mod store;
pub mod transfer;

// Runtime plumbing
pub mod config;
pub mod logging;

// Convenient re-exports at crate root
pub use config::AppConfig;
pub use core_types::{LocationRule, SwipeCount, UserId};
pub use credential::{CredentialIssuer, CredentialPayload, GenerationError, IssuedCredential};
pub use ledger::{LedgerError, SwipeLedger};
pub use matching::{
    HeuristicScorer, MatchCandidate, MatchSelector, MatchSubject, ScoredMatch, Scorer,
    UserProfile,
};
pub use models::{
    MatchingPreference, Offer, OfferDraft, OfferFilter, OfferStatus, Request, RequestDraft,
    RequestFilter, RequestStatus, Urgency,
};
pub use store::{
    InMemoryOfferStore, InMemoryRequestStore, InMemoryTransferStore, OfferRepo, RequestRepo,
    StoreError, TransferRepo,
};
pub use transfer::{
    RedemptionReceipt, Transfer, TransferDetails, TransferEngine, TransferError, TransferId,
    TransferOrigin, TransferStats, TransferStatus, UserTransfers,
};
