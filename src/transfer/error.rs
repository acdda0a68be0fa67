//! Transfer error taxonomy
//!
//! Every validation failure is a typed, structured result so callers can
//! render specific user-facing messages. Error codes are stable strings
//! for API responses; `http_status` is a suggestion for whatever transport
//! fronts the engine.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::core_types::SwipeCount;
use crate::credential::GenerationError;
use crate::ledger::LedgerError;
use crate::models::{OfferId, RequestId};
use crate::store::StoreError;

use super::state::TransferStatus;

#[derive(Error, Debug, Clone)]
pub enum TransferError {
    // === Balance ===
    #[error("insufficient swipes available: {available} available, {requested} requested")]
    InsufficientBalance {
        available: SwipeCount,
        requested: SwipeCount,
    },

    // === Creation validation ===
    #[error("quantity must be greater than zero")]
    InvalidQuantity,

    #[error("giver and requester cannot be the same user")]
    SelfTransfer,

    #[error("offer {0} is not active")]
    OfferNotActive(OfferId),

    #[error("request {0} is not active")]
    RequestNotActive(RequestId),

    // === Redemption ===
    #[error("invalid or undecryptable credential")]
    InvalidCredential,

    #[error("this swipe belongs to another user")]
    UnauthorizedRedemption,

    #[error("this swipe has already been used")]
    AlreadyRedeemed,

    #[error("this swipe expired at {0}")]
    ExpiredCredential(DateTime<Utc>),

    #[error("this swipe is only valid at {expected}")]
    LocationMismatch { expected: String, presented: String },

    #[error("this swipe is not redeemable (status {0})")]
    NotRedeemable(TransferStatus),

    // === Lifecycle ===
    #[error("transfer not found: {0}")]
    TransferNotFound(String),

    #[error("cannot cancel: swipe has already been used")]
    AlreadyUsed,

    #[error("user is not a party to this transfer")]
    Unauthorized,

    #[error("invalid state transition: {0}")]
    InvalidState(String),

    #[error("rating must be between 1 and 5")]
    InvalidRating,

    // === System ===
    #[error("credential generation failed: {0}")]
    Generation(String),

    #[error("storage error: {0}")]
    Store(String),
}

impl TransferError {
    /// Stable error code for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            TransferError::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            TransferError::InvalidQuantity => "INVALID_QUANTITY",
            TransferError::SelfTransfer => "SELF_TRANSFER",
            TransferError::OfferNotActive(_) => "OFFER_NOT_ACTIVE",
            TransferError::RequestNotActive(_) => "REQUEST_NOT_ACTIVE",
            TransferError::InvalidCredential => "INVALID_CREDENTIAL",
            TransferError::UnauthorizedRedemption => "UNAUTHORIZED_REDEMPTION",
            TransferError::AlreadyRedeemed => "ALREADY_REDEEMED",
            TransferError::ExpiredCredential(_) => "EXPIRED_CREDENTIAL",
            TransferError::LocationMismatch { .. } => "LOCATION_MISMATCH",
            TransferError::NotRedeemable(_) => "NOT_REDEEMABLE",
            TransferError::TransferNotFound(_) => "TRANSFER_NOT_FOUND",
            TransferError::AlreadyUsed => "ALREADY_USED",
            TransferError::Unauthorized => "UNAUTHORIZED",
            TransferError::InvalidState(_) => "INVALID_STATE",
            TransferError::InvalidRating => "INVALID_RATING",
            TransferError::Generation(_) => "GENERATION_ERROR",
            TransferError::Store(_) => "STORE_ERROR",
        }
    }

    /// Suggested HTTP status for transports fronting the engine.
    pub fn http_status(&self) -> u16 {
        match self {
            TransferError::InvalidQuantity
            | TransferError::SelfTransfer
            | TransferError::InvalidCredential
            | TransferError::InvalidRating => 400,
            TransferError::UnauthorizedRedemption | TransferError::Unauthorized => 403,
            TransferError::TransferNotFound(_) => 404,
            TransferError::AlreadyRedeemed
            | TransferError::AlreadyUsed
            | TransferError::NotRedeemable(_)
            | TransferError::LocationMismatch { .. }
            | TransferError::InvalidState(_) => 409,
            TransferError::ExpiredCredential(_) => 410,
            TransferError::InsufficientBalance { .. }
            | TransferError::OfferNotActive(_)
            | TransferError::RequestNotActive(_) => 422,
            TransferError::Generation(_) | TransferError::Store(_) => 500,
        }
    }

    /// Whether the caller can do something about it (vs. a server fault).
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            TransferError::Generation(_) | TransferError::Store(_)
        )
    }
}

impl From<LedgerError> for TransferError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::InsufficientBalance {
                available,
                requested,
            } => TransferError::InsufficientBalance {
                available,
                requested,
            },
        }
    }
}

impl From<GenerationError> for TransferError {
    fn from(e: GenerationError) -> Self {
        TransferError::Generation(e.to_string())
    }
}

impl From<StoreError> for TransferError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(id) => TransferError::TransferNotFound(id),
            StoreError::NotOwner { .. } => TransferError::Unauthorized,
            StoreError::InvalidStatus(s) => TransferError::InvalidState(s),
            other => TransferError::Store(other.to_string()),
        }
    }
}
