//! Storage abstraction for offers, requests, and transfers
//!
//! The engine depends on these traits rather than concrete collections so
//! the in-memory stores can be swapped for a transactional backend without
//! touching business logic. State changes are CAS-style (`mark_* returns
//! whether the expected status matched`) so per-id serialization survives
//! the swap.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

pub mod offers;
pub mod requests;
pub mod transfers;

pub use offers::InMemoryOfferStore;
pub use requests::InMemoryRequestStore;
pub use transfers::InMemoryTransferStore;

use crate::core_types::{SwipeCount, UserId};
use crate::models::{Offer, OfferFilter, OfferId, Request, RequestFilter, RequestId};
use crate::transfer::state::TransferStatus;
use crate::transfer::types::{IssueReport, RatingSide, Transfer, TransferId};

#[derive(Debug, Error, Clone)]
pub enum StoreError {
    #[error("record not found: {0}")]
    NotFound(String),

    #[error("display code already in use")]
    DuplicateDisplayCode,

    #[error("user {user} does not own record {id}")]
    NotOwner { user: UserId, id: String },

    #[error("operation not allowed in status {0}")]
    InvalidStatus(String),

    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Donor offers.
#[async_trait]
pub trait OfferRepo: Send + Sync {
    async fn insert(&self, offer: Offer) -> Result<(), StoreError>;

    async fn get(&self, id: OfferId) -> Result<Option<Offer>, StoreError>;

    /// CAS ACTIVE → MATCHED, recording the matched recipient. Returns
    /// whether the offer was still active.
    async fn mark_transferred(
        &self,
        id: OfferId,
        recipient: &UserId,
    ) -> Result<bool, StoreError>;

    /// CAS MATCHED → ACTIVE after a transfer cancellation, clearing the
    /// matched recipient. The original expiry deadline is kept.
    async fn reactivate(&self, id: OfferId) -> Result<bool, StoreError>;

    /// Owner-initiated cancellation; only ACTIVE offers can be cancelled.
    async fn cancel(&self, id: OfferId, user: &UserId) -> Result<Offer, StoreError>;

    async fn list_active(
        &self,
        filter: &OfferFilter,
        now: DateTime<Utc>,
    ) -> Result<Vec<Offer>, StoreError>;
}

/// Recipient requests.
#[async_trait]
pub trait RequestRepo: Send + Sync {
    async fn insert(&self, request: Request) -> Result<(), StoreError>;

    async fn get(&self, id: RequestId) -> Result<Option<Request>, StoreError>;

    /// Atomically apply a fulfillment slice: decrement quantity, append to
    /// the history, and flip to FULFILLED when the remainder reaches zero.
    /// Fails with `InvalidStatus` unless the request is ACTIVE.
    async fn apply_fulfillment(
        &self,
        id: RequestId,
        giver: &UserId,
        quantity: SwipeCount,
        now: DateTime<Utc>,
    ) -> Result<Request, StoreError>;

    /// Restore quantity after a transfer cancellation and return the
    /// request to ACTIVE (unless the user cancelled it in the meantime).
    /// The original deadline is kept.
    async fn reactivate(
        &self,
        id: RequestId,
        restore: SwipeCount,
    ) -> Result<bool, StoreError>;

    /// Owner-initiated cancellation; only ACTIVE requests can be cancelled.
    async fn cancel(&self, id: RequestId, user: &UserId) -> Result<Request, StoreError>;

    async fn list_active(
        &self,
        filter: &RequestFilter,
        now: DateTime<Utc>,
    ) -> Result<Vec<Request>, StoreError>;

    /// CAS ACTIVE → EXPIRED for requests whose deadline has passed.
    /// Idempotent; returns how many flipped this pass.
    async fn expire_stale(&self, now: DateTime<Utc>) -> Result<usize, StoreError>;
}

/// Transfers, with the credential-id and display-code lookup indexes the
/// redemption paths need.
#[async_trait]
pub trait TransferRepo: Send + Sync {
    /// Insert a new transfer. Display codes are unique: a collision fails
    /// with `DuplicateDisplayCode` so the caller can re-issue.
    async fn insert(&self, transfer: Transfer) -> Result<(), StoreError>;

    /// Remove a transfer that never became visible (creation unwinding).
    async fn remove(&self, id: TransferId) -> Result<(), StoreError>;

    async fn get(&self, id: TransferId) -> Result<Option<Transfer>, StoreError>;

    async fn find_by_credential(&self, credential_id: Uuid)
    -> Result<Option<Transfer>, StoreError>;

    async fn find_by_display_code(&self, code: &str) -> Result<Option<Transfer>, StoreError>;

    /// CAS PENDING → ACTIVE, stamping `activated_at`.
    async fn activate(&self, id: TransferId, now: DateTime<Utc>) -> Result<bool, StoreError>;

    /// CAS ACTIVE → USED, stamping the redemption fields. The exactly-once
    /// guarantee hangs on this: concurrent calls serialize on the entry
    /// and only the first observes ACTIVE.
    async fn mark_used(
        &self,
        id: TransferId,
        location: &str,
        redeemed_by: &UserId,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// CAS USED → COMPLETED.
    async fn mark_completed(&self, id: TransferId, now: DateTime<Utc>)
    -> Result<bool, StoreError>;

    /// CAS `from` → CANCELLED, stamping who/why/when.
    async fn mark_cancelled(
        &self,
        id: TransferId,
        from: TransferStatus,
        by: &UserId,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// CAS ACTIVE → EXPIRED.
    async fn mark_expired(&self, id: TransferId, now: DateTime<Utc>)
    -> Result<bool, StoreError>;

    async fn record_rating(
        &self,
        id: TransferId,
        side: RatingSide,
        rating: u8,
        feedback: Option<String>,
    ) -> Result<(), StoreError>;

    async fn record_issue(&self, id: TransferId, report: IssueReport)
    -> Result<(), StoreError>;

    async fn list_for_user(&self, user: &UserId) -> Result<Vec<Transfer>, StoreError>;

    async fn list_all(&self) -> Result<Vec<Transfer>, StoreError>;
}
