//! In-memory transfer store
//!
//! Holds the transfer records plus the two redemption lookup indexes
//! (credential id, display code). All state changes are CAS on the map
//! entry: the guard is held for the whole check-and-mutate, which is what
//! makes `mark_used` exactly-once under concurrent redemption.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::debug;
use uuid::Uuid;

use crate::core_types::UserId;
use crate::transfer::state::TransferStatus;
use crate::transfer::types::{IssueReport, RatingSide, Transfer, TransferId};

use super::{StoreError, TransferRepo};

#[derive(Default)]
pub struct InMemoryTransferStore {
    transfers: DashMap<TransferId, Transfer>,
    by_credential: DashMap<Uuid, TransferId>,
    by_display_code: DashMap<String, TransferId>,
}

impl InMemoryTransferStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run a CAS transition: the closure mutates the record only when the
    /// current status matches `expected`. Returns whether it fired.
    fn transition<F>(
        &self,
        id: TransferId,
        expected: TransferStatus,
        next: TransferStatus,
        apply: F,
    ) -> Result<bool, StoreError>
    where
        F: FnOnce(&mut Transfer),
    {
        debug_assert!(expected.can_transition_to(next));

        let mut transfer = self
            .transfers
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        if transfer.status != expected {
            return Ok(false);
        }

        transfer.status = next;
        apply(&mut transfer);
        debug!(transfer_id = %id, from = %expected, to = %next, "transfer transitioned");
        Ok(true)
    }
}

#[async_trait]
impl TransferRepo for InMemoryTransferStore {
    async fn insert(&self, transfer: Transfer) -> Result<(), StoreError> {
        use dashmap::mapref::entry::Entry;

        // Claim the display code first; it is the only field with a
        // uniqueness requirement.
        match self.by_display_code.entry(transfer.display_code.clone()) {
            Entry::Occupied(_) => return Err(StoreError::DuplicateDisplayCode),
            Entry::Vacant(slot) => {
                slot.insert(transfer.id);
            }
        }

        self.by_credential.insert(transfer.credential_id, transfer.id);
        self.transfers.insert(transfer.id, transfer);
        Ok(())
    }

    async fn remove(&self, id: TransferId) -> Result<(), StoreError> {
        let (_, transfer) = self
            .transfers
            .remove(&id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        self.by_credential.remove(&transfer.credential_id);
        self.by_display_code.remove(&transfer.display_code);
        Ok(())
    }

    async fn get(&self, id: TransferId) -> Result<Option<Transfer>, StoreError> {
        Ok(self.transfers.get(&id).map(|t| t.value().clone()))
    }

    async fn find_by_credential(
        &self,
        credential_id: Uuid,
    ) -> Result<Option<Transfer>, StoreError> {
        let Some(id) = self.by_credential.get(&credential_id).map(|id| *id) else {
            return Ok(None);
        };
        self.get(id).await
    }

    async fn find_by_display_code(&self, code: &str) -> Result<Option<Transfer>, StoreError> {
        let Some(id) = self.by_display_code.get(code).map(|id| *id) else {
            return Ok(None);
        };
        self.get(id).await
    }

    async fn activate(&self, id: TransferId, now: DateTime<Utc>) -> Result<bool, StoreError> {
        self.transition(id, TransferStatus::Pending, TransferStatus::Active, |t| {
            t.activated_at = Some(now);
        })
    }

    async fn mark_used(
        &self,
        id: TransferId,
        location: &str,
        redeemed_by: &UserId,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        self.transition(id, TransferStatus::Active, TransferStatus::Used, |t| {
            t.used_at = Some(now);
            t.used_at_location = Some(location.to_string());
            t.redeemed_by = Some(redeemed_by.clone());
        })
    }

    async fn mark_completed(
        &self,
        id: TransferId,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        self.transition(id, TransferStatus::Used, TransferStatus::Completed, |t| {
            t.completed_at = Some(now);
        })
    }

    async fn mark_cancelled(
        &self,
        id: TransferId,
        from: TransferStatus,
        by: &UserId,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        self.transition(id, from, TransferStatus::Cancelled, |t| {
            t.cancelled_at = Some(now);
            t.cancelled_by = Some(by.clone());
            t.cancellation_reason = Some(reason.to_string());
        })
    }

    async fn mark_expired(
        &self,
        id: TransferId,
        _now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        self.transition(id, TransferStatus::Active, TransferStatus::Expired, |_| {})
    }

    async fn record_rating(
        &self,
        id: TransferId,
        side: RatingSide,
        rating: u8,
        feedback: Option<String>,
    ) -> Result<(), StoreError> {
        let mut transfer = self
            .transfers
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        match side {
            RatingSide::Giver => {
                transfer.giver_rating = Some(rating);
                transfer.giver_feedback = feedback;
            }
            RatingSide::Requester => {
                transfer.requester_rating = Some(rating);
                transfer.requester_feedback = feedback;
            }
        }
        Ok(())
    }

    async fn record_issue(
        &self,
        id: TransferId,
        report: IssueReport,
    ) -> Result<(), StoreError> {
        let mut transfer = self
            .transfers
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        transfer.issue_reported = true;
        transfer.issues.push(report);
        Ok(())
    }

    async fn list_for_user(&self, user: &UserId) -> Result<Vec<Transfer>, StoreError> {
        let mut transfers: Vec<Transfer> = self
            .transfers
            .iter()
            .filter(|t| t.involves(user))
            .map(|t| t.value().clone())
            .collect();

        transfers.sort_by_key(|t| t.id.inner());
        Ok(transfers)
    }

    async fn list_all(&self) -> Result<Vec<Transfer>, StoreError> {
        let mut transfers: Vec<Transfer> = self.transfers.iter().map(|t| t.value().clone()).collect();
        transfers.sort_by_key(|t| t.id.inner());
        Ok(transfers)
    }
}
