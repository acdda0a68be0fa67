//! In-memory request store

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::debug;

use crate::core_types::{SwipeCount, UserId};
use crate::models::{FulfillmentRecord, Request, RequestFilter, RequestId, RequestStatus};

use super::{RequestRepo, StoreError};

/// DashMap-backed request store. Entry locks serialize per-request
/// mutations, so partial fulfillments from concurrent transfers cannot
/// interleave mid-update.
#[derive(Default)]
pub struct InMemoryRequestStore {
    requests: DashMap<RequestId, Request>,
}

impl InMemoryRequestStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RequestRepo for InMemoryRequestStore {
    async fn insert(&self, request: Request) -> Result<(), StoreError> {
        debug!(request_id = %request.id, requester = %request.requester_id, "request stored");
        self.requests.insert(request.id, request);
        Ok(())
    }

    async fn get(&self, id: RequestId) -> Result<Option<Request>, StoreError> {
        Ok(self.requests.get(&id).map(|r| r.value().clone()))
    }

    async fn apply_fulfillment(
        &self,
        id: RequestId,
        giver: &UserId,
        quantity: SwipeCount,
        now: DateTime<Utc>,
    ) -> Result<Request, StoreError> {
        let mut request = self
            .requests
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        if request.status != RequestStatus::Active {
            return Err(StoreError::InvalidStatus(request.status.to_string()));
        }

        request.quantity = request.quantity.saturating_sub(quantity);
        request.fulfillment_history.push(FulfillmentRecord {
            giver_id: giver.clone(),
            quantity,
            timestamp: now,
        });

        if request.quantity == 0 {
            request.status = RequestStatus::Fulfilled;
            request.fulfilled_by = Some(giver.clone());
            request.fulfilled_at = Some(now);
        }

        Ok(request.clone())
    }

    async fn reactivate(
        &self,
        id: RequestId,
        restore: SwipeCount,
    ) -> Result<bool, StoreError> {
        let mut request = self
            .requests
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        // A user-cancelled request stays cancelled; everything else goes
        // back to ACTIVE with the transferred quantity restored. The
        // fulfillment history keeps the superseded entry.
        if request.status == RequestStatus::Cancelled {
            return Ok(false);
        }

        request.quantity = request.quantity.saturating_add(restore);
        request.status = RequestStatus::Active;
        request.fulfilled_by = None;
        request.fulfilled_at = None;
        Ok(true)
    }

    async fn cancel(&self, id: RequestId, user: &UserId) -> Result<Request, StoreError> {
        let mut request = self
            .requests
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        if &request.requester_id != user {
            return Err(StoreError::NotOwner {
                user: user.clone(),
                id: id.to_string(),
            });
        }

        if request.status != RequestStatus::Active {
            return Err(StoreError::InvalidStatus(request.status.to_string()));
        }

        request.status = RequestStatus::Cancelled;
        Ok(request.clone())
    }

    async fn list_active(
        &self,
        filter: &RequestFilter,
        now: DateTime<Utc>,
    ) -> Result<Vec<Request>, StoreError> {
        let mut active: Vec<Request> = self
            .requests
            .iter()
            .filter(|r| r.is_open(now))
            .filter(|r| {
                filter
                    .dining_hall
                    .as_deref()
                    .is_none_or(|hall| r.prefers_hall(hall))
            })
            .filter(|r| filter.urgency.is_none_or(|u| r.urgency == u))
            .filter(|r| filter.max_quantity.is_none_or(|max| r.quantity <= max))
            .map(|r| r.value().clone())
            .collect();

        active.sort_by_key(|r| r.created_at);
        Ok(active)
    }

    async fn expire_stale(&self, now: DateTime<Utc>) -> Result<usize, StoreError> {
        let mut expired = 0;

        for mut entry in self.requests.iter_mut() {
            if entry.status == RequestStatus::Active && entry.needed_by < now {
                entry.status = RequestStatus::Expired;
                expired += 1;
            }
        }

        if expired > 0 {
            debug!(expired, "stale requests expired");
        }
        Ok(expired)
    }
}
