//! In-memory offer store

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::debug;

use crate::core_types::UserId;
use crate::models::{Offer, OfferFilter, OfferId, OfferStatus};

use super::{OfferRepo, StoreError};

/// DashMap-backed offer store. Entry locks serialize per-offer mutations.
#[derive(Default)]
pub struct InMemoryOfferStore {
    offers: DashMap<OfferId, Offer>,
}

impl InMemoryOfferStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OfferRepo for InMemoryOfferStore {
    async fn insert(&self, offer: Offer) -> Result<(), StoreError> {
        debug!(offer_id = %offer.id, giver = %offer.giver_id, "offer stored");
        self.offers.insert(offer.id, offer);
        Ok(())
    }

    async fn get(&self, id: OfferId) -> Result<Option<Offer>, StoreError> {
        Ok(self.offers.get(&id).map(|o| o.value().clone()))
    }

    async fn mark_transferred(
        &self,
        id: OfferId,
        recipient: &UserId,
    ) -> Result<bool, StoreError> {
        let mut offer = self
            .offers
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        if offer.status != OfferStatus::Active {
            return Ok(false);
        }

        offer.status = OfferStatus::Matched;
        offer.matched_with = Some(recipient.clone());
        Ok(true)
    }

    async fn reactivate(&self, id: OfferId) -> Result<bool, StoreError> {
        let mut offer = self
            .offers
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        if offer.status != OfferStatus::Matched {
            return Ok(false);
        }

        offer.status = OfferStatus::Active;
        offer.matched_with = None;
        Ok(true)
    }

    async fn cancel(&self, id: OfferId, user: &UserId) -> Result<Offer, StoreError> {
        let mut offer = self
            .offers
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        if &offer.giver_id != user {
            return Err(StoreError::NotOwner {
                user: user.clone(),
                id: id.to_string(),
            });
        }

        // A matched offer has a live transfer behind it; that transfer has
        // to be cancelled instead.
        if offer.status != OfferStatus::Active {
            return Err(StoreError::InvalidStatus(offer.status.to_string()));
        }

        offer.status = OfferStatus::Cancelled;
        Ok(offer.clone())
    }

    async fn list_active(
        &self,
        filter: &OfferFilter,
        now: DateTime<Utc>,
    ) -> Result<Vec<Offer>, StoreError> {
        let mut active: Vec<Offer> = self
            .offers
            .iter()
            .filter(|o| o.is_open(now))
            .filter(|o| {
                filter
                    .dining_hall
                    .as_deref()
                    .is_none_or(|hall| o.allows_hall(hall))
            })
            .filter(|o| {
                filter
                    .meal_time
                    .as_deref()
                    .is_none_or(|meal| o.allows_meal_time(meal))
            })
            .filter(|o| filter.min_quantity.is_none_or(|min| o.quantity >= min))
            .map(|o| o.value().clone())
            .collect();

        active.sort_by_key(|o| o.created_at);
        Ok(active)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OfferDraft;
    use chrono::Duration;

    async fn seed(store: &InMemoryOfferStore, giver: &str, quantity: u32) -> OfferId {
        let offer = Offer::new(
            giver.to_string(),
            OfferDraft::new(quantity, Utc::now() + Duration::hours(6)),
        );
        let id = offer.id;
        store.insert(offer).await.unwrap();
        id
    }

    #[tokio::test]
    async fn test_mark_transferred_is_cas() {
        let store = InMemoryOfferStore::new();
        let id = seed(&store, "alice", 2).await;
        let bob = "bob".to_string();

        assert!(store.mark_transferred(id, &bob).await.unwrap());
        // Second attempt loses: offer is no longer ACTIVE.
        assert!(!store.mark_transferred(id, &bob).await.unwrap());

        let offer = store.get(id).await.unwrap().unwrap();
        assert_eq!(offer.status, OfferStatus::Matched);
        assert_eq!(offer.matched_with, Some(bob));
    }

    #[tokio::test]
    async fn test_reactivate_clears_match() {
        let store = InMemoryOfferStore::new();
        let id = seed(&store, "alice", 2).await;
        let bob = "bob".to_string();

        store.mark_transferred(id, &bob).await.unwrap();
        assert!(store.reactivate(id).await.unwrap());

        let offer = store.get(id).await.unwrap().unwrap();
        assert_eq!(offer.status, OfferStatus::Active);
        assert!(offer.matched_with.is_none());

        // Reactivating an already-active offer is a no-op.
        assert!(!store.reactivate(id).await.unwrap());
    }

    #[tokio::test]
    async fn test_cancel_requires_owner_and_active() {
        let store = InMemoryOfferStore::new();
        let id = seed(&store, "alice", 2).await;

        let err = store.cancel(id, &"mallory".to_string()).await.unwrap_err();
        assert!(matches!(err, StoreError::NotOwner { .. }));

        store.mark_transferred(id, &"bob".to_string()).await.unwrap();
        let err = store.cancel(id, &"alice".to_string()).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidStatus(_)));
    }

    #[tokio::test]
    async fn test_list_active_filters() {
        let store = InMemoryOfferStore::new();
        let mut offer = Offer::new(
            "alice".to_string(),
            OfferDraft::new(3, Utc::now() + Duration::hours(6)),
        );
        offer.dining_halls = vec!["Okenshields".to_string()];
        store.insert(offer).await.unwrap();
        seed(&store, "carol", 1).await;

        let all = store
            .list_active(&OfferFilter::default(), Utc::now())
            .await
            .unwrap();
        assert_eq!(all.len(), 2);

        let filter = OfferFilter {
            dining_hall: Some("North Star Dining Room".to_string()),
            ..Default::default()
        };
        let north_star = store.list_active(&filter, Utc::now()).await.unwrap();
        // Only the unrestricted offer matches a hall outside its list.
        assert_eq!(north_star.len(), 1);
        assert_eq!(north_star[0].giver_id, "carol");

        let filter = OfferFilter {
            min_quantity: Some(2),
            ..Default::default()
        };
        let big = store.list_active(&filter, Utc::now()).await.unwrap();
        assert_eq!(big.len(), 1);
        assert_eq!(big[0].giver_id, "alice");
    }
}
