//! End-to-end transfer lifecycle scenarios.

use std::sync::Arc;

use chrono::{Duration, Utc};

use swipeshare::core_types::LocationRule;
use swipeshare::credential::CredentialIssuer;
use swipeshare::ledger::SwipeLedger;
use swipeshare::models::{Offer, OfferDraft, OfferStatus, Request, RequestDraft, RequestStatus};
use swipeshare::store::{
    InMemoryOfferStore, InMemoryRequestStore, InMemoryTransferStore, OfferRepo, RequestRepo,
    TransferRepo,
};
use swipeshare::transfer::{
    TransferDetails, TransferEngine, TransferError, TransferOrigin, TransferStatus,
};
use swipeshare::models::{OfferId, RequestId};

const TEST_KEY: [u8; 32] = [42u8; 32];

struct Harness {
    engine: TransferEngine,
    ledger: Arc<SwipeLedger>,
    offers: Arc<InMemoryOfferStore>,
    requests: Arc<InMemoryRequestStore>,
    transfers: Arc<InMemoryTransferStore>,
}

fn harness_with_allotment(allotment: u32) -> Harness {
    let ledger = Arc::new(SwipeLedger::new(allotment));
    let offers = Arc::new(InMemoryOfferStore::new());
    let requests = Arc::new(InMemoryRequestStore::new());
    let transfers = Arc::new(InMemoryTransferStore::new());

    let engine = TransferEngine::new(
        ledger.clone(),
        transfers.clone(),
        offers.clone(),
        requests.clone(),
        CredentialIssuer::new(&TEST_KEY),
        24,
    );

    Harness {
        engine,
        ledger,
        offers,
        requests,
        transfers,
    }
}

fn harness() -> Harness {
    harness_with_allotment(5)
}

async fn post_offer(h: &Harness, giver: &str, quantity: u32) -> OfferId {
    let offer = Offer::new(
        giver.to_string(),
        OfferDraft::new(quantity, Utc::now() + Duration::hours(8)),
    );
    let id = offer.id;
    h.offers.insert(offer).await.unwrap();
    id
}

async fn post_request(h: &Harness, requester: &str, quantity: u32) -> RequestId {
    let request = Request::new(
        requester.to_string(),
        RequestDraft::new(quantity, Utc::now() + Duration::hours(8)),
    );
    let id = request.id;
    h.requests.insert(request).await.unwrap();
    id
}

#[tokio::test]
async fn happy_path_create_redeem_complete() {
    let h = harness();
    let alice = "alice".to_string();
    let bob = "bob".to_string();
    let offer_id = post_offer(&h, "alice", 2).await;

    // Giver balance 5, transfer of 2 -> balance 3, transfer ACTIVE.
    let transfer = h
        .engine
        .create_transfer(
            &alice,
            &bob,
            TransferDetails::new(TransferOrigin::Offer(offer_id), 2),
        )
        .await
        .unwrap();

    assert_eq!(transfer.status, TransferStatus::Active);
    assert!(transfer.activated_at.is_some());
    assert_eq!(h.ledger.balance(&alice), 3);

    let offer = h.offers.get(offer_id).await.unwrap().unwrap();
    assert_eq!(offer.status, OfferStatus::Matched);
    assert_eq!(offer.matched_with, Some(bob.clone()));

    // Redemption by the recipient at an unrestricted location.
    let receipt = h
        .engine
        .redeem(&transfer.encrypted_payload, "North Star Dining Room", &bob)
        .await
        .unwrap();
    assert_eq!(receipt.quantity, 2);
    assert_eq!(receipt.giver_id, alice);

    let used = h.engine.get_transfer(transfer.id).await.unwrap().unwrap();
    assert_eq!(used.status, TransferStatus::Used);
    assert_eq!(used.redeemed_by, Some(bob.clone()));
    assert_eq!(
        used.used_at_location,
        Some("North Star Dining Room".to_string())
    );

    // Settlement.
    let completed = h.engine.complete_transfer(transfer.id).await.unwrap();
    assert_eq!(completed.status, TransferStatus::Completed);

    let stats = h.engine.stats().await.unwrap();
    assert_eq!(stats.completed, 1);
    assert_eq!(stats.total_swipes_transferred, 2);
}

#[tokio::test]
async fn overdraft_fails_without_mutation() {
    let h = harness_with_allotment(1);
    let alice = "alice".to_string();
    let offer_id = post_offer(&h, "alice", 2).await;

    let err = h
        .engine
        .create_transfer(
            &alice,
            &"bob".to_string(),
            TransferDetails::new(TransferOrigin::Offer(offer_id), 2),
        )
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        TransferError::InsufficientBalance {
            available: 1,
            requested: 2
        }
    ));
    assert_eq!(h.ledger.balance(&alice), 1);
    assert!(h.transfers.list_all().await.unwrap().is_empty());

    // The offer was never touched either.
    let offer = h.offers.get(offer_id).await.unwrap().unwrap();
    assert_eq!(offer.status, OfferStatus::Active);
}

#[tokio::test]
async fn double_redemption_is_idempotent_failure() {
    let h = harness();
    let bob = "bob".to_string();
    let offer_id = post_offer(&h, "alice", 1).await;

    let transfer = h
        .engine
        .create_transfer(
            &"alice".to_string(),
            &bob,
            TransferDetails::new(TransferOrigin::Offer(offer_id), 1),
        )
        .await
        .unwrap();

    h.engine
        .redeem(&transfer.encrypted_payload, "Okenshields", &bob)
        .await
        .unwrap();

    let err = h
        .engine
        .redeem(&transfer.encrypted_payload, "Okenshields", &bob)
        .await
        .unwrap_err();
    assert!(matches!(err, TransferError::AlreadyRedeemed));

    // Still exactly one USED transfer; no double payout.
    let stats = h.engine.stats().await.unwrap();
    assert_eq!(stats.used, 1);
    assert_eq!(stats.total_swipes_transferred, 1);
}

#[tokio::test]
async fn cancellation_refunds_and_reactivates_offer() {
    let h = harness();
    let alice = "alice".to_string();
    let offer_id = post_offer(&h, "alice", 3).await;

    let transfer = h
        .engine
        .create_transfer(
            &alice,
            &"bob".to_string(),
            TransferDetails::new(TransferOrigin::Offer(offer_id), 3),
        )
        .await
        .unwrap();
    assert_eq!(h.ledger.balance(&alice), 2);

    let cancelled = h
        .engine
        .cancel_transfer(transfer.id, &alice, "changed mind")
        .await
        .unwrap();

    assert_eq!(cancelled.status, TransferStatus::Cancelled);
    assert_eq!(cancelled.cancelled_by, Some(alice.clone()));
    assert_eq!(
        cancelled.cancellation_reason,
        Some("changed mind".to_string())
    );
    assert_eq!(h.ledger.balance(&alice), 5, "full refund");

    let offer = h.offers.get(offer_id).await.unwrap().unwrap();
    assert_eq!(offer.status, OfferStatus::Active);
    assert!(offer.matched_with.is_none());
}

#[tokio::test]
async fn cancellation_restores_request_quantity() {
    let h = harness();
    let bob = "bob".to_string();
    let request_id = post_request(&h, "bob", 2).await;

    let transfer = h
        .engine
        .create_transfer(
            &"alice".to_string(),
            &bob,
            TransferDetails::new(TransferOrigin::Request(request_id), 2),
        )
        .await
        .unwrap();

    let fulfilled = h.requests.get(request_id).await.unwrap().unwrap();
    assert_eq!(fulfilled.status, RequestStatus::Fulfilled);
    assert_eq!(fulfilled.quantity, 0);

    h.engine
        .cancel_transfer(transfer.id, &bob, "found a friend instead")
        .await
        .unwrap();

    let restored = h.requests.get(request_id).await.unwrap().unwrap();
    assert_eq!(restored.status, RequestStatus::Active);
    assert_eq!(restored.quantity, 2);
}

#[tokio::test]
async fn cancel_after_use_fails_and_stands() {
    let h = harness();
    let alice = "alice".to_string();
    let bob = "bob".to_string();
    let offer_id = post_offer(&h, "alice", 1).await;

    let transfer = h
        .engine
        .create_transfer(
            &alice,
            &bob,
            TransferDetails::new(TransferOrigin::Offer(offer_id), 1),
        )
        .await
        .unwrap();

    h.engine
        .redeem(&transfer.encrypted_payload, "Okenshields", &bob)
        .await
        .unwrap();

    let err = h
        .engine
        .cancel_transfer(transfer.id, &alice, "too late")
        .await
        .unwrap_err();
    assert!(matches!(err, TransferError::AlreadyUsed));

    // No refund happened; the transfer stands.
    assert_eq!(h.ledger.balance(&alice), 4);
    let t = h.engine.get_transfer(transfer.id).await.unwrap().unwrap();
    assert_eq!(t.status, TransferStatus::Used);
}

#[tokio::test]
async fn outsider_cannot_cancel() {
    let h = harness();
    let offer_id = post_offer(&h, "alice", 1).await;

    let transfer = h
        .engine
        .create_transfer(
            &"alice".to_string(),
            &"bob".to_string(),
            TransferDetails::new(TransferOrigin::Offer(offer_id), 1),
        )
        .await
        .unwrap();

    let err = h
        .engine
        .cancel_transfer(transfer.id, &"mallory".to_string(), "mine now")
        .await
        .unwrap_err();
    assert!(matches!(err, TransferError::Unauthorized));
}

#[tokio::test]
async fn location_mismatch_leaves_transfer_redeemable() {
    let h = harness();
    let bob = "bob".to_string();
    let offer_id = post_offer(&h, "alice", 1).await;

    let transfer = h
        .engine
        .create_transfer(
            &"alice".to_string(),
            &bob,
            TransferDetails::new(TransferOrigin::Offer(offer_id), 1)
                .at_location(LocationRule::Only("North Star Dining Room".to_string())),
        )
        .await
        .unwrap();

    let err = h
        .engine
        .redeem(&transfer.encrypted_payload, "Okenshields", &bob)
        .await
        .unwrap_err();
    assert!(matches!(err, TransferError::LocationMismatch { .. }));

    let t = h.engine.get_transfer(transfer.id).await.unwrap().unwrap();
    assert_eq!(t.status, TransferStatus::Active, "state untouched");

    // Retry at the correct location succeeds.
    h.engine
        .redeem(&transfer.encrypted_payload, "North Star Dining Room", &bob)
        .await
        .unwrap();
}

#[tokio::test]
async fn expired_credential_transitions_and_stays_dead() {
    let h = harness();
    let bob = "bob".to_string();
    let offer_id = post_offer(&h, "alice", 1).await;

    let transfer = h
        .engine
        .create_transfer(
            &"alice".to_string(),
            &bob,
            TransferDetails::new(TransferOrigin::Offer(offer_id), 1)
                .valid_until(Utc::now() - Duration::minutes(1)),
        )
        .await
        .unwrap();

    let err = h
        .engine
        .redeem(&transfer.encrypted_payload, "Okenshields", &bob)
        .await
        .unwrap_err();
    assert!(matches!(err, TransferError::ExpiredCredential(_)));

    let t = h.engine.get_transfer(transfer.id).await.unwrap().unwrap();
    assert_eq!(t.status, TransferStatus::Expired);

    // Subsequent attempts keep failing with the expiry taxonomy.
    let err = h
        .engine
        .redeem(&transfer.encrypted_payload, "Okenshields", &bob)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        TransferError::ExpiredCredential(_) | TransferError::NotRedeemable(_)
    ));
}

#[tokio::test]
async fn wrong_user_cannot_redeem() {
    let h = harness();
    let offer_id = post_offer(&h, "alice", 1).await;

    let transfer = h
        .engine
        .create_transfer(
            &"alice".to_string(),
            &"bob".to_string(),
            TransferDetails::new(TransferOrigin::Offer(offer_id), 1),
        )
        .await
        .unwrap();

    let err = h
        .engine
        .redeem(
            &transfer.encrypted_payload,
            "Okenshields",
            &"mallory".to_string(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, TransferError::UnauthorizedRedemption));

    // Even the giver cannot redeem their own credential.
    let err = h
        .engine
        .redeem(
            &transfer.encrypted_payload,
            "Okenshields",
            &"alice".to_string(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, TransferError::UnauthorizedRedemption));
}

#[tokio::test]
async fn garbage_credential_is_invalid() {
    let h = harness();
    let err = h
        .engine
        .redeem("definitely-not-a-credential", "Okenshields", &"bob".to_string())
        .await
        .unwrap_err();
    assert!(matches!(err, TransferError::InvalidCredential));
}

#[tokio::test]
async fn balance_conservation_across_create_and_cancel() {
    let h = harness_with_allotment(10);
    let alice = "alice".to_string();

    let mut live = Vec::new();
    for i in 0..3 {
        let offer_id = post_offer(&h, "alice", 1).await;
        let t = h
            .engine
            .create_transfer(
                &alice,
                &format!("recipient-{}", i),
                TransferDetails::new(TransferOrigin::Offer(offer_id), 1),
            )
            .await
            .unwrap();
        live.push(t);
        // initial - sum(active quantities) == current, at every step.
        assert_eq!(h.ledger.balance(&alice), 10 - (i as u32 + 1));
    }

    h.engine
        .cancel_transfer(live[0].id, &alice, "cancelled one")
        .await
        .unwrap();
    assert_eq!(h.ledger.balance(&alice), 8);

    h.engine
        .cancel_transfer(live[1].id, &alice, "cancelled two")
        .await
        .unwrap();
    assert_eq!(h.ledger.balance(&alice), 9);
}

#[tokio::test]
async fn sweep_expires_stale_transfers_and_requests() {
    let h = harness();
    let bob = "bob".to_string();
    let offer_id = post_offer(&h, "alice", 1).await;

    let transfer = h
        .engine
        .create_transfer(
            &"alice".to_string(),
            &bob,
            TransferDetails::new(TransferOrigin::Offer(offer_id), 1)
                .valid_until(Utc::now() - Duration::minutes(1)),
        )
        .await
        .unwrap();

    let stale_request = Request::new(
        "carol".to_string(),
        RequestDraft::new(1, Utc::now() - Duration::minutes(1)),
    );
    h.requests.insert(stale_request).await.unwrap();

    let report = h.engine.sweep_expired(Utc::now()).await.unwrap();
    assert_eq!(report.transfers_expired, 1);
    assert_eq!(report.requests_expired, 1);

    let t = h.engine.get_transfer(transfer.id).await.unwrap().unwrap();
    assert_eq!(t.status, TransferStatus::Expired);

    // Idempotent: a second pass finds nothing.
    let report = h.engine.sweep_expired(Utc::now()).await.unwrap();
    assert_eq!(report.transfers_expired, 0);
    assert_eq!(report.requests_expired, 0);
}

#[tokio::test]
async fn user_transfer_buckets() {
    let h = harness_with_allotment(10);
    let alice = "alice".to_string();
    let bob = "bob".to_string();

    let offer_a = post_offer(&h, "alice", 1).await;
    let active = h
        .engine
        .create_transfer(
            &alice,
            &bob,
            TransferDetails::new(TransferOrigin::Offer(offer_a), 1),
        )
        .await
        .unwrap();

    let offer_b = post_offer(&h, "alice", 1).await;
    let redeemed = h
        .engine
        .create_transfer(
            &alice,
            &bob,
            TransferDetails::new(TransferOrigin::Offer(offer_b), 1),
        )
        .await
        .unwrap();
    h.engine
        .redeem(&redeemed.encrypted_payload, "Okenshields", &bob)
        .await
        .unwrap();

    let alice_view = h.engine.transfers_for_user(&alice).await.unwrap();
    assert_eq!(alice_view.given.len(), 2);
    assert!(alice_view.received.is_empty());
    assert_eq!(alice_view.completed.len(), 1);

    let bob_view = h.engine.transfers_for_user(&bob).await.unwrap();
    assert_eq!(bob_view.received.len(), 2);
    assert_eq!(bob_view.active_received.len(), 1);
    assert_eq!(bob_view.active_received[0].id, active.id);
}
