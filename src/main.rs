//! SwipeShare engine demo
//!
//! Runs a scripted lifecycle against the in-memory stores:
//!
//! ```text
//! ┌────────┐    ┌──────────┐    ┌──────────┐    ┌────────────┐
//! │ Config │───▶│ Matching │───▶│ Transfer │───▶│ Redemption │
//! │ (YAML) │    │ (ranked) │    │ (engine) │    │  (receipt) │
//! └────────┘    └──────────┘    └──────────┘    └────────────┘
//! ```
//!
//! Requires a credential key (`SWIPESHARE_CREDENTIAL_KEY` or the config
//! file); the process refuses to start without one.

use std::sync::Arc;

use anyhow::Result;
use chrono::{Duration, Utc};

use swipeshare::config::AppConfig;
use swipeshare::credential::CredentialIssuer;
use swipeshare::ledger::SwipeLedger;
use swipeshare::matching::{MatchCandidate, MatchSelector, MatchSubject, UserProfile};
use swipeshare::models::{Offer, OfferDraft, Request, RequestDraft, Urgency};
use swipeshare::store::{
    InMemoryOfferStore, InMemoryRequestStore, InMemoryTransferStore, OfferRepo, RequestRepo,
};
use swipeshare::transfer::{TransferDetails, TransferEngine, TransferOrigin};

fn get_env() -> String {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if (args[i] == "--env" || args[i] == "-e") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }
    "dev".to_string()
}

#[tokio::main]
async fn main() -> Result<()> {
    let env = get_env();
    let config = AppConfig::load(&env)?;
    let _log_guard = swipeshare::logging::init_logging(&config);

    tracing::info!("Starting SwipeShare engine in {} mode", env);

    // Refuses to start without an externally supplied key.
    let key = config.credential_key()?;

    let ledger = Arc::new(SwipeLedger::new(config.swipes.default_allotment));
    let offers = Arc::new(InMemoryOfferStore::new());
    let requests = Arc::new(InMemoryRequestStore::new());
    let transfers = Arc::new(InMemoryTransferStore::new());

    let engine = TransferEngine::new(
        ledger.clone(),
        transfers,
        offers.clone(),
        requests.clone(),
        CredentialIssuer::new(&key),
        config.swipes.redemption_window_hours,
    );

    // A donor posts an offer, a recipient posts a request.
    let alice = "alice".to_string();
    let bob = "bob".to_string();

    let offer = Offer::new(
        alice.clone(),
        OfferDraft::new(2, Utc::now() + Duration::hours(12)),
    );
    let offer_id = offer.id;
    offers.insert(offer.clone()).await?;

    let mut request_draft = RequestDraft::new(1, Utc::now() + Duration::hours(6));
    request_draft.urgency = Urgency::High;
    requests
        .insert(Request::new(bob.clone(), request_draft))
        .await?;

    // Rank candidates for the offer; the heuristic scorer stands in for
    // the AI endpoint here.
    let selector = MatchSelector::heuristic_only();
    let profiles = vec![UserProfile {
        user_id: bob.clone(),
        has_meal_plan: false,
    }];
    let candidates: Vec<MatchCandidate> = requests
        .list_active(&Default::default(), Utc::now())
        .await?
        .iter()
        .map(|r| MatchCandidate::from_request(r, &profiles))
        .collect();

    let shortlist = selector
        .select(
            &MatchSubject::from_offer(&offer),
            &candidates,
            config.swipes.match_shortlist,
        )
        .await;
    let best = shortlist
        .first()
        .ok_or_else(|| anyhow::anyhow!("no match candidates"))?;
    tracing::info!(
        candidate = %best.candidate_id,
        score = best.score,
        "best match selected"
    );

    // Offer -> transfer -> redemption -> settlement.
    let transfer = engine
        .create_transfer(
            &alice,
            &bob,
            TransferDetails::new(TransferOrigin::Offer(offer_id), 1)
                .with_match_score(best.score),
        )
        .await?;
    tracing::info!(
        display_code = %transfer.display_code,
        giver_balance = engine.giver_balance(&alice),
        "credential issued"
    );

    let receipt = engine
        .redeem(&transfer.encrypted_payload, "Okenshields", &bob)
        .await?;
    tracing::info!(
        transfer_id = %receipt.transfer_id,
        location = %receipt.location,
        "swipe redeemed"
    );

    engine.complete_transfer(transfer.id).await?;

    let stats = engine.stats().await?;
    tracing::info!(
        total = stats.total,
        completed = stats.completed,
        swipes_delivered = stats.total_swipes_transferred,
        "demo finished"
    );

    Ok(())
}
