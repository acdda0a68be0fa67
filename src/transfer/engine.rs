//! Transfer Engine
//!
//! Orchestrates the transfer lifecycle: validates the giver's balance,
//! issues the credential, persists the transfer, debits the ledger,
//! updates the originating offer/request, and drives the state machine
//! through redemption, completion, cancellation, rating, and dispute.
//!
//! # Consistency
//!
//! `create_transfer` treats balance debit + record insert + origin update
//! as one logical transaction: any later step failing unwinds the earlier
//! ones, so no transfer can exist with an un-debited balance. `redeem` is
//! exactly-once: the ACTIVE→USED CAS in the store is the single commit
//! point, and a lost race is re-classified against the status that won.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use crate::core_types::{SwipeCount, UserId};
use crate::credential::{self, CredentialContext, CredentialIssuer, IssuedCredential};
use crate::ledger::SwipeLedger;
use crate::store::{OfferRepo, RequestRepo, StoreError, TransferRepo};

use super::error::TransferError;
use super::state::TransferStatus;
use super::types::{
    IssueReport, RatingSide, RedemptionReceipt, SweepReport, Transfer, TransferDetails,
    TransferId, TransferOrigin, TransferStats, UserTransfers,
};

/// How many times to re-issue a credential when the generated display code
/// collides with a live one. With a 32^12 code space this fires never; the
/// bound exists so a broken RNG cannot loop forever.
const MAX_ISSUE_ATTEMPTS: usize = 3;

pub struct TransferEngine {
    ledger: Arc<SwipeLedger>,
    transfers: Arc<dyn TransferRepo>,
    offers: Arc<dyn OfferRepo>,
    requests: Arc<dyn RequestRepo>,
    issuer: CredentialIssuer,
    redemption_window: Duration,
}

impl TransferEngine {
    pub fn new(
        ledger: Arc<SwipeLedger>,
        transfers: Arc<dyn TransferRepo>,
        offers: Arc<dyn OfferRepo>,
        requests: Arc<dyn RequestRepo>,
        issuer: CredentialIssuer,
        redemption_window_hours: i64,
    ) -> Self {
        Self {
            ledger,
            transfers,
            offers,
            requests,
            issuer,
            redemption_window: Duration::hours(redemption_window_hours),
        }
    }

    // ============================================================
    // CREATE
    // ============================================================

    /// Create a transfer from `giver_id` to `requester_id`.
    ///
    /// On success the giver's balance has been reduced by exactly
    /// `details.quantity` and exactly one ACTIVE transfer exists holding a
    /// fresh, unused credential.
    pub async fn create_transfer(
        &self,
        giver_id: &UserId,
        requester_id: &UserId,
        details: TransferDetails,
    ) -> Result<Transfer, TransferError> {
        if details.quantity == 0 {
            return Err(TransferError::InvalidQuantity);
        }
        if giver_id == requester_id {
            return Err(TransferError::SelfTransfer);
        }

        // Fast-fail before any mutation. The debit below re-checks under
        // the entry lock, so a race here only changes the error timing.
        let available = self.ledger.balance(giver_id);
        if available < details.quantity {
            return Err(TransferError::InsufficientBalance {
                available,
                requested: details.quantity,
            });
        }

        // The origin must exist and be ACTIVE before the ledger is touched.
        match details.origin {
            TransferOrigin::Offer(offer_id) => {
                let offer = self
                    .offers
                    .get(offer_id)
                    .await?
                    .ok_or(TransferError::OfferNotActive(offer_id))?;
                if offer.status != crate::models::OfferStatus::Active {
                    return Err(TransferError::OfferNotActive(offer_id));
                }
            }
            TransferOrigin::Request(request_id) => {
                let request = self
                    .requests
                    .get(request_id)
                    .await?
                    .ok_or(TransferError::RequestNotActive(request_id))?;
                if request.status != crate::models::RequestStatus::Active {
                    return Err(TransferError::RequestNotActive(request_id));
                }
            }
        }

        let now = Utc::now();
        let valid_until = details.valid_until.unwrap_or(now + self.redemption_window);

        // Debit first; it is the step that must never end up dangling, and
        // it is reversible via credit on any later failure.
        self.ledger.debit(giver_id, details.quantity)?;

        let transfer = match self
            .persist_pending(giver_id, requester_id, &details, now, valid_until)
            .await
        {
            Ok(t) => t,
            Err(e) => {
                self.ledger.credit(giver_id, details.quantity);
                return Err(e);
            }
        };

        // Mark the origin. Losing this race (someone matched the offer or
        // fulfilled the request in between) unwinds the whole creation.
        let origin_ok = match details.origin {
            TransferOrigin::Offer(offer_id) => {
                self.offers.mark_transferred(offer_id, requester_id).await?
            }
            TransferOrigin::Request(request_id) => {
                match self
                    .requests
                    .apply_fulfillment(request_id, giver_id, details.quantity, now)
                    .await
                {
                    Ok(_) => true,
                    Err(StoreError::InvalidStatus(_)) => false,
                    Err(e) => return Err(e.into()),
                }
            }
        };

        if !origin_ok {
            let _ = self.transfers.remove(transfer.id).await;
            self.ledger.credit(giver_id, details.quantity);
            return Err(match details.origin {
                TransferOrigin::Offer(id) => TransferError::OfferNotActive(id),
                TransferOrigin::Request(id) => TransferError::RequestNotActive(id),
            });
        }

        // PENDING is transient: activate synchronously so the recipient
        // can redeem immediately. A concurrent cancel may legally win.
        if !self.transfers.activate(transfer.id, Utc::now()).await? {
            debug!(transfer_id = %transfer.id, "transfer left PENDING before activation");
        }

        let transfer = self.require(transfer.id).await?;
        info!(
            transfer_id = %transfer.id,
            giver = %giver_id,
            requester = %requester_id,
            quantity = details.quantity,
            initiated_by = %transfer.initiated_by(),
            "transfer created: {}",
            transfer
        );
        Ok(transfer)
    }

    /// Issue a credential and insert the PENDING record, re-issuing on a
    /// display-code collision.
    async fn persist_pending(
        &self,
        giver_id: &UserId,
        requester_id: &UserId,
        details: &TransferDetails,
        now: DateTime<Utc>,
        valid_until: DateTime<Utc>,
    ) -> Result<Transfer, TransferError> {
        for _ in 0..MAX_ISSUE_ATTEMPTS {
            let issued = self.issue_credential(giver_id, requester_id, details, now)?;
            let transfer = Self::build_transfer(
                giver_id, requester_id, details, issued, now, valid_until,
            );

            match self.transfers.insert(transfer.clone()).await {
                Ok(()) => return Ok(transfer),
                Err(StoreError::DuplicateDisplayCode) => {
                    warn!(transfer_id = %transfer.id, "display code collision, re-issuing");
                    continue;
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(TransferError::Generation(
            "could not allocate a unique display code".to_string(),
        ))
    }

    fn issue_credential(
        &self,
        giver_id: &UserId,
        requester_id: &UserId,
        details: &TransferDetails,
        now: DateTime<Utc>,
    ) -> Result<IssuedCredential, TransferError> {
        self.issuer
            .issue(&CredentialContext {
                giver_id: giver_id.clone(),
                requester_id: requester_id.clone(),
                quantity: details.quantity,
                location: details.location.as_str().to_string(),
                issued_at_ms: now.timestamp_millis(),
            })
            .map_err(|e| {
                // Crypto primitive failure is fatal and unretryable.
                tracing::error!(error = %e, giver = %giver_id, "credential generation failed");
                e.into()
            })
    }

    fn build_transfer(
        giver_id: &UserId,
        requester_id: &UserId,
        details: &TransferDetails,
        issued: IssuedCredential,
        now: DateTime<Utc>,
        valid_until: DateTime<Utc>,
    ) -> Transfer {
        Transfer {
            id: TransferId::new(),
            giver_id: giver_id.clone(),
            requester_id: requester_id.clone(),
            origin: details.origin,
            quantity: details.quantity,
            location: details.location.clone(),
            credential_id: issued.credential_id,
            encrypted_payload: issued.encrypted,
            display_code: issued.display_code,
            security_hash: issued.security_hash,
            status: TransferStatus::Pending,
            match_score: details.match_score,
            created_at: now,
            valid_from: now,
            valid_until,
            activated_at: None,
            used_at: None,
            completed_at: None,
            cancelled_at: None,
            cancelled_by: None,
            cancellation_reason: None,
            used_at_location: None,
            redeemed_by: None,
            giver_notified: false,
            requester_notified: false,
            giver_rating: None,
            giver_feedback: None,
            requester_rating: None,
            requester_feedback: None,
            issue_reported: false,
            issues: Vec::new(),
        }
    }

    // ============================================================
    // REDEEM
    // ============================================================

    /// Redeem a scanned (encrypted) credential at `location`.
    pub async fn redeem(
        &self,
        encrypted: &str,
        location: &str,
        acting_user: &UserId,
    ) -> Result<RedemptionReceipt, TransferError> {
        let payload = self
            .issuer
            .validate(encrypted)
            .ok_or(TransferError::InvalidCredential)?;

        let transfer = self
            .transfers
            .find_by_credential(payload.id)
            .await?
            .ok_or_else(|| TransferError::TransferNotFound(payload.id.to_string()))?;

        self.redeem_transfer(transfer, location, acting_user).await
    }

    /// Redeem via the human-readable backup code. Resolves to the same
    /// transfer as the scanned path.
    pub async fn redeem_by_display_code(
        &self,
        code: &str,
        location: &str,
        acting_user: &UserId,
    ) -> Result<RedemptionReceipt, TransferError> {
        if !credential::is_valid_display_code(code) {
            return Err(TransferError::InvalidCredential);
        }

        let transfer = self
            .transfers
            .find_by_display_code(code)
            .await?
            .ok_or_else(|| TransferError::TransferNotFound(code.to_string()))?;

        self.redeem_transfer(transfer, location, acting_user).await
    }

    async fn redeem_transfer(
        &self,
        transfer: Transfer,
        location: &str,
        acting_user: &UserId,
    ) -> Result<RedemptionReceipt, TransferError> {
        // Only the matched recipient may redeem. Logged because repeated
        // hits can indicate credential sharing.
        if &transfer.requester_id != acting_user {
            warn!(
                transfer_id = %transfer.id,
                acting_user = %acting_user,
                "redemption attempt by non-recipient"
            );
            return Err(TransferError::UnauthorizedRedemption);
        }

        if transfer.status != TransferStatus::Active {
            return Err(Self::classify_unredeemable(&transfer));
        }

        let now = Utc::now();

        // Lazy expiry: checked here rather than on a timer; this is the
        // authoritative enforcement point.
        if transfer.is_expired_at(now) {
            let _ = self.transfers.mark_expired(transfer.id, now).await?;
            info!(transfer_id = %transfer.id, "credential expired at redemption");
            return Err(TransferError::ExpiredCredential(transfer.valid_until));
        }

        // Location gate leaves the state untouched so a retry at the right
        // hall still succeeds.
        if !transfer.location.allows(location) {
            return Err(TransferError::LocationMismatch {
                expected: transfer.location.to_string(),
                presented: location.to_string(),
            });
        }

        if self
            .transfers
            .mark_used(transfer.id, location, acting_user, now)
            .await?
        {
            info!(
                transfer_id = %transfer.id,
                location,
                quantity = transfer.quantity,
                "swipe redeemed"
            );
            Ok(RedemptionReceipt {
                transfer_id: transfer.id,
                quantity: transfer.quantity,
                giver_id: transfer.giver_id.clone(),
                location: location.to_string(),
                redeemed_at: now,
            })
        } else {
            // Lost the CAS: a concurrent redeem, cancel, or expiry won.
            // Re-read and classify against what actually happened.
            let current = self.require(transfer.id).await?;
            Err(Self::classify_unredeemable(&current))
        }
    }

    fn classify_unredeemable(transfer: &Transfer) -> TransferError {
        match transfer.status {
            TransferStatus::Used | TransferStatus::Completed => TransferError::AlreadyRedeemed,
            TransferStatus::Expired => TransferError::ExpiredCredential(transfer.valid_until),
            other => TransferError::NotRedeemable(other),
        }
    }

    // ============================================================
    // COMPLETE / CANCEL
    // ============================================================

    /// Settle a redeemed transfer. USED → COMPLETED only.
    pub async fn complete_transfer(&self, id: TransferId) -> Result<Transfer, TransferError> {
        if self.transfers.mark_completed(id, Utc::now()).await? {
            let transfer = self.require(id).await?;
            info!(transfer_id = %id, "transfer completed");
            return Ok(transfer);
        }

        let current = self.require(id).await?;
        Err(TransferError::InvalidState(format!(
            "{} -> COMPLETED",
            current.status
        )))
    }

    /// Cancel a not-yet-redeemed transfer. Refunds the giver and returns
    /// the originating offer/request to ACTIVE.
    pub async fn cancel_transfer(
        &self,
        id: TransferId,
        user: &UserId,
        reason: &str,
    ) -> Result<Transfer, TransferError> {
        let transfer = self.require(id).await?;

        if !transfer.involves(user) {
            return Err(TransferError::Unauthorized);
        }

        let now = Utc::now();
        let cancelled = self
            .transfers
            .mark_cancelled(id, TransferStatus::Active, user, reason, now)
            .await?
            || self
                .transfers
                .mark_cancelled(id, TransferStatus::Pending, user, reason, now)
                .await?;

        if !cancelled {
            let current = self.require(id).await?;
            return Err(match current.status {
                TransferStatus::Used | TransferStatus::Completed => TransferError::AlreadyUsed,
                other => TransferError::InvalidState(format!("cannot cancel in {}", other)),
            });
        }

        // Winning the CAS above guards the refund: it runs exactly once.
        self.ledger.credit(&transfer.giver_id, transfer.quantity);

        match transfer.origin {
            TransferOrigin::Offer(offer_id) => {
                if !self.offers.reactivate(offer_id).await? {
                    warn!(offer_id = %offer_id, "originating offer could not be reactivated");
                }
            }
            TransferOrigin::Request(request_id) => {
                if !self
                    .requests
                    .reactivate(request_id, transfer.quantity)
                    .await?
                {
                    warn!(request_id = %request_id, "originating request could not be reactivated");
                }
            }
        }

        info!(
            transfer_id = %id,
            cancelled_by = %user,
            reason,
            "transfer cancelled, {} swipe(s) refunded",
            transfer.quantity
        );
        self.require(id).await
    }

    // ============================================================
    // RATING / ISSUES
    // ============================================================

    /// Rate the counter-party after redemption. USED or COMPLETED only.
    pub async fn submit_rating(
        &self,
        id: TransferId,
        user: &UserId,
        rating: u8,
        feedback: Option<String>,
    ) -> Result<Transfer, TransferError> {
        if !(1..=5).contains(&rating) {
            return Err(TransferError::InvalidRating);
        }

        let transfer = self.require(id).await?;

        if !matches!(
            transfer.status,
            TransferStatus::Used | TransferStatus::Completed
        ) {
            return Err(TransferError::InvalidState(format!(
                "cannot rate a transfer in {}",
                transfer.status
            )));
        }

        let side = if transfer.giver_id == *user {
            RatingSide::Giver
        } else if transfer.requester_id == *user {
            RatingSide::Requester
        } else {
            return Err(TransferError::Unauthorized);
        };

        self.transfers.record_rating(id, side, rating, feedback).await?;
        self.require(id).await
    }

    /// Flag a problem with a transfer. Allowed from either party at any
    /// time post-creation; never changes the transfer status (ops consumes
    /// the report out of band).
    pub async fn report_issue(
        &self,
        id: TransferId,
        user: &UserId,
        details: &str,
    ) -> Result<Transfer, TransferError> {
        let transfer = self.require(id).await?;

        if !transfer.involves(user) {
            return Err(TransferError::Unauthorized);
        }

        self.transfers
            .record_issue(
                id,
                IssueReport {
                    reported_by: user.clone(),
                    details: details.to_string(),
                    reported_at: Utc::now(),
                },
            )
            .await?;

        warn!(transfer_id = %id, reported_by = %user, "issue reported");
        self.require(id).await
    }

    // ============================================================
    // QUERIES / SWEEP
    // ============================================================

    pub async fn get_transfer(&self, id: TransferId) -> Result<Option<Transfer>, TransferError> {
        Ok(self.transfers.get(id).await?)
    }

    /// A user's transfers, bucketed for the profile screen.
    pub async fn transfers_for_user(
        &self,
        user: &UserId,
    ) -> Result<UserTransfers, TransferError> {
        let now = Utc::now();
        let mut buckets = UserTransfers::default();

        for transfer in self.transfers.list_for_user(user).await? {
            if &transfer.giver_id == user {
                buckets.given.push(transfer.clone());
            }
            if &transfer.requester_id == user {
                buckets.received.push(transfer.clone());
                if transfer.status == TransferStatus::Active && transfer.valid_until > now {
                    buckets.active_received.push(transfer.clone());
                }
            }
            match transfer.status {
                TransferStatus::Pending => buckets.pending.push(transfer),
                TransferStatus::Used | TransferStatus::Completed => {
                    buckets.completed.push(transfer)
                }
                _ => {}
            }
        }

        Ok(buckets)
    }

    pub async fn stats(&self) -> Result<TransferStats, TransferError> {
        let mut stats = TransferStats::default();

        for transfer in self.transfers.list_all().await? {
            stats.total += 1;
            match transfer.status {
                TransferStatus::Active => stats.active += 1,
                TransferStatus::Used => stats.used += 1,
                TransferStatus::Completed => stats.completed += 1,
                TransferStatus::Cancelled => stats.cancelled += 1,
                TransferStatus::Expired => stats.expired += 1,
                TransferStatus::Pending => {}
            }
            if matches!(
                transfer.status,
                TransferStatus::Used | TransferStatus::Completed
            ) {
                stats.total_swipes_transferred += u64::from(transfer.quantity);
            }
        }

        Ok(stats)
    }

    /// Periodic sweep: flip stale ACTIVE transfers and requests to
    /// EXPIRED. Idempotent and safe to run at any interval (or never);
    /// redemption-time checking remains the authoritative gate.
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<SweepReport, TransferError> {
        let mut report = SweepReport::default();

        for transfer in self.transfers.list_all().await? {
            if transfer.status == TransferStatus::Active
                && transfer.is_expired_at(now)
                && self.transfers.mark_expired(transfer.id, now).await?
            {
                report.transfers_expired += 1;
            }
        }

        report.requests_expired = self.requests.expire_stale(now).await?;

        if report.transfers_expired > 0 || report.requests_expired > 0 {
            info!(
                transfers = report.transfers_expired,
                requests = report.requests_expired,
                "expiry sweep"
            );
        }
        Ok(report)
    }

    pub fn giver_balance(&self, user: &UserId) -> SwipeCount {
        self.ledger.balance(user)
    }

    async fn require(&self, id: TransferId) -> Result<Transfer, TransferError> {
        self.transfers
            .get(id)
            .await?
            .ok_or_else(|| TransferError::TransferNotFound(id.to_string()))
    }
}
