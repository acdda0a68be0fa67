//! Transfer entity and supporting types
//!
//! The Transfer is the atomic unit of value movement: it exclusively owns
//! its credential fields once created and weakly references the offer or
//! request it originated from (id only).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::core_types::{LocationRule, SwipeCount, UserId};
use crate::models::{OfferId, RequestId};

use super::state::TransferStatus;

/// Transfer ID - ULID-based unique identifier.
///
/// ULIDs are monotonic and sortable with no coordination needed, which
/// keeps transfer listings in creation order for free.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransferId(ulid::Ulid);

impl TransferId {
    pub fn new() -> Self {
        Self(ulid::Ulid::new())
    }

    pub fn inner(&self) -> ulid::Ulid {
        self.0
    }
}

impl Default for TransferId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TransferId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(ulid::Ulid::from_string(s)?))
    }
}

/// Which side of the marketplace initiated the transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InitiatedBy {
    Offer,
    Request,
}

impl InitiatedBy {
    pub fn as_str(&self) -> &'static str {
        match self {
            InitiatedBy::Offer => "OFFER",
            InitiatedBy::Request => "REQUEST",
        }
    }
}

impl fmt::Display for InitiatedBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The originating offer or request - exactly one, by construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferOrigin {
    Offer(OfferId),
    Request(RequestId),
}

impl TransferOrigin {
    pub fn initiated_by(&self) -> InitiatedBy {
        match self {
            TransferOrigin::Offer(_) => InitiatedBy::Offer,
            TransferOrigin::Request(_) => InitiatedBy::Request,
        }
    }
}

/// Parameters for `create_transfer`.
#[derive(Debug, Clone)]
pub struct TransferDetails {
    pub origin: TransferOrigin,
    pub quantity: SwipeCount,
    pub location: LocationRule,
    /// Custom redemption deadline; defaults to now + the configured window
    /// (24 hours) when absent.
    pub valid_until: Option<DateTime<Utc>>,
    /// Score carried over from the match selector, if one was used.
    pub match_score: Option<f32>,
}

impl TransferDetails {
    pub fn new(origin: TransferOrigin, quantity: SwipeCount) -> Self {
        Self {
            origin,
            quantity,
            location: LocationRule::Any,
            valid_until: None,
            match_score: None,
        }
    }

    pub fn at_location(mut self, location: LocationRule) -> Self {
        self.location = location;
        self
    }

    pub fn valid_until(mut self, deadline: DateTime<Utc>) -> Self {
        self.valid_until = Some(deadline);
        self
    }

    pub fn with_match_score(mut self, score: f32) -> Self {
        self.match_score = Some(score);
        self
    }
}

/// Which party a rating was written by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RatingSide {
    Giver,
    Requester,
}

/// An immutable issue record attached by either party.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueReport {
    pub reported_by: UserId,
    pub details: String,
    pub reported_at: DateTime<Utc>,
}

/// The atomic, credentialed movement of swipes from donor to recipient.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transfer {
    pub id: TransferId,
    pub giver_id: UserId,
    pub requester_id: UserId,
    pub origin: TransferOrigin,
    pub quantity: SwipeCount,
    pub location: LocationRule,

    // Credential fields - owned exclusively by this transfer once created.
    pub credential_id: Uuid,
    pub encrypted_payload: String,
    pub display_code: String,
    pub security_hash: String,

    pub status: TransferStatus,
    pub match_score: Option<f32>,

    pub created_at: DateTime<Utc>,
    pub valid_from: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    pub activated_at: Option<DateTime<Utc>>,
    pub used_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,

    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancelled_by: Option<UserId>,
    pub cancellation_reason: Option<String>,

    // Set only at redemption; redeemed_by always equals requester_id.
    pub used_at_location: Option<String>,
    pub redeemed_by: Option<UserId>,

    // Hooks consumed and updated by an external notifier.
    pub giver_notified: bool,
    pub requester_notified: bool,

    // Post-redemption feedback.
    pub giver_rating: Option<u8>,
    pub giver_feedback: Option<String>,
    pub requester_rating: Option<u8>,
    pub requester_feedback: Option<String>,
    pub issue_reported: bool,
    pub issues: Vec<IssueReport>,
}

impl Transfer {
    pub fn initiated_by(&self) -> InitiatedBy {
        self.origin.initiated_by()
    }

    pub fn involves(&self, user_id: &UserId) -> bool {
        &self.giver_id == user_id || &self.requester_id == user_id
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.valid_until
    }
}

impl fmt::Display for Transfer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Transfer[{}] {} -> {} qty={} at={} status={}",
            self.id, self.giver_id, self.requester_id, self.quantity, self.location, self.status
        )
    }
}

/// Successful redemption outcome, returned for downstream accounting and
/// notification.
#[derive(Debug, Clone, Serialize)]
pub struct RedemptionReceipt {
    pub transfer_id: TransferId,
    pub quantity: SwipeCount,
    pub giver_id: UserId,
    pub location: String,
    pub redeemed_at: DateTime<Utc>,
}

/// A user's transfers, bucketed the way the profile screen consumes them.
#[derive(Debug, Clone, Default)]
pub struct UserTransfers {
    /// Swipes this user gave away.
    pub given: Vec<Transfer>,
    /// Swipes this user received.
    pub received: Vec<Transfer>,
    /// Credentials this user can still redeem.
    pub active_received: Vec<Transfer>,
    pub pending: Vec<Transfer>,
    /// Redeemed or settled history, either side.
    pub completed: Vec<Transfer>,
}

/// Aggregate counters across all transfers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TransferStats {
    pub total: usize,
    pub active: usize,
    pub used: usize,
    pub completed: usize,
    pub cancelled: usize,
    pub expired: usize,
    /// Swipes actually delivered (USED or COMPLETED transfers).
    pub total_swipes_transferred: u64,
}

/// Counts from one expiry sweep pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub transfers_expired: usize,
    pub requests_expired: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transfer_id_roundtrip() {
        let id = TransferId::new();
        let parsed: TransferId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_transfer_ids_are_sortable_by_creation() {
        let a = TransferId::new();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let b = TransferId::new();
        assert!(b.inner() > a.inner());
    }

    #[test]
    fn test_origin_initiated_by() {
        let offer = TransferOrigin::Offer(Uuid::new_v4());
        let request = TransferOrigin::Request(Uuid::new_v4());
        assert_eq!(offer.initiated_by(), InitiatedBy::Offer);
        assert_eq!(request.initiated_by(), InitiatedBy::Request);
        assert_eq!(InitiatedBy::Offer.to_string(), "OFFER");
    }

    #[test]
    fn test_details_builder() {
        let origin = TransferOrigin::Offer(Uuid::new_v4());
        let details = TransferDetails::new(origin, 2)
            .at_location(LocationRule::Only("Okenshields".to_string()))
            .with_match_score(87.0);

        assert_eq!(details.quantity, 2);
        assert_eq!(details.match_score, Some(87.0));
        assert!(details.valid_until.is_none());
        assert!(!details.location.allows("North Star Dining Room"));
    }
}
