//! Offer and Request models
//!
//! Offers are a donor's pledge of surplus swipes; requests are a
//! recipient's stated need. Both carry a lifecycle status and are mutated
//! by the [`TransferEngine`](crate::transfer::TransferEngine) as a side
//! effect of transfer creation and cancellation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::core_types::{SwipeCount, UserId};

pub type OfferId = Uuid;
pub type RequestId = Uuid;

/// Offer lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OfferStatus {
    Active,
    Matched,
    Completed,
    Cancelled,
}

impl OfferStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OfferStatus::Active => "ACTIVE",
            OfferStatus::Matched => "MATCHED",
            OfferStatus::Completed => "COMPLETED",
            OfferStatus::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for OfferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Request lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestStatus {
    Active,
    Fulfilled,
    Expired,
    Cancelled,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Active => "ACTIVE",
            RequestStatus::Fulfilled => "FULFILLED",
            RequestStatus::Expired => "EXPIRED",
            RequestStatus::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How urgently a requester needs the swipes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Urgency {
    Low,
    Medium,
    High,
}

/// How the owner wants counter-parties chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchingPreference {
    AiMatch,
    ManualSelect,
    FriendOnly,
    FirstCome,
}

/// One slice of a request's fulfillment history (append-only).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FulfillmentRecord {
    pub giver_id: UserId,
    pub quantity: SwipeCount,
    pub timestamp: DateTime<Utc>,
}

/// A donor's pledge of N surplus swipes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Offer {
    pub id: OfferId,
    pub giver_id: UserId,
    /// Number of swipes pledged. Offers transfer their full quantity
    /// atomically (no partial fulfillment on this side).
    pub quantity: SwipeCount,
    /// Empty = valid at any hall.
    pub dining_halls: Vec<String>,
    /// Empty = valid at any meal time.
    pub meal_times: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub status: OfferStatus,
    pub matching_preference: MatchingPreference,
    /// Candidate allow-list for FRIEND_ONLY / MANUAL_SELECT preferences.
    pub specific_recipients: Vec<UserId>,
    pub matched_with: Option<UserId>,
    pub message: String,
    pub reason: String,
}

/// Creation parameters for an [`Offer`].
#[derive(Debug, Clone)]
pub struct OfferDraft {
    pub quantity: SwipeCount,
    pub dining_halls: Vec<String>,
    pub meal_times: Vec<String>,
    pub expires_at: DateTime<Utc>,
    pub matching_preference: MatchingPreference,
    pub specific_recipients: Vec<UserId>,
    pub message: String,
    pub reason: String,
}

impl OfferDraft {
    pub fn new(quantity: SwipeCount, expires_at: DateTime<Utc>) -> Self {
        Self {
            quantity,
            dining_halls: Vec::new(),
            meal_times: Vec::new(),
            expires_at,
            matching_preference: MatchingPreference::AiMatch,
            specific_recipients: Vec::new(),
            message: String::new(),
            reason: String::new(),
        }
    }
}

impl Offer {
    pub fn new(giver_id: UserId, draft: OfferDraft) -> Self {
        Self {
            id: Uuid::new_v4(),
            giver_id,
            quantity: draft.quantity,
            dining_halls: draft.dining_halls,
            meal_times: draft.meal_times,
            created_at: Utc::now(),
            expires_at: draft.expires_at,
            status: OfferStatus::Active,
            matching_preference: draft.matching_preference,
            specific_recipients: draft.specific_recipients,
            matched_with: None,
            message: draft.message,
            reason: draft.reason,
        }
    }

    /// An offer with no listed halls is valid anywhere.
    pub fn allows_hall(&self, hall: &str) -> bool {
        self.dining_halls.is_empty() || self.dining_halls.iter().any(|h| h == hall)
    }

    pub fn allows_meal_time(&self, meal_time: &str) -> bool {
        self.meal_times.is_empty() || self.meal_times.iter().any(|m| m == meal_time)
    }

    pub fn is_open(&self, now: DateTime<Utc>) -> bool {
        self.status == OfferStatus::Active && self.expires_at > now
    }
}

/// A recipient's stated need for N swipes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub id: RequestId,
    pub requester_id: UserId,
    /// Remaining swipes needed. Decremented on partial fulfillment;
    /// reaching zero flips the status to FULFILLED.
    pub quantity: SwipeCount,
    pub preferred_dining_halls: Vec<String>,
    pub needed_by: DateTime<Utc>,
    pub urgency: Urgency,
    pub created_at: DateTime<Utc>,
    pub status: RequestStatus,
    pub matching_preference: MatchingPreference,
    pub fulfilled_by: Option<UserId>,
    pub fulfilled_at: Option<DateTime<Utc>>,
    pub fulfillment_history: Vec<FulfillmentRecord>,
    pub message: String,
    pub reason: String,
}

/// Creation parameters for a [`Request`].
#[derive(Debug, Clone)]
pub struct RequestDraft {
    pub quantity: SwipeCount,
    pub preferred_dining_halls: Vec<String>,
    pub needed_by: DateTime<Utc>,
    pub urgency: Urgency,
    pub matching_preference: MatchingPreference,
    pub message: String,
    pub reason: String,
}

impl RequestDraft {
    pub fn new(quantity: SwipeCount, needed_by: DateTime<Utc>) -> Self {
        Self {
            quantity,
            preferred_dining_halls: Vec::new(),
            needed_by,
            urgency: Urgency::Medium,
            matching_preference: MatchingPreference::AiMatch,
            message: String::new(),
            reason: String::new(),
        }
    }
}

impl Request {
    pub fn new(requester_id: UserId, draft: RequestDraft) -> Self {
        Self {
            id: Uuid::new_v4(),
            requester_id,
            quantity: draft.quantity,
            preferred_dining_halls: draft.preferred_dining_halls,
            needed_by: draft.needed_by,
            urgency: draft.urgency,
            created_at: Utc::now(),
            status: RequestStatus::Active,
            matching_preference: draft.matching_preference,
            fulfilled_by: None,
            fulfilled_at: None,
            fulfillment_history: Vec::new(),
            message: draft.message,
            reason: draft.reason,
        }
    }

    pub fn prefers_hall(&self, hall: &str) -> bool {
        self.preferred_dining_halls.is_empty()
            || self.preferred_dining_halls.iter().any(|h| h == hall)
    }

    pub fn is_open(&self, now: DateTime<Utc>) -> bool {
        self.status == RequestStatus::Active && self.needed_by > now
    }
}

/// Browse filters for active offers.
#[derive(Debug, Clone, Default)]
pub struct OfferFilter {
    pub dining_hall: Option<String>,
    pub meal_time: Option<String>,
    pub min_quantity: Option<SwipeCount>,
}

/// Browse filters for active requests.
#[derive(Debug, Clone, Default)]
pub struct RequestFilter {
    pub dining_hall: Option<String>,
    pub urgency: Option<Urgency>,
    pub max_quantity: Option<SwipeCount>,
}
