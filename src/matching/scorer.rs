//! Pluggable match scoring
//!
//! The selector consumes a [`Scorer`] - AI-backed in production, the
//! deterministic [`HeuristicScorer`] as fallback - through a normalized
//! view of the subject and its counter-party candidates. Scorer output is
//! untrusted and always re-validated by the selector.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core_types::{SwipeCount, UserId};
use crate::models::{Offer, Request, Urgency};

/// Profile facts the scorer may weigh, supplied by the caller.
#[derive(Debug, Clone)]
pub struct UserProfile {
    pub user_id: UserId,
    pub has_meal_plan: bool,
}

/// The side being matched, normalized so one scorer serves both
/// directions (offer → requests and request → offers).
#[derive(Debug, Clone)]
pub struct MatchSubject {
    pub id: Uuid,
    pub user_id: UserId,
    pub quantity: SwipeCount,
    pub dining_halls: Vec<String>,
    pub deadline: Option<DateTime<Utc>>,
}

impl MatchSubject {
    pub fn from_offer(offer: &Offer) -> Self {
        Self {
            id: offer.id,
            user_id: offer.giver_id.clone(),
            quantity: offer.quantity,
            dining_halls: offer.dining_halls.clone(),
            deadline: Some(offer.expires_at),
        }
    }

    pub fn from_request(request: &Request) -> Self {
        Self {
            id: request.id,
            user_id: request.requester_id.clone(),
            quantity: request.quantity,
            dining_halls: request.preferred_dining_halls.clone(),
            deadline: Some(request.needed_by),
        }
    }
}

/// A counter-party candidate, flattened with its owner's profile facts.
#[derive(Debug, Clone)]
pub struct MatchCandidate {
    pub id: Uuid,
    pub user_id: UserId,
    pub quantity: SwipeCount,
    pub dining_halls: Vec<String>,
    pub urgency: Option<Urgency>,
    pub deadline: Option<DateTime<Utc>>,
    pub has_meal_plan: Option<bool>,
}

impl MatchCandidate {
    pub fn from_request(request: &Request, profiles: &[UserProfile]) -> Self {
        Self {
            id: request.id,
            user_id: request.requester_id.clone(),
            quantity: request.quantity,
            dining_halls: request.preferred_dining_halls.clone(),
            urgency: Some(request.urgency),
            deadline: Some(request.needed_by),
            has_meal_plan: lookup_meal_plan(&request.requester_id, profiles),
        }
    }

    pub fn from_offer(offer: &Offer, profiles: &[UserProfile]) -> Self {
        Self {
            id: offer.id,
            user_id: offer.giver_id.clone(),
            quantity: offer.quantity,
            dining_halls: offer.dining_halls.clone(),
            urgency: None,
            deadline: Some(offer.expires_at),
            has_meal_plan: lookup_meal_plan(&offer.giver_id, profiles),
        }
    }
}

fn lookup_meal_plan(user_id: &UserId, profiles: &[UserProfile]) -> Option<bool> {
    profiles
        .iter()
        .find(|p| &p.user_id == user_id)
        .map(|p| p.has_meal_plan)
}

/// Shortlist priority bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchPriority {
    High,
    Medium,
    Low,
}

/// One ranked entry. Raw scorer output uses the same shape; entries only
/// count once the selector has validated and clamped them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredMatch {
    pub candidate_id: Uuid,
    pub score: f32,
    pub reasoning: String,
    pub priority: MatchPriority,
}

/// Ranking seam. Implementations may be remote and latent, and may fail;
/// the selector degrades to the heuristic fallback on any error.
#[async_trait]
pub trait Scorer: Send + Sync {
    async fn rank(
        &self,
        subject: &MatchSubject,
        candidates: &[MatchCandidate],
    ) -> anyhow::Result<Vec<ScoredMatch>>;
}

/// Rule-based fallback scorer. Deterministic and infallible, so matching
/// availability never depends on an external service being reachable.
///
/// Weights follow the product heuristics: start at 50, +20 when the
/// candidate has no meal plan, +15 for HIGH urgency, +15 for a dining-hall
/// overlap, +10 when the subject's quantity covers the candidate's need.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeuristicScorer;

impl HeuristicScorer {
    pub fn score_candidate(subject: &MatchSubject, candidate: &MatchCandidate) -> f32 {
        let mut score = 50.0;

        if candidate.has_meal_plan == Some(false) {
            score += 20.0;
        }
        if candidate.urgency == Some(Urgency::High) {
            score += 15.0;
        }
        if halls_overlap(&subject.dining_halls, &candidate.dining_halls) {
            score += 15.0;
        }
        if subject.quantity >= candidate.quantity {
            score += 10.0;
        }

        score
    }
}

/// An empty list on either side means "anywhere" and always overlaps.
fn halls_overlap(a: &[String], b: &[String]) -> bool {
    a.is_empty() || b.is_empty() || a.iter().any(|hall| b.contains(hall))
}

#[async_trait]
impl Scorer for HeuristicScorer {
    async fn rank(
        &self,
        subject: &MatchSubject,
        candidates: &[MatchCandidate],
    ) -> anyhow::Result<Vec<ScoredMatch>> {
        Ok(candidates
            .iter()
            .map(|candidate| {
                let score = Self::score_candidate(subject, candidate);
                ScoredMatch {
                    candidate_id: candidate.id,
                    score,
                    reasoning: "heuristic match".to_string(),
                    priority: if score > 70.0 {
                        MatchPriority::High
                    } else {
                        MatchPriority::Medium
                    },
                }
            })
            .collect())
    }
}
