//! AI-assisted match selection
//!
//! The ranking function itself (AI or rule-based) is a pluggable
//! [`Scorer`]; this module owns the contract around it: candidate
//! validation, score clamping, ordering, deduplication, and the fallback
//! that keeps matching available when the external scorer is not.

pub mod scorer;
pub mod selector;

pub use scorer::{
    HeuristicScorer, MatchCandidate, MatchPriority, MatchSubject, ScoredMatch, Scorer,
    UserProfile,
};
pub use selector::{DEFAULT_SHORTLIST, MatchSelector};
