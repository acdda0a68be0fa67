//! Match selection
//!
//! Turns a pool of counter-party candidates into a validated,
//! deduplicated, score-sorted shortlist. Scorer output is treated as
//! untrusted input: entries referencing unknown candidates are dropped
//! and scores are clamped before ranking.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::warn;
use uuid::Uuid;

use super::scorer::{HeuristicScorer, MatchCandidate, MatchSubject, ScoredMatch, Scorer};

/// Default shortlist size. Callers wanting the tighter UI cutoff pass
/// their own limit.
pub const DEFAULT_SHORTLIST: usize = 10;

pub struct MatchSelector {
    scorer: Arc<dyn Scorer>,
    fallback: HeuristicScorer,
}

impl MatchSelector {
    pub fn new(scorer: Arc<dyn Scorer>) -> Self {
        Self {
            scorer,
            fallback: HeuristicScorer,
        }
    }

    /// Selector with no external scorer at all.
    pub fn heuristic_only() -> Self {
        Self::new(Arc::new(HeuristicScorer))
    }

    /// Rank `candidates` for `subject` and return the top `limit`.
    ///
    /// An empty pool returns an empty list (not an error). A scorer
    /// failure falls back to the deterministic heuristic, so this always
    /// produces a result.
    pub async fn select(
        &self,
        subject: &MatchSubject,
        candidates: &[MatchCandidate],
        limit: usize,
    ) -> Vec<ScoredMatch> {
        if candidates.is_empty() {
            return Vec::new();
        }

        let raw = match self.scorer.rank(subject, candidates).await {
            Ok(raw) => raw,
            Err(err) => {
                warn!(
                    subject_id = %subject.id,
                    error = %err,
                    "scorer failed, using heuristic fallback"
                );
                self.fallback
                    .rank(subject, candidates)
                    .await
                    .unwrap_or_default()
            }
        };

        Self::finalize(raw, candidates, limit)
    }

    /// Validate, clamp, sort, deduplicate, truncate.
    fn finalize(
        raw: Vec<ScoredMatch>,
        candidates: &[MatchCandidate],
        limit: usize,
    ) -> Vec<ScoredMatch> {
        let known: HashSet<Uuid> = candidates.iter().map(|c| c.id).collect();

        let mut ranked: Vec<ScoredMatch> = raw
            .into_iter()
            // A scorer may hallucinate references; keep only real ones.
            .filter(|m| known.contains(&m.candidate_id))
            .map(|mut m| {
                m.score = m.score.clamp(0.0, 100.0);
                m
            })
            .collect();

        ranked.sort_by(|a, b| b.score.total_cmp(&a.score));

        // Dedup after the sort keeps the highest-scored entry per
        // candidate.
        let mut seen = HashSet::new();
        ranked.retain(|m| seen.insert(m.candidate_id));

        ranked.truncate(limit);
        ranked
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matching::scorer::MatchPriority;
    use async_trait::async_trait;

    fn subject() -> MatchSubject {
        MatchSubject {
            id: Uuid::new_v4(),
            user_id: "alice".to_string(),
            quantity: 2,
            dining_halls: Vec::new(),
            deadline: None,
        }
    }

    fn candidate(id: Uuid) -> MatchCandidate {
        MatchCandidate {
            id,
            user_id: "bob".to_string(),
            quantity: 1,
            dining_halls: Vec::new(),
            urgency: None,
            deadline: None,
            has_meal_plan: None,
        }
    }

    fn entry(id: Uuid, score: f32) -> ScoredMatch {
        ScoredMatch {
            candidate_id: id,
            score,
            reasoning: String::new(),
            priority: MatchPriority::Medium,
        }
    }

    struct FixedScorer(Vec<ScoredMatch>);

    #[async_trait]
    impl Scorer for FixedScorer {
        async fn rank(
            &self,
            _subject: &MatchSubject,
            _candidates: &[MatchCandidate],
        ) -> anyhow::Result<Vec<ScoredMatch>> {
            Ok(self.0.clone())
        }
    }

    struct FailingScorer;

    #[async_trait]
    impl Scorer for FailingScorer {
        async fn rank(
            &self,
            _subject: &MatchSubject,
            _candidates: &[MatchCandidate],
        ) -> anyhow::Result<Vec<ScoredMatch>> {
            anyhow::bail!("model endpoint unreachable")
        }
    }

    #[tokio::test]
    async fn test_empty_pool_returns_empty() {
        let selector = MatchSelector::heuristic_only();
        let result = selector.select(&subject(), &[], DEFAULT_SHORTLIST).await;
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn test_hallucinated_references_are_dropped() {
        let real = Uuid::new_v4();
        let scorer = FixedScorer(vec![entry(real, 80.0), entry(Uuid::new_v4(), 99.0)]);
        let selector = MatchSelector::new(Arc::new(scorer));

        let result = selector
            .select(&subject(), &[candidate(real)], DEFAULT_SHORTLIST)
            .await;
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].candidate_id, real);
    }

    #[tokio::test]
    async fn test_scores_clamped_and_sorted() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let scorer = FixedScorer(vec![entry(a, 250.0), entry(b, -10.0)]);
        let selector = MatchSelector::new(Arc::new(scorer));

        let result = selector
            .select(&subject(), &[candidate(a), candidate(b)], DEFAULT_SHORTLIST)
            .await;
        assert_eq!(result[0].candidate_id, a);
        assert_eq!(result[0].score, 100.0);
        assert_eq!(result[1].score, 0.0);
    }

    #[tokio::test]
    async fn test_dedup_keeps_highest_scored() {
        let a = Uuid::new_v4();
        let scorer = FixedScorer(vec![entry(a, 40.0), entry(a, 90.0)]);
        let selector = MatchSelector::new(Arc::new(scorer));

        let result = selector
            .select(&subject(), &[candidate(a)], DEFAULT_SHORTLIST)
            .await;
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].score, 90.0);
    }

    #[tokio::test]
    async fn test_truncates_to_limit() {
        let candidates: Vec<MatchCandidate> =
            (0..20).map(|_| candidate(Uuid::new_v4())).collect();
        let selector = MatchSelector::heuristic_only();

        let top10 = selector
            .select(&subject(), &candidates, DEFAULT_SHORTLIST)
            .await;
        assert_eq!(top10.len(), 10);

        let top5 = selector.select(&subject(), &candidates, 5).await;
        assert_eq!(top5.len(), 5);
    }

    #[tokio::test]
    async fn test_failing_scorer_falls_back_to_heuristic() {
        let candidates = vec![candidate(Uuid::new_v4()), candidate(Uuid::new_v4())];
        let selector = MatchSelector::new(Arc::new(FailingScorer));

        let result = selector
            .select(&subject(), &candidates, DEFAULT_SHORTLIST)
            .await;
        assert_eq!(result.len(), 2, "fallback must always produce a result");
        assert!(result.iter().all(|m| m.score >= 50.0));
    }
}
