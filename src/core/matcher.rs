use crate::core::{
    features::{pair_impact_kg, FeatureConfig, FeatureExtractor, ImpactScale},
    filters::{is_eligible_candidate, CandidateExclusions},
    scoring::{calculate_score, explain},
};
use crate::models::{FeatureVector, Listing, Match, MatchState, WeightVector};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    /// Number of matches returned when the caller does not ask for a count
    pub default_top_k: usize,
    pub max_top_k: usize,
    /// Minimum weighted contribution for a feature to be listed as a reason
    pub significance_threshold: f64,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            default_top_k: 5,
            max_top_k: 20,
            significance_threshold: 0.05,
        }
    }
}

impl MatchingConfig {
    /// Resolve a requested result count against the configured bounds
    pub fn resolve_top_k(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.default_top_k)
            .clamp(1, self.max_top_k.max(1))
    }
}

/// Result of the matching process
#[derive(Debug)]
pub struct MatchResult {
    pub matches: Vec<Match>,
    pub total_candidates: usize,
    pub eligible_candidates: usize,
}

struct Ranked<'a> {
    candidate: &'a Listing,
    features: FeatureVector,
    score: f64,
}

/// Scoring engine - ranks a candidate pool against a source listing
///
/// # Pipeline Stages
/// 1. Eligibility filtering (status, owner, exchange type, closed pairs)
/// 2. Impact ceiling update from the eligible pool
/// 3. Feature extraction and weighted scoring
/// 4. Deterministic ranking and truncation
#[derive(Debug)]
pub struct Matcher {
    extractor: FeatureExtractor,
    impact: ImpactScale,
    config: MatchingConfig,
}

impl Matcher {
    pub fn new(features: FeatureConfig, config: MatchingConfig) -> Self {
        let impact = ImpactScale::new(features.impact_floor_kg);
        Self {
            extractor: FeatureExtractor::new(features),
            impact,
            config,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(FeatureConfig::default(), MatchingConfig::default())
    }

    pub fn config(&self) -> &MatchingConfig {
        &self.config
    }

    /// Find the best `top_k` counterparts for `listing`
    ///
    /// Every returned match is stamped with `weights` (including its
    /// version) and starts in the `proposed` state. An empty or fully
    /// excluded pool yields no matches.
    pub fn find_matches(
        &self,
        listing: &Listing,
        candidates: &[Listing],
        weights: &WeightVector,
        top_k: usize,
        exclusions: &CandidateExclusions,
    ) -> MatchResult {
        let total_candidates = candidates.len();

        // Stage 1: eligibility
        let eligible: Vec<&Listing> = candidates
            .iter()
            .filter(|candidate| is_eligible_candidate(listing, candidate, exclusions))
            .collect();

        // Stage 2: environmental impact is scaled against the rolling maximum
        let mut ceiling = self.impact.ceiling();
        for candidate in &eligible {
            if let Some(kg) = pair_impact_kg(listing, candidate) {
                ceiling = self.impact.observe(kg);
            }
        }
        let extractor = self.extractor.clone().with_impact_ceiling(ceiling);

        // Stage 3: features and scores
        let mut ranked: Vec<Ranked<'_>> = eligible
            .iter()
            .map(|&candidate| {
                let features = extractor.extract(listing, candidate);
                let score = calculate_score(&features, &weights.weights);
                Ranked {
                    candidate,
                    features,
                    score,
                }
            })
            .collect();

        // Stage 4: score desc, then user compatibility desc, then newer
        // candidates first; the id keeps the order total
        ranked.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| {
                    b.features
                        .user_compatibility
                        .total_cmp(&a.features.user_compatibility)
                })
                .then_with(|| b.candidate.created_at.cmp(&a.candidate.created_at))
                .then_with(|| a.candidate.id.cmp(&b.candidate.id))
        });
        ranked.truncate(top_k);

        let now = Utc::now();
        let matches = ranked
            .into_iter()
            .map(|r| Match {
                id: Uuid::new_v4(),
                source_listing_id: listing.id,
                candidate_listing_id: r.candidate.id,
                score: r.score,
                features: r.features,
                weights: weights.clone(),
                state: MatchState::Proposed,
                reasons: explain(
                    &r.features,
                    &weights.weights,
                    self.config.significance_threshold,
                ),
                transitions: Vec::new(),
                created_at: now,
                updated_at: now,
            })
            .collect();

        MatchResult {
            matches,
            total_candidates,
            eligible_candidates: eligible.len(),
        }
    }
}

impl Default for Matcher {
    fn default() -> Self {
        Self::with_defaults()
    }
}
