use crate::core::{
    error::{MatchingError, Result},
    lifecycle::LifecycleManager,
    matcher::Matcher,
    optimizer::{WeightOptimizer, WeightSuggestion},
    repository::ListingRepository,
    weights::WeightStore,
};
use crate::models::{
    ExchangeType, Listing, ListingId, Match, MatchEvent, MatchId, OwnerId, OwnerStats,
    PartialWeights, WeightVector, Weights,
};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

/// Per-listing failure inside a bulk operation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkFailure {
    pub listing_id: ListingId,
    pub error: String,
}

/// Outcome of a bulk "regenerate matches" run
#[derive(Debug, Clone, Default, Serialize)]
pub struct BulkReport {
    pub processed: usize,
    pub proposed: Vec<(ListingId, Vec<MatchId>)>,
    pub failures: Vec<BulkFailure>,
    /// Set when the run was cancelled before reaching every listing
    pub interrupted: bool,
}

/// Entry point used by lifecycle consumers and admin tooling
///
/// Owns the scoring engine, weight store, lifecycle manager and optimizer,
/// and reads listings through `R`. Constructed once per process and shared
/// by reference.
pub struct ExchangeEngine<R> {
    repository: R,
    matcher: Matcher,
    weights: WeightStore,
    lifecycle: LifecycleManager,
    optimizer: WeightOptimizer,
}

impl<R: ListingRepository> ExchangeEngine<R> {
    pub fn new(
        repository: R,
        matcher: Matcher,
        weights: WeightStore,
        lifecycle: LifecycleManager,
        optimizer: WeightOptimizer,
    ) -> Self {
        Self {
            repository,
            matcher,
            weights,
            lifecycle,
            optimizer,
        }
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    pub fn lifecycle(&self) -> &LifecycleManager {
        &self.lifecycle
    }

    pub fn optimizer(&self) -> &WeightOptimizer {
        &self.optimizer
    }

    /// Score the candidate pool of `listing_id` and register the top matches
    ///
    /// Pairs that already have a live match keep it, so running this twice
    /// on an unchanged pool returns the same matches in the same order.
    pub async fn propose_matches(
        &self,
        listing_id: ListingId,
        top_k: Option<usize>,
    ) -> Result<Vec<Match>> {
        let source = self
            .repository
            .get_listing(listing_id)
            .await
            .map_err(MatchingError::from_repository)?;

        if !source.is_active() {
            tracing::debug!("Listing {} is not active, skipping matching", listing_id);
            return Ok(Vec::new());
        }

        let mut pool = self
            .repository
            .active_listings(source.exchange_type.counterparts())
            .await
            .map_err(MatchingError::from_repository)?;
        self.attach_owner_stats(&mut pool).await;

        // One weight snapshot per listing keeps the pass self-consistent
        let weights = self.weights.get_current();
        let exclusions = self.lifecycle.exclusions_for(listing_id);
        let top_k = self.matcher.config().resolve_top_k(top_k);

        let result = self
            .matcher
            .find_matches(&source, &pool, &weights, top_k, &exclusions);

        let now = Utc::now();
        let mut proposed = Vec::with_capacity(result.matches.len());
        for candidate in result.matches {
            let pair = candidate.pair();
            match self.lifecycle.register(candidate, now) {
                Some(id) => proposed.push(self.lifecycle.get(id, now)?),
                None => tracing::debug!("Pair {:?} closed during proposal, dropped", pair),
            }
        }

        tracing::info!(
            "Proposed {} matches for listing {} (from {} candidates, {} eligible, weights v{})",
            proposed.len(),
            listing_id,
            result.total_candidates,
            result.eligible_candidates,
            weights.version
        );

        Ok(proposed)
    }

    /// Fill in missing owner history; lookup failures leave the neutral prior
    async fn attach_owner_stats(&self, pool: &mut [Listing]) {
        let mut known: HashMap<OwnerId, Option<OwnerStats>> = HashMap::new();

        for listing in pool.iter_mut() {
            if listing.owner_stats.is_some() {
                continue;
            }
            if let Some(stats) = known.get(&listing.owner_id) {
                listing.owner_stats = *stats;
                continue;
            }

            let stats = match self.repository.owner_stats(listing.owner_id).await {
                Ok(stats) => stats,
                Err(e) => {
                    tracing::warn!("Owner stats unavailable for {}: {}", listing.owner_id, e);
                    None
                }
            };
            known.insert(listing.owner_id, stats);
            listing.owner_stats = stats;
        }
    }

    /// Re-score a batch of listings
    ///
    /// Each listing is handled atomically; a failure is recorded and the run
    /// moves on. `cancel` is checked between listings.
    pub async fn regenerate_matches(
        &self,
        listing_ids: &[ListingId],
        cancel: &AtomicBool,
    ) -> BulkReport {
        let mut report = BulkReport::default();

        for &listing_id in listing_ids {
            if cancel.load(Ordering::Acquire) {
                tracing::warn!(
                    "Regeneration cancelled after {} of {} listings",
                    report.processed,
                    listing_ids.len()
                );
                report.interrupted = true;
                break;
            }

            match self.propose_matches(listing_id, None).await {
                Ok(matches) => report
                    .proposed
                    .push((listing_id, matches.iter().map(|m| m.id).collect())),
                Err(e) => {
                    tracing::warn!("Regeneration failed for listing {}: {}", listing_id, e);
                    report.failures.push(BulkFailure {
                        listing_id,
                        error: e.to_string(),
                    });
                }
            }
            report.processed += 1;
        }

        report
    }

    /// Regenerate matches for every active listing
    pub async fn regenerate_all(&self, cancel: &AtomicBool) -> Result<BulkReport> {
        let listings = self
            .repository
            .active_listings(&[ExchangeType::Give, ExchangeType::Swap, ExchangeType::Request])
            .await?;
        let mut ids: Vec<ListingId> = listings.iter().map(|l| l.id).collect();
        ids.sort_unstable();

        Ok(self.regenerate_matches(&ids, cancel).await)
    }

    pub fn record_event(&self, match_id: MatchId, event: MatchEvent) -> Result<Match> {
        self.lifecycle.record_event(match_id, event, Utc::now())
    }

    pub fn get_match(&self, match_id: MatchId) -> Result<Match> {
        self.lifecycle.get(match_id, Utc::now())
    }

    /// Expire every match past its TTL
    pub fn expire_stale(&self) -> Vec<Match> {
        let expired = self.lifecycle.expire_stale(Utc::now());
        if !expired.is_empty() {
            tracing::info!("Expired {} stale matches", expired.len());
        }
        expired
    }

    /// Matches archived since the previous call, for persistence
    pub fn take_archived(&self) -> Vec<Match> {
        self.lifecycle.drain_archived()
    }

    pub fn get_weights(&self) -> WeightVector {
        self.weights.get_current()
    }

    pub fn weight_history(&self) -> Vec<WeightVector> {
        self.weights.history()
    }

    pub fn propose_weight_adjustment(&self, partial: &PartialWeights) -> Result<Weights> {
        self.weights.propose(partial)
    }

    pub fn commit_weights(&self, weights: &Weights, author: &str) -> Result<WeightVector> {
        self.weights.commit(weights, author)
    }

    /// Prepare the next weight version without activating it
    pub fn stage_weights(&self, weights: &Weights, author: &str) -> Result<WeightVector> {
        self.weights.stage(weights, author)
    }

    /// Activate a staged version once it has been stored
    pub fn publish_weights(&self, staged: WeightVector) -> Result<WeightVector> {
        self.weights.publish(staged)
    }

    /// A past or current weight version, for explaining archived matches
    pub fn weight_version(&self, version: u64) -> Result<WeightVector> {
        self.weights
            .get_version(version)
            .ok_or(MatchingError::UnknownWeightVersion(version))
    }

    /// Recommend weights from outcomes closed within `lookback`
    pub fn suggest_weights(&self, lookback: Duration) -> Result<WeightSuggestion> {
        let current = self.weights.get_current();
        let samples = self.lifecycle.outcomes_since(Utc::now() - lookback);
        tracing::debug!(
            "Analyzing {} outcome samples against weights v{}",
            samples.len(),
            current.version
        );
        self.optimizer.suggest(&current, &samples)
    }
}
