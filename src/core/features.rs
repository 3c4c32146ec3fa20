//! Per-pair feature extraction.
//!
//! Every feature lands in [0, 1]. Missing or malformed listing attributes
//! resolve to neutral values so an incomplete listing still gets scored.

use crate::core::distance::listing_distance_km;
use crate::models::{Condition, ExchangeType, FeatureVector, Listing, OwnerStats, ValueRange};
use serde::Deserialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Prior used for owners without any exchange history
pub const NEUTRAL_USER_PRIOR: f64 = 0.5;

/// Credit for an offered condition (column) against the minimum wanted
/// condition (row). Rows and columns run New, LikeNew, Good, Fair.
const CONDITION_TABLE: [[f64; 4]; 4] = [
    [1.0, 0.6, 0.3, 0.0],
    [1.0, 1.0, 0.6, 0.3],
    [1.0, 1.0, 1.0, 0.6],
    [1.0, 1.0, 1.0, 1.0],
];

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    /// Distance at which location proximity reaches zero
    pub max_radius_km: f64,
    /// Value used for a feature whose inputs are missing
    pub neutral_score: f64,
    /// Proximity used when either listing has no coordinates
    pub neutral_proximity: f64,
    /// Lower bound of the environmental impact ceiling
    pub impact_floor_kg: f64,
    pub max_urgency: u8,
    pub rating_scale: f64,
    /// Pseudo-count pulling sparse owner histories toward the neutral prior
    pub prior_strength: f64,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            max_radius_km: 50.0,
            neutral_score: 0.5,
            neutral_proximity: 0.5,
            impact_floor_kg: 25.0,
            max_urgency: 3,
            rating_scale: 5.0,
            prior_strength: 5.0,
        }
    }
}

/// Rolling platform-wide maximum of pair CO2 savings.
///
/// Only ever grows, so impact scores of a pool stay comparable within a pass.
#[derive(Debug)]
pub struct ImpactScale {
    max_bits: AtomicU64,
}

impl ImpactScale {
    pub fn new(floor_kg: f64) -> Self {
        Self {
            max_bits: AtomicU64::new(floor_kg.max(f64::MIN_POSITIVE).to_bits()),
        }
    }

    pub fn ceiling(&self) -> f64 {
        f64::from_bits(self.max_bits.load(Ordering::Acquire))
    }

    /// Record an observed pair impact and return the updated ceiling
    pub fn observe(&self, kg: f64) -> f64 {
        if !kg.is_finite() || kg <= 0.0 {
            return self.ceiling();
        }
        let previous = self
            .max_bits
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |bits| {
                (kg > f64::from_bits(bits)).then(|| kg.to_bits())
            });
        match previous {
            Ok(_) => kg,
            Err(bits) => f64::from_bits(bits),
        }
    }
}

/// Combined CO2 savings of exchanging both items, if either side knows it
pub fn pair_impact_kg(a: &Listing, b: &Listing) -> Option<f64> {
    match (a.co2_saved_kg, b.co2_saved_kg) {
        (None, None) => None,
        (x, y) => Some(x.unwrap_or(0.0).max(0.0) + y.unwrap_or(0.0).max(0.0)),
    }
}

/// Derives comparable features for an ordered (source, candidate) pair
#[derive(Debug, Clone)]
pub struct FeatureExtractor {
    config: FeatureConfig,
    impact_ceiling_kg: f64,
}

impl FeatureExtractor {
    pub fn new(config: FeatureConfig) -> Self {
        let impact_ceiling_kg = config.impact_floor_kg;
        Self {
            config,
            impact_ceiling_kg,
        }
    }

    /// Scale environmental impact against `ceiling_kg` (never below the floor)
    pub fn with_impact_ceiling(mut self, ceiling_kg: f64) -> Self {
        if ceiling_kg.is_finite() {
            self.impact_ceiling_kg = ceiling_kg.max(self.config.impact_floor_kg);
        }
        self
    }

    pub fn config(&self) -> &FeatureConfig {
        &self.config
    }

    pub fn extract(&self, source: &Listing, candidate: &Listing) -> FeatureVector {
        let neutral = self.config.neutral_score;
        let distance_km =
            listing_distance_km(source.coordinates.as_ref(), candidate.coordinates.as_ref());

        FeatureVector {
            category_match: sanitize(self.category_match(source, candidate), neutral),
            location_proximity: sanitize(
                self.location_proximity(distance_km),
                self.config.neutral_proximity,
            ),
            environmental_impact: sanitize(self.environmental_impact(source, candidate), neutral),
            condition_compatibility: sanitize(
                self.condition_compatibility(source, candidate),
                neutral,
            ),
            value_range_overlap: sanitize(
                self.value_range_overlap(source.value_range, candidate.value_range),
                neutral,
            ),
            urgency: sanitize(self.urgency(source, candidate), 0.0),
            user_compatibility: sanitize(
                self.user_compatibility(candidate.owner_stats.as_ref()),
                NEUTRAL_USER_PRIOR,
            ),
            distance_km: distance_km.filter(|d| d.is_finite()),
        }
    }

    fn category_match(&self, a: &Listing, b: &Listing) -> f64 {
        let path_a = a.category_path();
        let path_b = b.category_path();
        if path_a.is_empty() || path_b.is_empty() {
            return self.config.neutral_score;
        }

        let shared = path_a
            .iter()
            .zip(path_b.iter())
            .take_while(|(x, y)| x.eq_ignore_ascii_case(y))
            .count();
        let depth = path_a.len().max(path_b.len());

        if shared == depth {
            1.0
        } else {
            shared as f64 / depth as f64
        }
    }

    fn location_proximity(&self, distance_km: Option<f64>) -> f64 {
        match distance_km {
            Some(d) if self.config.max_radius_km > 0.0 => {
                (1.0 - d / self.config.max_radius_km).max(0.0)
            }
            _ => self.config.neutral_proximity,
        }
    }

    fn environmental_impact(&self, a: &Listing, b: &Listing) -> f64 {
        match pair_impact_kg(a, b) {
            Some(kg) if self.impact_ceiling_kg > 0.0 => kg / self.impact_ceiling_kg,
            _ => self.config.neutral_score,
        }
    }

    fn condition_compatibility(&self, a: &Listing, b: &Listing) -> f64 {
        let (Some(cond_a), Some(cond_b)) = (a.condition, b.condition) else {
            return self.config.neutral_score;
        };

        match (a.exchange_type, b.exchange_type) {
            // The requester's condition is the minimum they accept
            (ExchangeType::Request, ExchangeType::Request) => symmetric_condition(cond_a, cond_b),
            (ExchangeType::Request, _) => CONDITION_TABLE[cond_a.grade()][cond_b.grade()],
            (_, ExchangeType::Request) => CONDITION_TABLE[cond_b.grade()][cond_a.grade()],
            _ => symmetric_condition(cond_a, cond_b),
        }
    }

    fn value_range_overlap(&self, a: Option<ValueRange>, b: Option<ValueRange>) -> f64 {
        let (Some(a), Some(b)) = (a, b) else {
            return self.config.neutral_score;
        };
        if !a.is_valid() || !b.is_valid() {
            return self.config.neutral_score;
        }

        let lo = a.min.max(b.min);
        let hi = a.max.min(b.max);
        if hi < lo {
            return 0.0;
        }

        let union = a.max.max(b.max) - a.min.min(b.min);
        let intersection = hi - lo;
        if union <= f64::EPSILON {
            // identical point estimates
            return 1.0;
        }
        if intersection <= f64::EPSILON {
            // a point estimate inside the other range fully agrees with it
            let degenerate = a.max - a.min <= f64::EPSILON || b.max - b.min <= f64::EPSILON;
            return if degenerate { 1.0 } else { 0.0 };
        }

        intersection / union
    }

    fn urgency(&self, a: &Listing, b: &Listing) -> f64 {
        if self.config.max_urgency == 0 {
            return 0.0;
        }
        let level = a.urgency.unwrap_or(0).max(b.urgency.unwrap_or(0));
        f64::from(level.min(self.config.max_urgency)) / f64::from(self.config.max_urgency)
    }

    fn user_compatibility(&self, stats: Option<&OwnerStats>) -> f64 {
        let Some(stats) = stats else {
            return NEUTRAL_USER_PRIOR;
        };

        let completion = stats
            .completion_rate
            .filter(|r| r.is_finite())
            .map(|r| r.clamp(0.0, 1.0));
        let rating = stats
            .rating
            .filter(|r| r.is_finite() && self.config.rating_scale > 0.0)
            .map(|r| (r / self.config.rating_scale).clamp(0.0, 1.0));

        let raw = match (completion, rating) {
            (Some(c), Some(r)) => (c + r) / 2.0,
            (Some(v), None) | (None, Some(v)) => v,
            (None, None) => return NEUTRAL_USER_PRIOR,
        };

        let n = f64::from(stats.completed_exchanges);
        let confidence = n / (n + self.config.prior_strength.max(0.0));
        if !confidence.is_finite() {
            return NEUTRAL_USER_PRIOR;
        }

        NEUTRAL_USER_PRIOR + (raw - NEUTRAL_USER_PRIOR) * confidence
    }
}

impl Default for FeatureExtractor {
    fn default() -> Self {
        Self::new(FeatureConfig::default())
    }
}

fn symmetric_condition(a: Condition, b: Condition) -> f64 {
    let gap = a.grade().abs_diff(b.grade()) as f64;
    1.0 - gap / 3.0
}

#[inline]
fn sanitize(value: f64, fallback: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        fallback.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Coordinates, ListingStatus};
    use chrono::Utc;

    fn listing(id: u64, exchange_type: ExchangeType, category: &str) -> Listing {
        Listing {
            id,
            title: format!("Item {}", id),
            exchange_type,
            category: Some(category.to_string()),
            condition: None,
            value_range: None,
            coordinates: None,
            urgency: None,
            co2_saved_kg: None,
            owner_id: id * 10,
            owner_stats: None,
            status: ListingStatus::Active,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_category_graduated_credit() {
        let extractor = FeatureExtractor::default();
        let a = listing(1, ExchangeType::Give, "electronics/phones/smartphones");
        let same = listing(2, ExchangeType::Request, "electronics/phones/smartphones");
        let sibling = listing(3, ExchangeType::Request, "electronics/phones/landlines");
        let cousin = listing(4, ExchangeType::Request, "electronics/laptops");
        let other = listing(5, ExchangeType::Request, "furniture");

        assert_eq!(extractor.extract(&a, &same).category_match, 1.0);
        let sib = extractor.extract(&a, &sibling).category_match;
        let cou = extractor.extract(&a, &cousin).category_match;
        assert!(sib > cou && cou > 0.0);
        assert_eq!(extractor.extract(&a, &other).category_match, 0.0);
    }

    #[test]
    fn test_missing_coordinates_use_neutral_proximity() {
        let extractor = FeatureExtractor::default();
        let mut a = listing(1, ExchangeType::Give, "books");
        let b = listing(2, ExchangeType::Request, "books");
        a.coordinates = Some(Coordinates { latitude: 52.52, longitude: 13.405 });

        let features = extractor.extract(&a, &b);
        assert_eq!(features.location_proximity, 0.5);
        assert!(features.distance_km.is_none());
    }

    #[test]
    fn test_proximity_decreases_with_distance() {
        let extractor = FeatureExtractor::default();
        let mut a = listing(1, ExchangeType::Give, "books");
        let mut near = listing(2, ExchangeType::Request, "books");
        let mut far = listing(3, ExchangeType::Request, "books");
        a.coordinates = Some(Coordinates { latitude: 52.52, longitude: 13.405 });
        near.coordinates = Some(Coordinates { latitude: 52.53, longitude: 13.41 });
        far.coordinates = Some(Coordinates { latitude: 48.14, longitude: 11.58 });

        let near_score = extractor.extract(&a, &near).location_proximity;
        let far_score = extractor.extract(&a, &far).location_proximity;
        assert!(near_score > 0.9);
        assert_eq!(far_score, 0.0);
    }

    #[test]
    fn test_condition_table_respects_requester_minimum() {
        let extractor = FeatureExtractor::default();
        let mut request = listing(1, ExchangeType::Request, "tools");
        let mut offer = listing(2, ExchangeType::Give, "tools");

        request.condition = Some(Condition::Good);
        offer.condition = Some(Condition::LikeNew);
        assert_eq!(extractor.extract(&request, &offer).condition_compatibility, 1.0);
        assert_eq!(extractor.extract(&offer, &request).condition_compatibility, 1.0);

        offer.condition = Some(Condition::Fair);
        let worse = extractor.extract(&request, &offer).condition_compatibility;
        assert!(worse < 1.0 && worse > 0.0);
    }

    #[test]
    fn test_value_range_overlap() {
        let extractor = FeatureExtractor::default();
        let r = |min, max| Some(ValueRange { min, max });

        assert_eq!(extractor.value_range_overlap(r(0.0, 10.0), r(20.0, 30.0)), 0.0);
        let overlap = extractor.value_range_overlap(r(0.0, 10.0), r(5.0, 15.0));
        assert!((overlap - 1.0 / 3.0).abs() < 1e-9);
        assert_eq!(extractor.value_range_overlap(r(5.0, 5.0), r(5.0, 5.0)), 1.0);
        assert_eq!(extractor.value_range_overlap(r(10.0, 0.0), r(5.0, 15.0)), 0.5);
        assert_eq!(extractor.value_range_overlap(None, r(5.0, 15.0)), 0.5);
    }

    #[test]
    fn test_user_compatibility_cold_start_is_neutral() {
        let extractor = FeatureExtractor::default();
        assert_eq!(extractor.user_compatibility(None), 0.5);

        let new_user = OwnerStats {
            completed_exchanges: 0,
            completion_rate: Some(0.0),
            rating: Some(1.0),
        };
        assert_eq!(extractor.user_compatibility(Some(&new_user)), 0.5);

        let veteran = OwnerStats {
            completed_exchanges: 45,
            completion_rate: Some(1.0),
            rating: Some(5.0),
        };
        let score = extractor.user_compatibility(Some(&veteran));
        assert!(score > 0.9 && score <= 1.0);
    }

    #[test]
    fn test_urgency_takes_the_higher_level() {
        let extractor = FeatureExtractor::default();
        let mut a = listing(1, ExchangeType::Give, "books");
        let mut b = listing(2, ExchangeType::Request, "books");
        a.urgency = Some(1);
        b.urgency = Some(9);
        assert_eq!(extractor.extract(&a, &b).urgency, 1.0);

        b.urgency = None;
        assert!((extractor.extract(&a, &b).urgency - 1.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_impact_scale_only_grows() {
        let scale = ImpactScale::new(25.0);
        assert_eq!(scale.observe(10.0), 25.0);
        assert_eq!(scale.observe(80.0), 80.0);
        assert_eq!(scale.observe(40.0), 80.0);
        assert_eq!(scale.observe(f64::NAN), 80.0);
        assert_eq!(scale.ceiling(), 80.0);
    }

    #[test]
    fn test_environmental_impact_scaled_to_ceiling() {
        let extractor = FeatureExtractor::default().with_impact_ceiling(100.0);
        let mut a = listing(1, ExchangeType::Give, "books");
        let mut b = listing(2, ExchangeType::Request, "books");
        assert_eq!(extractor.extract(&a, &b).environmental_impact, 0.5);

        a.co2_saved_kg = Some(30.0);
        b.co2_saved_kg = Some(20.0);
        assert!((extractor.extract(&a, &b).environmental_impact - 0.5).abs() < 1e-9);

        a.co2_saved_kg = Some(500.0);
        assert_eq!(extractor.extract(&a, &b).environmental_impact, 1.0);
    }
}
