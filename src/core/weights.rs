use crate::core::error::{MatchingError, Result};
use crate::models::{Feature, PartialWeights, WeightVector, Weights};
use chrono::Utc;
use std::sync::{PoisonError, RwLock};

/// Author recorded on the built-in version 0
pub const DEFAULT_AUTHOR: &str = "system-default";

/// Rescale `weights` so the entries sum to exactly 1.0
///
/// Rejects negative, non-finite and all-zero vectors.
pub fn normalize(weights: &Weights) -> Result<Weights> {
    for feature in Feature::ALL {
        let value = weights.get(feature);
        if !value.is_finite() {
            return Err(MatchingError::InvalidWeights(format!(
                "{} is not a finite number",
                feature
            )));
        }
        if value < 0.0 {
            return Err(MatchingError::InvalidWeights(format!(
                "{} is negative ({})",
                feature, value
            )));
        }
    }

    let sum = weights.sum();
    if sum <= f64::EPSILON {
        return Err(MatchingError::InvalidWeights(
            "all weights are zero".to_string(),
        ));
    }

    let mut normalized = Weights::zero();
    for feature in Feature::ALL {
        normalized.set(feature, weights.get(feature) / sum);
    }

    // Fold the floating point residue into the largest entry
    let residue = 1.0 - normalized.sum();
    if residue != 0.0 {
        let largest = Feature::ALL
            .iter()
            .copied()
            .max_by(|a, b| normalized.get(*a).total_cmp(&normalized.get(*b)))
            .unwrap_or(Feature::CategoryMatch);
        normalized.set(largest, normalized.get(largest) + residue);
    }

    Ok(normalized)
}

/// Versioned store of scoring weights
///
/// Version 0 is the default prior; every commit appends a new version.
/// Commits take the write lock, so they are serialized against each other
/// and against snapshot reads.
#[derive(Debug)]
pub struct WeightStore {
    versions: RwLock<Vec<WeightVector>>,
}

impl WeightStore {
    /// Create a store whose version 0 holds `defaults` (normalized)
    pub fn new(defaults: Weights) -> Result<Self> {
        let default_version = WeightVector {
            version: 0,
            weights: normalize(&defaults)?,
            author: DEFAULT_AUTHOR.to_string(),
            created_at: Utc::now(),
        };
        Ok(Self {
            versions: RwLock::new(vec![default_version]),
        })
    }

    /// Rebuild a store from persisted history
    ///
    /// Entries are ordered by version; a missing version 0 is filled in from
    /// `defaults`.
    pub fn from_history(defaults: Weights, mut history: Vec<WeightVector>) -> Result<Self> {
        history.sort_by_key(|v| v.version);
        history.dedup_by_key(|v| v.version);

        let store = Self::new(defaults)?;
        {
            let mut versions = store.versions.write().unwrap_or_else(PoisonError::into_inner);
            for entry in history {
                if entry.version == 0 {
                    versions[0] = entry;
                } else {
                    versions.push(entry);
                }
            }
        }
        Ok(store)
    }

    /// Snapshot of the active weight vector
    pub fn get_current(&self) -> WeightVector {
        let versions = self.versions.read().unwrap_or_else(PoisonError::into_inner);
        versions
            .last()
            .cloned()
            .unwrap_or_else(unreachable_default)
    }

    pub fn current_version(&self) -> u64 {
        self.get_current().version
    }

    /// Merge `partial` onto the current weights and normalize, without
    /// persisting anything
    pub fn propose(&self, partial: &PartialWeights) -> Result<Weights> {
        let current = self.get_current();
        normalize(&partial.apply_to(&current.weights))
    }

    /// Normalize and append `weights` as a new version
    pub fn commit(&self, weights: &Weights, author: &str) -> Result<WeightVector> {
        self.publish(self.stage(weights, author)?)
    }

    /// Build the next version without making it active
    ///
    /// Callers that persist versions write the staged entry first and
    /// [`publish`](Self::publish) it only once it is durable.
    pub fn stage(&self, weights: &Weights, author: &str) -> Result<WeightVector> {
        let normalized = normalize(weights)?;
        Ok(WeightVector {
            version: self.current_version() + 1,
            weights: normalized,
            author: author.to_string(),
            created_at: Utc::now(),
        })
    }

    /// Make a staged version active
    ///
    /// Fails with `VersionConflict` if another version was published since
    /// `entry` was staged.
    pub fn publish(&self, entry: WeightVector) -> Result<WeightVector> {
        let mut versions = self.versions.write().unwrap_or_else(PoisonError::into_inner);
        let expected = versions.last().map(|v| v.version + 1).unwrap_or(1);
        if entry.version != expected {
            return Err(MatchingError::VersionConflict {
                expected,
                found: entry.version,
            });
        }
        versions.push(entry.clone());

        tracing::info!("Committed weight version {} by {}", entry.version, entry.author);
        Ok(entry)
    }

    /// All versions, oldest first
    pub fn history(&self) -> Vec<WeightVector> {
        self.versions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn get_version(&self, version: u64) -> Option<WeightVector> {
        self.versions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|v| v.version == version)
            .cloned()
    }
}

// The version list is created non-empty and never shrinks.
fn unreachable_default() -> WeightVector {
    WeightVector {
        version: 0,
        weights: Weights::default(),
        author: DEFAULT_AUTHOR.to_string(),
        created_at: Utc::now(),
    }
}
