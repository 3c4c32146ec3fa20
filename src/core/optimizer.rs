use crate::core::error::{MatchingError, Result};
use crate::core::weights::normalize;
use crate::models::{Feature, OutcomeSample, WeightVector, Weights};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    /// Minimum number of closed matches in the lookback window
    pub min_samples: usize,
    /// How far a unit of discriminative signal moves a weight
    pub learning_rate: f64,
    pub default_lookback_days: i64,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            min_samples: 20,
            learning_rate: 0.5,
            default_lookback_days: 90,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Increase,
    Decrease,
    Unchanged,
}

/// Audit entry explaining how one feature's weight moved
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightAdjustment {
    pub feature: Feature,
    pub previous: f64,
    pub proposed: f64,
    pub delta: f64,
    /// Mean feature value among completed matches minus the mean among
    /// declined or expired ones
    pub signal: f64,
    pub direction: Direction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rationale {
    pub positive_samples: usize,
    pub negative_samples: usize,
    pub based_on_version: u64,
    /// Set when every shifted weight clamped to zero and `current` was kept
    #[serde(default)]
    pub kept_current: bool,
    pub adjustments: Vec<WeightAdjustment>,
}

/// A recommended weight vector; never applied without an explicit commit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightSuggestion {
    pub proposed: Weights,
    pub rationale: Rationale,
}

/// Learns weight adjustments from archived match outcomes
#[derive(Debug, Clone, Default)]
pub struct WeightOptimizer {
    config: OptimizerConfig,
}

impl WeightOptimizer {
    pub fn new(config: OptimizerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    /// Propose new weights from `samples` relative to `current`
    ///
    /// Completed matches are positives; declined and expired ones are
    /// negatives. Too few samples, or a window without both classes, yields
    /// `InsufficientData` carrying `current` untouched. If the outcomes push
    /// every weight to zero the current vector is recommended unchanged.
    pub fn suggest(
        &self,
        current: &WeightVector,
        samples: &[OutcomeSample],
    ) -> Result<WeightSuggestion> {
        let (positives, negatives): (Vec<&OutcomeSample>, Vec<&OutcomeSample>) = samples
            .iter()
            .filter(|s| s.final_state.is_terminal())
            .partition(|s| s.is_positive());

        let found = positives.len() + negatives.len();
        if found < self.config.min_samples || positives.is_empty() || negatives.is_empty() {
            tracing::info!(
                "Not enough outcomes to optimize weights ({} positive, {} negative, {} required)",
                positives.len(),
                negatives.len(),
                self.config.min_samples
            );
            return Err(MatchingError::InsufficientData {
                found,
                required: self.config.min_samples.max(2),
                current: Box::new(current.clone()),
            });
        }

        let mut shifted = Weights::zero();
        let mut signals = Vec::with_capacity(Feature::ALL.len());
        for feature in Feature::ALL {
            let signal = mean(&positives, feature) - mean(&negatives, feature);
            let previous = current.weights.get(feature);
            shifted.set(feature, (previous + self.config.learning_rate * signal).max(0.0));
            signals.push((feature, signal));
        }

        let (proposed, kept_current) = match normalize(&shifted) {
            Ok(proposed) => (proposed, false),
            Err(e) => {
                tracing::warn!(
                    "Outcome signals zeroed every weight ({}), keeping weights v{}",
                    e,
                    current.version
                );
                (current.weights, true)
            }
        };

        let adjustments = signals
            .into_iter()
            .map(|(feature, signal)| {
                let previous = current.weights.get(feature);
                let next = proposed.get(feature);
                let delta = next - previous;
                let direction = if delta > 1e-9 {
                    Direction::Increase
                } else if delta < -1e-9 {
                    Direction::Decrease
                } else {
                    Direction::Unchanged
                };
                WeightAdjustment {
                    feature,
                    previous,
                    proposed: next,
                    delta,
                    signal,
                    direction,
                }
            })
            .collect();

        Ok(WeightSuggestion {
            proposed,
            rationale: Rationale {
                positive_samples: positives.len(),
                negative_samples: negatives.len(),
                based_on_version: current.version,
                kept_current,
                adjustments,
            },
        })
    }
}

fn mean(samples: &[&OutcomeSample], feature: Feature) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    samples.iter().map(|s| s.features.get(feature)).sum::<f64>() / samples.len() as f64
}
