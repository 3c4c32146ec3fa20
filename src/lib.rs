//! Exchange Match - matching engine for the environmental platform item exchange
//!
//! This library scores pairs of exchange listings on weighted compatibility
//! features, tracks each proposed match through its lifecycle, and learns
//! weight adjustments from completed and abandoned exchanges.

pub mod config;
pub mod core;
pub mod models;
pub mod routes;
pub mod services;

// Re-export commonly used types
pub use core::{
    ExchangeEngine, FeatureExtractor, LifecycleManager, Matcher, MatchingError, WeightOptimizer,
    WeightStore,
};
pub use models::{FeatureVector, Listing, Match, MatchEvent, MatchState, WeightVector, Weights};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_exports() {
        let store = WeightStore::new(Weights::default()).unwrap();
        assert_eq!(store.get_current().version, 0);
    }
}
