// Core algorithm exports
pub mod distance;
pub mod engine;
pub mod error;
pub mod features;
pub mod filters;
pub mod lifecycle;
pub mod matcher;
pub mod optimizer;
pub mod repository;
pub mod scoring;
pub mod weights;

pub use distance::{haversine_distance, listing_distance_km};
pub use engine::{BulkFailure, BulkReport, ExchangeEngine};
pub use error::MatchingError;
pub use features::{FeatureConfig, FeatureExtractor, ImpactScale};
pub use filters::{is_eligible_candidate, CandidateExclusions};
pub use lifecycle::{next_state, LifecycleConfig, LifecycleManager};
pub use matcher::{MatchResult, Matcher, MatchingConfig};
pub use optimizer::{
    OptimizerConfig, Rationale, WeightAdjustment, WeightOptimizer, WeightSuggestion,
};
pub use repository::{ListingRepository, RepositoryError};
pub use scoring::{calculate_score, explain};
pub use weights::{normalize, WeightStore};
