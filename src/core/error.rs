use crate::core::repository::RepositoryError;
use crate::models::{ListingId, MatchEvent, MatchId, MatchState, WeightVector};
use thiserror::Error;

/// Errors reported by the matching engine
#[derive(Debug, Error)]
pub enum MatchingError {
    #[error("Invalid weights: {0}")]
    InvalidWeights(String),

    #[error("Insufficient data: {found} outcome samples, at least {required} required")]
    InsufficientData {
        found: usize,
        required: usize,
        /// Active weights, returned unchanged
        current: Box<WeightVector>,
    },

    #[error("Unknown listing: {0}")]
    UnknownListing(ListingId),

    #[error("Unknown match: {0}")]
    UnknownMatch(MatchId),

    #[error("Invalid transition: cannot apply '{event}' to a match in state '{from}'")]
    InvalidTransition { from: MatchState, event: MatchEvent },

    #[error("Unknown weight version: {0}")]
    UnknownWeightVersion(u64),

    #[error("Weight version conflict: next version is {expected}, got {found}")]
    VersionConflict { expected: u64, found: u64 },

    #[error("Weight version {version} could not be persisted: {reason}")]
    NotPersisted { version: u64, reason: String },

    #[error("Listing repository error: {0}")]
    Repository(#[from] RepositoryError),
}

impl MatchingError {
    /// Lift a repository failure, turning a missing listing into `UnknownListing`
    pub fn from_repository(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound(id) => MatchingError::UnknownListing(id),
            other => MatchingError::Repository(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, MatchingError>;
