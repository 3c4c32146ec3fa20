use crate::core::engine::{BulkFailure, BulkReport};
use crate::core::optimizer::Rationale;
use crate::models::domain::{ListingId, Match, MatchId, MatchState, WeightVector, Weights};
use crate::services::postgres::ArchiveStats;
use serde::{Deserialize, Serialize};

/// Response for the propose matches endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposeMatchesResponse {
    pub listing_id: ListingId,
    pub match_ids: Vec<MatchId>,
    pub matches: Vec<Match>,
}

impl ProposeMatchesResponse {
    pub fn new(listing_id: ListingId, matches: Vec<Match>) -> Self {
        Self {
            listing_id,
            match_ids: matches.iter().map(|m| m.id).collect(),
            matches,
        }
    }
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub weights_version: u64,
    pub active_matches: usize,
    pub archived_matches: usize,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Admin overview of the in-memory lifecycle and the persisted archive
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsResponse {
    pub weights_version: u64,
    pub active_matches: usize,
    pub archived_matches: usize,
    /// Absent when no database is configured or it could not be queried
    pub archive: Option<ArchiveStats>,
}

/// Error response
///
/// `current_weights` is only set when the optimizer lacked data, so callers
/// can keep showing the weights still in force.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub status_code: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_weights: Option<WeightVector>,
}

/// Record event response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordEventResponse {
    pub match_id: MatchId,
    pub state: MatchState,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl From<&Match> for RecordEventResponse {
    fn from(m: &Match) -> Self {
        Self {
            match_id: m.id,
            state: m.state,
            updated_at: m.updated_at,
        }
    }
}

/// Preview of a partial weight update; nothing is committed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposeWeightsResponse {
    pub current: WeightVector,
    pub proposed: Weights,
}

/// Optimizer recommendation together with the weights it was derived from
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuggestWeightsResponse {
    pub current: WeightVector,
    pub proposed: Weights,
    pub lookback_days: i64,
    pub rationale: Rationale,
}

/// Bulk regeneration summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkRegenerateResponse {
    pub processed: usize,
    pub proposed: usize,
    pub failures: Vec<BulkFailure>,
    pub interrupted: bool,
}

impl From<&BulkReport> for BulkRegenerateResponse {
    fn from(report: &BulkReport) -> Self {
        Self {
            processed: report.processed,
            proposed: report.proposed.iter().map(|(_, ids)| ids.len()).sum(),
            failures: report.failures.clone(),
            interrupted: report.interrupted,
        }
    }
}

/// Expiry sweep summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpireResponse {
    pub expired: usize,
    pub match_ids: Vec<MatchId>,
}
