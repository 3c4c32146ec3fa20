use crate::models::domain::{ListingId, PartialWeights, Weights};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Request to propose matches for a listing
///
/// The body is optional; an empty object uses the configured default count.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct ProposeMatchesRequest {
    #[validate(range(min = 1, max = 100))]
    #[serde(default, alias = "topK")]
    pub top_k: Option<usize>,
}

/// Request to record a lifecycle event on a match
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RecordEventRequest {
    #[validate(length(min = 1))]
    #[serde(alias = "eventType", alias = "event_type")]
    pub event: String,
}

/// Request to preview a partial weight update
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposeWeightsRequest {
    #[serde(flatten)]
    pub weights: PartialWeights,
}

/// Request to commit a full weight vector
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitWeightsRequest {
    pub weights: Weights,
}

/// Request for optimizer suggestions
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct SuggestWeightsRequest {
    #[validate(range(min = 1, max = 3650))]
    #[serde(default, alias = "lookbackDays")]
    pub lookback_days: Option<i64>,
}

/// Request to regenerate matches in bulk
///
/// Without `listing_ids` every active listing is regenerated.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct RegenerateMatchesRequest {
    #[validate(length(min = 1, max = 10000))]
    #[serde(default, alias = "listingIds")]
    pub listing_ids: Option<Vec<ListingId>>,
}
