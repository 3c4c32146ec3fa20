// Model exports
pub mod domain;
pub mod requests;
pub mod responses;

pub use domain::{
    Condition, Coordinates, ExchangeType, Feature, FeatureVector, Listing, ListingId,
    ListingPair, ListingStatus, Match, MatchEvent, MatchId, MatchState, OutcomeSample, OwnerId,
    OwnerStats, PartialWeights, Transition, ValueRange, WeightVector, Weights,
};
pub use requests::{
    CommitWeightsRequest, ProposeMatchesRequest, ProposeWeightsRequest, RecordEventRequest,
    RegenerateMatchesRequest, SuggestWeightsRequest,
};
pub use responses::{
    BulkRegenerateResponse, ErrorResponse, ExpireResponse, HealthResponse,
    ProposeMatchesResponse, ProposeWeightsResponse, RecordEventResponse, StatsResponse,
    SuggestWeightsResponse,
};
