use crate::models::{Listing, ListingId};
use std::collections::HashSet;

/// Listings that must not be proposed to a source listing
#[derive(Debug, Clone, Default)]
pub struct CandidateExclusions {
    /// Candidates whose pair with the source already reached a terminal state
    pub listing_ids: HashSet<ListingId>,
}

impl CandidateExclusions {
    pub fn new(listing_ids: impl IntoIterator<Item = ListingId>) -> Self {
        Self {
            listing_ids: listing_ids.into_iter().collect(),
        }
    }
}

/// Check whether `candidate` may be paired with `source` at all
///
/// This is the eligibility stage of the matching pipeline: the candidate has
/// to be active, belong to somebody else, have a compatible exchange type and
/// not already have a closed match with the source.
#[inline]
pub fn is_eligible_candidate(
    source: &Listing,
    candidate: &Listing,
    exclusions: &CandidateExclusions,
) -> bool {
    if candidate.id == source.id || !candidate.is_active() {
        return false;
    }

    // Never match a user with their own listing
    if candidate.owner_id == source.owner_id {
        return false;
    }

    if !source.exchange_type.is_compatible_with(candidate.exchange_type) {
        return false;
    }

    !exclusions.listing_ids.contains(&candidate.id)
}
