use crate::models::{ExchangeType, Listing, ListingId, OwnerId, OwnerStats};
use std::future::Future;
use thiserror::Error;

/// Errors raised by a listing source
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Listing not found: {0}")]
    NotFound(ListingId),

    #[error("Upstream request failed: {0}")]
    Upstream(String),

    #[error("Invalid response format: {0}")]
    InvalidResponse(String),
}

/// Read access to exchange listings owned by the surrounding application.
///
/// The engine never writes through this port.
pub trait ListingRepository: Send + Sync {
    /// Fetch a single listing by id
    fn get_listing(
        &self,
        id: ListingId,
    ) -> impl Future<Output = Result<Listing, RepositoryError>> + Send;

    /// Enumerate active listings whose exchange type is one of `types`
    fn active_listings(
        &self,
        types: &[ExchangeType],
    ) -> impl Future<Output = Result<Vec<Listing>, RepositoryError>> + Send;

    /// Historical rating and completion record of a listing owner.
    ///
    /// `None` means the owner has no exchange history yet.
    fn owner_stats(
        &self,
        owner_id: OwnerId,
    ) -> impl Future<Output = Result<Option<OwnerStats>, RepositoryError>> + Send;
}
