use crate::core::repository::{ListingRepository, RepositoryError};
use crate::models::{ExchangeType, Listing, ListingId, OwnerId, OwnerStats};
use std::collections::{HashMap, HashSet};
use std::sync::{PoisonError, RwLock};

/// Listing source held entirely in memory
///
/// Used by tests and benchmarks, and handy for replaying exported listings.
#[derive(Debug, Default)]
pub struct InMemoryListingRepository {
    listings: RwLock<HashMap<ListingId, Listing>>,
    owner_stats: RwLock<HashMap<OwnerId, OwnerStats>>,
    unavailable: RwLock<HashSet<ListingId>>,
}

impl InMemoryListingRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_listings(listings: impl IntoIterator<Item = Listing>) -> Self {
        let repo = Self::new();
        for listing in listings {
            repo.insert(listing);
        }
        repo
    }

    pub fn insert(&self, listing: Listing) {
        self.listings
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(listing.id, listing);
    }

    pub fn set_owner_stats(&self, owner_id: OwnerId, stats: OwnerStats) {
        self.owner_stats
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(owner_id, stats);
    }

    /// Make lookups of `id` fail as if the upstream were down
    pub fn mark_unavailable(&self, id: ListingId) {
        self.unavailable
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id);
    }

    pub fn len(&self) -> usize {
        self.listings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ListingRepository for InMemoryListingRepository {
    async fn get_listing(&self, id: ListingId) -> Result<Listing, RepositoryError> {
        if self
            .unavailable
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&id)
        {
            return Err(RepositoryError::Upstream(format!("listing {} unavailable", id)));
        }

        self.listings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
            .ok_or(RepositoryError::NotFound(id))
    }

    async fn active_listings(
        &self,
        types: &[ExchangeType],
    ) -> Result<Vec<Listing>, RepositoryError> {
        let mut listings: Vec<Listing> = self
            .listings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|l| l.is_active() && types.contains(&l.exchange_type))
            .cloned()
            .collect();
        listings.sort_by_key(|l| l.id);
        Ok(listings)
    }

    async fn owner_stats(&self, owner_id: OwnerId) -> Result<Option<OwnerStats>, RepositoryError> {
        Ok(self
            .owner_stats
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&owner_id)
            .copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ListingStatus;
    use chrono::Utc;

    fn listing(id: u64, exchange_type: ExchangeType, status: ListingStatus) -> Listing {
        Listing {
            id,
            title: String::new(),
            exchange_type,
            category: None,
            condition: None,
            value_range: None,
            coordinates: None,
            urgency: None,
            co2_saved_kg: None,
            owner_id: id,
            owner_stats: None,
            status,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_active_listings_filters_type_and_status() {
        let repo = InMemoryListingRepository::with_listings([
            listing(3, ExchangeType::Request, ListingStatus::Active),
            listing(1, ExchangeType::Request, ListingStatus::Active),
            listing(2, ExchangeType::Give, ListingStatus::Active),
            listing(4, ExchangeType::Request, ListingStatus::Closed),
        ]);

        let active = repo.active_listings(&[ExchangeType::Request]).await.unwrap();
        let ids: Vec<u64> = active.iter().map(|l| l.id).collect();
        assert_eq!(ids, vec![1, 3]);
    }

    #[tokio::test]
    async fn test_unavailable_and_missing_listings() {
        let repo = InMemoryListingRepository::with_listings([listing(
            1,
            ExchangeType::Give,
            ListingStatus::Active,
        )]);
        repo.mark_unavailable(1);

        assert!(matches!(
            repo.get_listing(1).await,
            Err(RepositoryError::Upstream(_))
        ));
        assert!(matches!(
            repo.get_listing(9).await,
            Err(RepositoryError::NotFound(9))
        ));
    }
}
