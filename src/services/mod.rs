// Service exports
pub mod cache;
pub mod memory;
pub mod postgres;
pub mod wordpress;

pub use cache::{CacheError, CacheKey, CacheManager, CacheStats, CachedListingRepository};
pub use memory::InMemoryListingRepository;
pub use postgres::{ArchiveStats, PostgresClient, PostgresError};
pub use wordpress::{WordPressError, WordPressListingClient};
