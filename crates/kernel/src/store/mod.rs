//! Listing executors and rating providers.
//!
//! Provides traits and implementations for running composed queries
//! against PostgreSQL or an in-memory listing set.

mod memory;
mod postgres;

pub use memory::{MemoryListing, MemoryListingStore, StaticRatingProvider, TermNode};
pub use postgres::{PgListingStore, PgRatingProvider};

use anyhow::Result;
use async_trait::async_trait;

use crate::listing::types::{CompoundQuery, ListingId, ListingPage};

/// Query executor trait.
#[async_trait]
pub trait ListingStore: Send + Sync {
    /// IDs of every published listing; the candidate set of a rating scan.
    async fn listing_ids(&self) -> Result<Vec<ListingId>>;

    /// Execute a composed query and return one page of IDs.
    async fn execute(&self, query: &CompoundQuery) -> Result<ListingPage>;
}

/// Source of per-listing average ratings.
#[async_trait]
pub trait RatingProvider: Send + Sync {
    /// Average review rating for a listing; 0 when it has no reviews.
    async fn average_for(&self, id: ListingId) -> Result<f64>;
}
