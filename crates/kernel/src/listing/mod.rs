//! Listing query engine module.
//!
//! This module provides:
//! - Criteria: typed filter criteria parsed from request parameters
//! - Predicate/Order/Popularity: the pieces of a composed query
//! - QueryComposer: combines them into a `CompoundQuery`
//! - ListingQueryBuilder: SeaQuery-based SQL generation
//! - ListingService: executes requests with rating scans and caching

pub mod composer;
pub mod criteria;
mod listing_service;
pub mod order;
pub mod params;
pub mod popularity;
pub mod predicate;
pub mod query_builder;
pub mod types;

pub use composer::{ComposedQuery, CompositionPlan, MAX_PER_PAGE, QueryComposer};
pub use criteria::{FilterCriteria, ListingRequest, QueryMode, SortRequest};
pub use listing_service::ListingService;
pub use order::OrderResolution;
pub use params::RequestParams;
pub use popularity::{PopularityPlan, PopularityResolver};
pub use query_builder::ListingQueryBuilder;
pub use types::{
    CacheDecision, CompoundQuery, IdFilter, ListingId, ListingPage, OrderKey, OrderPlan,
    Predicate, PromotionPolicy, SortSpec,
};
