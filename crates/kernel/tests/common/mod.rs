#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Common test utilities for integration tests.
//!
//! Builds a small directory (terms, listings and ratings) served by the
//! in-memory executor, and helpers that run requests through the real
//! `ListingService`.

#![allow(dead_code)]

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use waymark_kernel::config::ListingSettings;
use waymark_kernel::listing::types::Taxonomy;
use waymark_kernel::listing::{ListingPage, ListingRequest, ListingService, RequestParams};
use waymark_kernel::store::{MemoryListing, MemoryListingStore, StaticRatingProvider, TermNode};

pub const FOOD: i64 = 10;
pub const CAFES: i64 = 11;
pub const BAKERIES: i64 = 12;
pub const NYC: i64 = 20;
pub const BROOKLYN: i64 = 21;
pub const WIFI: i64 = 30;
pub const PARKING: i64 = 31;

/// Category, location and tag terms; cafes and bakeries sit under food,
/// Brooklyn under NYC.
pub fn terms() -> Vec<TermNode> {
    vec![
        TermNode::new(FOOD, Taxonomy::Category, "food"),
        TermNode::new(CAFES, Taxonomy::Category, "cafes").child_of(FOOD),
        TermNode::new(BAKERIES, Taxonomy::Category, "bakeries").child_of(FOOD),
        TermNode::new(NYC, Taxonomy::Location, "nyc"),
        TermNode::new(BROOKLYN, Taxonomy::Location, "brooklyn").child_of(NYC),
        TermNode::new(WIFI, Taxonomy::Tag, "wifi"),
        TermNode::new(PARKING, Taxonomy::Tag, "parking"),
    ]
}

/// Six listings: 4 is expired, 6 is a draft.
pub fn listings() -> Vec<MemoryListing> {
    vec![
        MemoryListing::new(1, "Alpha Cafe", 100)
            .term(CAFES)
            .term(BROOKLYN)
            .term(WIFI)
            .field("_price", "15")
            .field("_atbdp_post_views_count", "10")
            .field("_featured", "1")
            .field("_phone", "555-1000")
            .field("_website", "https://alphacafe.example")
            .field("_manual_lat", "40.6782")
            .field("_manual_lng", "-73.9442"),
        MemoryListing::new(2, "Bravo Bakery", 200)
            .term(BAKERIES)
            .term(NYC)
            .field("_price", "40")
            .field("_atbdp_post_views_count", "2")
            .field("_phone2", "555-2000")
            .field("_manual_lat", "40.7831")
            .field("_manual_lng", "-73.9712"),
        MemoryListing::new(3, "Charlie Diner", 300)
            .term(FOOD)
            .term(PARKING)
            .field("_price", "8")
            .field("_atbdp_post_views_count", "7")
            .field("_address", "12 Main St")
            .field("_manual_lat", "39.9526")
            .field("_manual_lng", "-75.1652"),
        MemoryListing::new(4, "Delta Deli", 400)
            .term(NYC)
            .term(WIFI)
            .field("_atbdp_post_views_count", "0")
            .field("_listing_status", "expired"),
        MemoryListing::new(5, "Echo Espresso", 500)
            .term(CAFES)
            .field("_price", "25")
            .field("_atbdp_post_views_count", "5")
            .field("_featured", "1")
            .field("color", "red, blue")
            .field("_zip", "11201"),
        MemoryListing::new(6, "Foxtrot Draft", 600)
            .term(CAFES)
            .status("draft"),
    ]
}

/// Average ratings: 1 → 5.0, 2 → 2.0, 3 → 4.0, 5 → 4.6; others none.
pub fn ratings() -> StaticRatingProvider {
    StaticRatingProvider::new([(1, 5.0), (2, 2.0), (3, 4.0), (5, 4.6)])
}

pub fn store() -> MemoryListingStore {
    MemoryListingStore::new(listings(), terms())
}

/// Service over the fixture directory.
pub fn service(settings: ListingSettings) -> ListingService {
    ListingService::new(Arc::new(store()), Arc::new(ratings()), settings)
}

/// Run a listing archive request.
pub async fn browse(service: &ListingService, atts: &str, request: &str) -> ListingPage {
    let request = ListingRequest::from_shortcode(
        &RequestParams::from_query_string(atts),
        &RequestParams::from_query_string(request),
    );
    service
        .search(&request, &CancellationToken::new())
        .await
        .unwrap()
}

/// Run a search-form request.
pub async fn search(service: &ListingService, query: &str) -> ListingPage {
    let request = ListingRequest::from_search(&RequestParams::from_query_string(query));
    service
        .search(&request, &CancellationToken::new())
        .await
        .unwrap()
}
