#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Listing service tests.
//!
//! Runs browse and search requests end to end through the listing service
//! and the in-memory executor.

mod common;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use waymark_kernel::config::{ListingSettings, PopularityMode};
use waymark_kernel::listing::{ListingRequest, ListingService, RequestParams};
use waymark_kernel::store::{MemoryListingStore, StaticRatingProvider};

use common::{browse, search, service};

// -------------------------------------------------------------------------
// Taxonomy
// -------------------------------------------------------------------------

#[tokio::test]
async fn test_no_filters_excludes_expired_and_drafts() {
    let service = service(ListingSettings::default());
    let page = browse(&service, "", "").await;

    assert_eq!(page.ids, vec![1, 2, 3, 5]);
    assert_eq!(page.total, 4);
}

#[tokio::test]
async fn test_category_includes_descendants() {
    let service = service(ListingSettings::default());
    let page = browse(&service, "category=food", "").await;
    assert_eq!(page.ids, vec![1, 2, 3, 5]);

    let page = browse(&service, "category=cafes", "").await;
    assert_eq!(page.ids, vec![1, 5]);
}

#[tokio::test]
async fn test_category_and_tag_must_both_match() {
    let service = service(ListingSettings::default());
    let page = browse(&service, "category=food&tag=wifi", "").await;
    assert_eq!(page.ids, vec![1]);
}

#[tokio::test]
async fn test_location_by_term_id() {
    let service = service(ListingSettings::default());
    let page = search(&service, &format!("in_loc={}", common::NYC)).await;
    // Title order: Alpha Cafe (Brooklyn), Bravo Bakery (NYC)
    assert_eq!(page.ids, vec![1, 2]);
}

#[tokio::test]
async fn test_unknown_slug_matches_nothing() {
    let service = service(ListingSettings::default());
    let page = browse(&service, "category=museums", "").await;
    assert!(page.ids.is_empty());
    assert_eq!(page.total, 0);
}

// -------------------------------------------------------------------------
// Featured and popular
// -------------------------------------------------------------------------

#[tokio::test]
async fn test_featured_only() {
    let service = service(ListingSettings::default());
    let page = browse(&service, "featured_only=yes", "").await;
    assert_eq!(page.ids, vec![1, 5]);
}

#[tokio::test]
async fn test_popular_by_view_count() {
    let service = service(ListingSettings::default());
    let page = browse(&service, "popular_only=yes", "").await;
    assert_eq!(page.ids, vec![1, 3, 5]);
}

#[tokio::test]
async fn test_popular_by_rating_intersects_ids() {
    let settings = ListingSettings {
        popular_by: PopularityMode::AverageRating,
        ..Default::default()
    };
    let service = service(settings);

    let page = browse(&service, "popular_only=yes", "").await;
    assert_eq!(page.ids, vec![1, 3, 5]);

    let page = browse(&service, "popular_only=yes&ids=1,2,3", "").await;
    assert_eq!(page.ids, vec![1, 3]);
}

#[tokio::test]
async fn test_popular_by_both() {
    let settings = ListingSettings {
        popular_by: PopularityMode::Both,
        views_for_popular: 6,
        ..Default::default()
    };
    let service = service(settings);
    // Views >= 6: 1, 3; rating >= 4: 1, 3, 5
    let page = browse(&service, "popular_only=yes", "").await;
    assert_eq!(page.ids, vec![1, 3]);
}

#[tokio::test]
async fn test_views_sort_applies_popularity() {
    let service = service(ListingSettings::default());
    let page = browse(&service, "", "sort=views-desc").await;
    assert_eq!(page.ids, vec![1, 3, 5]);
}

#[tokio::test]
async fn test_search_by_rating() {
    let service = service(ListingSettings::default());
    let page = search(&service, "search_by_rating=4.5").await;
    assert_eq!(page.ids, vec![1, 5]);
}

#[tokio::test]
async fn test_empty_directory_rating_scan_matches_nothing() {
    let settings = ListingSettings {
        popular_by: PopularityMode::AverageRating,
        ..Default::default()
    };
    let service = ListingService::new(
        Arc::new(MemoryListingStore::new(Vec::new(), Vec::new())),
        Arc::new(StaticRatingProvider::default()),
        settings,
    );
    let page = browse(&service, "popular_only=yes", "").await;
    assert!(page.ids.is_empty());
    assert_eq!(page.total, 0);
}

// -------------------------------------------------------------------------
// Search form fields
// -------------------------------------------------------------------------

#[tokio::test]
async fn test_price_range() {
    let service = service(ListingSettings::default());
    let page = search(&service, "price[0]=10&price[1]=30").await;
    assert_eq!(page.ids, vec![1, 5]);

    let page = search(&service, "price[0]=20").await;
    assert_eq!(page.ids, vec![2, 5]);

    let page = search(&service, "price[1]=10").await;
    assert_eq!(page.ids, vec![3]);
}

#[tokio::test]
async fn test_phone_matches_either_number() {
    let service = service(ListingSettings::default());
    let page = search(&service, "phone=555").await;
    assert_eq!(page.ids, vec![1, 2]);
}

#[tokio::test]
async fn test_contact_fields() {
    let service = service(ListingSettings::default());
    assert_eq!(search(&service, "website=ALPHACAFE").await.ids, vec![1]);
    assert_eq!(search(&service, "zip_code=112").await.ids, vec![5]);
    assert_eq!(search(&service, "address=main").await.ids, vec![3]);
}

#[tokio::test]
async fn test_custom_field_values() {
    let service = service(ListingSettings::default());
    let page = search(&service, "custom_field[color][]=green&custom_field[color][]=blue").await;
    assert_eq!(page.ids, vec![5]);

    // Scalar values of untyped fields must match exactly
    let page = search(&service, "custom_field[color]=red").await;
    assert!(page.ids.is_empty());
}

#[tokio::test]
async fn test_free_text() {
    let service = service(ListingSettings::default());
    assert_eq!(search(&service, "q=espresso").await.ids, vec![5]);
    assert_eq!(search(&service, "q=alpha+cafe").await.ids, vec![1]);
}

#[tokio::test]
async fn test_geo_radius() {
    let service = service(ListingSettings::default());
    let page = search(&service, "miles=10&cityLat=40.7128&cityLng=-74.0060").await;
    assert_eq!(page.ids, vec![1, 2]);
}

#[tokio::test]
async fn test_geo_drops_address_filter() {
    let service = service(ListingSettings::default());
    let page = search(
        &service,
        "miles=10&cityLat=40.7128&cityLng=-74.0060&address=nowhere",
    )
    .await;
    assert_eq!(page.ids, vec![1, 2]);
}

// -------------------------------------------------------------------------
// Ordering and paging
// -------------------------------------------------------------------------

#[tokio::test]
async fn test_featured_promotion_with_price_sort() {
    let settings = ListingSettings {
        enable_featured_listing: true,
        ..Default::default()
    };
    let service = service(settings);
    let page = browse(&service, "", "sort=price-desc").await;
    assert_eq!(page.ids, vec![5, 1, 2, 3]);
}

#[tokio::test]
async fn test_random_keeps_featured_first() {
    let settings = ListingSettings {
        enable_featured_listing: true,
        ..Default::default()
    };
    let service = service(settings);
    for _ in 0..5 {
        let page = browse(&service, "orderby=rand", "").await;
        let mut head = page.ids[..2].to_vec();
        head.sort_unstable();
        assert_eq!(head, vec![1, 5]);
        assert_eq!(page.total, 4);
    }
}

#[tokio::test]
async fn test_unrecognized_sort_uses_default() {
    let service = service(ListingSettings::default());
    let page = browse(&service, "", "sort=rating-desc").await;
    assert_eq!(page.ids, vec![1, 2, 3, 5]);
}

#[tokio::test]
async fn test_pagination() {
    let service = service(ListingSettings::default());
    let page = browse(&service, "listings_per_page=3", "paged=2").await;

    assert_eq!(page.ids, vec![5]);
    assert_eq!(page.total, 4);
    assert_eq!(page.total_pages, 2);
    assert!(page.has_prev);
    assert!(!page.has_next);
}

#[tokio::test]
async fn test_cancelled_request() {
    let service = service(ListingSettings::default());
    let request = ListingRequest::from_search(&RequestParams::from_query_string("q=alpha"));
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = service.search(&request, &cancel).await.unwrap_err();
    assert!(err.is_cancelled());
}
