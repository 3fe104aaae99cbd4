//! Listing service for executing listing requests.
//!
//! Provides request-scoped orchestration:
//! - Ordering and popularity planning
//! - Rating scans (cancellable)
//! - Query composition
//! - Result caching

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::composer::{ComposedQuery, QueryComposer};
use super::criteria::ListingRequest;
use super::popularity::PopularityResolver;
use super::types::ListingPage;
use crate::cache::ResultCache;
use crate::config::ListingSettings;
use crate::error::{ListingError, ListingResult};
use crate::store::{ListingStore, RatingProvider};

/// Service for executing listing requests.
pub struct ListingService {
    store: Arc<dyn ListingStore>,
    popularity: PopularityResolver,
    cache: ResultCache,
    settings: Arc<ListingSettings>,
}

impl ListingService {
    /// Create a new ListingService with a cache configured from settings.
    pub fn new(
        store: Arc<dyn ListingStore>,
        ratings: Arc<dyn RatingProvider>,
        settings: ListingSettings,
    ) -> Self {
        let popularity = PopularityResolver::from_settings(store.clone(), ratings, &settings);
        let cache = ResultCache::from_settings(&settings);
        Self {
            store,
            popularity,
            cache,
            settings: Arc::new(settings),
        }
    }

    /// Replace the result cache.
    pub fn with_cache(mut self, cache: ResultCache) -> Self {
        self.cache = cache;
        self
    }

    pub fn settings(&self) -> &ListingSettings {
        &self.settings
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    pub fn composer(&self) -> QueryComposer<'_> {
        QueryComposer::new(&self.settings)
    }

    /// Compose a request, running the rating scan first when needed.
    pub async fn compose(
        &self,
        request: &ListingRequest,
        cancel: &CancellationToken,
    ) -> ListingResult<ComposedQuery> {
        let composer = self.composer();
        let plan = composer.plan(request);

        let rated = match plan.rating_threshold() {
            Some(threshold) => Some(self.popularity.resolve(threshold, cancel).await?),
            None => None,
        };

        Ok(composer.compose(request, rated.as_ref()))
    }

    /// Execute a listing request and return one page of IDs.
    pub async fn search(
        &self,
        request: &ListingRequest,
        cancel: &CancellationToken,
    ) -> ListingResult<ListingPage> {
        let ComposedQuery { query, cache } = self.compose(request, cancel).await?;
        let pagination = query.pagination;

        if query.ids.matches_nothing() {
            debug!("allow-list is empty, skipping execution");
            return Ok(ListingPage::empty(pagination.page, pagination.per_page));
        }

        let key = if cache.is_cacheable() && self.cache.is_enabled() {
            Some(ResultCache::fingerprint(&query)?)
        } else {
            None
        };

        if let Some(key) = &key
            && let Some(page) = self.cache.get(key).await
        {
            return Ok(page);
        }

        let page = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ListingError::Cancelled),
            page = self.store.execute(&query) => page?,
        };

        if let Some(key) = key {
            self.cache.insert(key, page.clone()).await;
        }

        Ok(page)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::config::PopularityMode;
    use crate::listing::criteria::{FilterCriteria, SortRequest};
    use crate::listing::types::{CompoundQuery, ListingId};
    use crate::store::{MemoryListing, MemoryListingStore, StaticRatingProvider};

    /// Counts executions of the wrapped store.
    struct Counting {
        inner: MemoryListingStore,
        executions: AtomicUsize,
    }

    #[async_trait]
    impl ListingStore for Counting {
        async fn listing_ids(&self) -> anyhow::Result<Vec<ListingId>> {
            self.inner.listing_ids().await
        }

        async fn execute(&self, query: &CompoundQuery) -> anyhow::Result<ListingPage> {
            self.executions.fetch_add(1, Ordering::SeqCst);
            self.inner.execute(query).await
        }
    }

    fn counting() -> Arc<Counting> {
        Arc::new(Counting {
            inner: MemoryListingStore::new(
                vec![
                    MemoryListing::new(1, "Alpha", 100),
                    MemoryListing::new(2, "Bravo", 200),
                ],
                Vec::new(),
            ),
            executions: AtomicUsize::new(0),
        })
    }

    fn request(sort: &str) -> ListingRequest {
        ListingRequest {
            sort: Some(SortRequest::Key(sort.to_string())),
            page: 1,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn cacheable_results_are_reused() {
        let store = counting();
        let service = ListingService::new(
            store.clone(),
            Arc::new(StaticRatingProvider::default()),
            ListingSettings::default(),
        );
        let cancel = CancellationToken::new();

        let first = service.search(&request("title-asc"), &cancel).await.unwrap();
        let second = service.search(&request("title-asc"), &cancel).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(store.executions.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn random_results_bypass_cache() {
        let store = counting();
        let service = ListingService::new(
            store.clone(),
            Arc::new(StaticRatingProvider::default()),
            ListingSettings::default(),
        );
        let cancel = CancellationToken::new();

        service.search(&request("rand"), &cancel).await.unwrap();
        service.search(&request("rand"), &cancel).await.unwrap();
        assert_eq!(store.executions.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn rating_scan_feeds_allow_list() {
        let store = counting();
        let settings = ListingSettings {
            popular_by: PopularityMode::AverageRating,
            ..Default::default()
        };
        let service = ListingService::new(
            store.clone(),
            Arc::new(StaticRatingProvider::new([(1, 4.5), (2, 3.0)])),
            settings,
        );
        let listing = ListingRequest {
            criteria: FilterCriteria {
                popular_only: true,
                ..Default::default()
            },
            page: 1,
            ..Default::default()
        };

        let page = service
            .search(&listing, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(page.ids, vec![1]);
    }

    /// Store whose queries always fail.
    struct Unavailable;

    #[async_trait]
    impl ListingStore for Unavailable {
        async fn listing_ids(&self) -> anyhow::Result<Vec<ListingId>> {
            anyhow::bail!("connection refused")
        }

        async fn execute(&self, _query: &CompoundQuery) -> anyhow::Result<ListingPage> {
            anyhow::bail!("connection refused")
        }
    }

    #[tokio::test]
    async fn store_failures_surface_as_store_errors() {
        let service = ListingService::new(
            Arc::new(Unavailable),
            Arc::new(StaticRatingProvider::default()),
            ListingSettings::default(),
        );

        let err = service
            .search(&request("title-asc"), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ListingError::Store(_)));
        assert!(err.to_string().contains("connection refused"));
    }

    #[tokio::test]
    async fn cancelled_before_execution() {
        let store = counting();
        let service = ListingService::new(
            store.clone(),
            Arc::new(StaticRatingProvider::default()),
            ListingSettings::default(),
        );
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = service.search(&request("title-asc"), &cancel).await;
        assert!(result.unwrap_err().is_cancelled());
        assert_eq!(store.executions.load(Ordering::SeqCst), 0);
    }
}
