//! Popularity and rating resolver.
//!
//! Decides how "popular" is evaluated for a request and, when an average
//! rating threshold applies, scans every candidate listing through the
//! rating provider to build an ID allow-list.
//!
//! The scan is all-or-nothing: either every candidate has been evaluated
//! (failed or timed-out lookups count as not qualifying) or the request was
//! cancelled and no allow-list is produced.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::criteria::FilterCriteria;
use super::order::OrderResolution;
use super::types::ListingId;
use crate::config::{ListingSettings, PopularityMode};
use crate::error::{ListingError, ListingResult};
use crate::store::{ListingStore, RatingProvider};

/// How popularity and rating filters apply to one request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PopularityPlan {
    /// Minimum view count, enforced as a metadata predicate.
    pub view_threshold: Option<i64>,
    /// Minimum average rating, enforced through a rating scan.
    pub rating_threshold: Option<f64>,
}

impl PopularityPlan {
    /// Plan popularity filtering for a request.
    ///
    /// Popularity applies when the caller asks for popular listings only or
    /// sorts by views. A search-form rating filter also needs a scan; when
    /// both ask for one, the higher threshold covers both.
    pub fn for_request(
        criteria: &FilterCriteria,
        order: &OrderResolution,
        settings: &ListingSettings,
    ) -> Self {
        let mut plan = Self::default();

        if criteria.popular_only || order.sorts_by_views() {
            let by_views = matches!(
                settings.popular_by,
                PopularityMode::ViewCount | PopularityMode::Both
            );
            let by_rating = matches!(
                settings.popular_by,
                PopularityMode::AverageRating | PopularityMode::Both
            );
            if by_views {
                plan.view_threshold = Some(settings.views_for_popular);
            }
            if by_rating {
                plan.rating_threshold = Some(settings.average_review_for_popular);
            }
        }

        if let Some(rating) = criteria.rating {
            plan.rating_threshold = Some(match plan.rating_threshold {
                Some(current) => current.max(rating),
                None => rating,
            });
        }

        plan
    }

    pub fn needs_scan(&self) -> bool {
        self.rating_threshold.is_some()
    }
}

/// Runs rating scans with bounded concurrency.
pub struct PopularityResolver {
    store: Arc<dyn ListingStore>,
    ratings: Arc<dyn RatingProvider>,
    concurrency: usize,
    timeout: Duration,
}

impl PopularityResolver {
    /// Create a resolver with explicit limits.
    pub fn new(
        store: Arc<dyn ListingStore>,
        ratings: Arc<dyn RatingProvider>,
        concurrency: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            ratings,
            concurrency: concurrency.max(1),
            timeout,
        }
    }

    /// Create a resolver using the configured scan limits.
    pub fn from_settings(
        store: Arc<dyn ListingStore>,
        ratings: Arc<dyn RatingProvider>,
        settings: &ListingSettings,
    ) -> Self {
        Self::new(
            store,
            ratings,
            settings.rating_scan_concurrency,
            settings.rating_timeout(),
        )
    }

    /// IDs of every published listing whose average rating meets `threshold`.
    pub async fn resolve(
        &self,
        threshold: f64,
        cancel: &CancellationToken,
    ) -> ListingResult<BTreeSet<ListingId>> {
        let candidates = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ListingError::Cancelled),
            ids = self.store.listing_ids() => ids?,
        };
        self.qualifying(candidates, threshold, cancel).await
    }

    /// Candidates whose average rating meets `threshold`.
    pub async fn qualifying(
        &self,
        candidates: Vec<ListingId>,
        threshold: f64,
        cancel: &CancellationToken,
    ) -> ListingResult<BTreeSet<ListingId>> {
        if cancel.is_cancelled() {
            return Err(ListingError::Cancelled);
        }

        let total = candidates.len();
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = JoinSet::new();

        for id in candidates {
            let ratings = Arc::clone(&self.ratings);
            let semaphore = Arc::clone(&semaphore);
            let timeout = self.timeout;
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok()?;
                match tokio::time::timeout(timeout, ratings.average_for(id)).await {
                    Ok(Ok(average)) => {
                        (average.is_finite() && average >= threshold).then_some(id)
                    }
                    Ok(Err(e)) => {
                        warn!(
                            listing_id = id,
                            error = %e,
                            "rating lookup failed; excluding listing"
                        );
                        None
                    }
                    Err(_) => {
                        warn!(
                            listing_id = id,
                            timeout_ms = timeout.as_millis() as u64,
                            "rating lookup timed out; excluding listing"
                        );
                        None
                    }
                }
            });
        }

        let mut qualifying = BTreeSet::new();
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tasks.abort_all();
                    debug!(candidates = total, "rating scan cancelled");
                    return Err(ListingError::Cancelled);
                }
                joined = tasks.join_next() => match joined {
                    None => break,
                    Some(Ok(Some(id))) => {
                        qualifying.insert(id);
                    }
                    Some(Ok(None)) => {}
                    Some(Err(e)) => {
                        warn!(error = %e, "rating lookup task failed; excluding listing");
                    }
                },
            }
        }

        debug!(
            candidates = total,
            qualifying = qualifying.len(),
            threshold,
            "rating scan complete"
        );
        Ok(qualifying)
    }
}
