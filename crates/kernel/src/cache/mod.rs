//! In-process result cache with Moka.
//!
//! Stores finished listing pages keyed by a fingerprint of the composed
//! query. Callers consult it only when the query's cache decision allows.

use std::time::Duration;

use anyhow::{Context, Result};
use moka::future::Cache;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::config::ListingSettings;
use crate::listing::types::{CompoundQuery, ListingPage};

/// Default TTL (60 seconds).
const DEFAULT_TTL_SECS: u64 = 60;

/// Default maximum capacity.
const DEFAULT_MAX_CAPACITY: u64 = 10_000;

/// Listing page cache; a zero TTL disables it.
#[derive(Clone)]
pub struct ResultCache {
    local: Option<Cache<String, ListingPage>>,
}

impl Default for ResultCache {
    fn default() -> Self {
        Self::new(Duration::from_secs(DEFAULT_TTL_SECS), DEFAULT_MAX_CAPACITY)
    }
}

impl ResultCache {
    /// Create a cache with the given TTL and capacity.
    pub fn new(ttl: Duration, max_capacity: u64) -> Self {
        if ttl.is_zero() || max_capacity == 0 {
            return Self::disabled();
        }

        let local = Cache::builder()
            .max_capacity(max_capacity)
            .time_to_live(ttl)
            .build();

        Self {
            local: Some(local),
        }
    }

    pub fn from_settings(settings: &ListingSettings) -> Self {
        Self::new(
            Duration::from_secs(settings.cache_ttl_secs),
            settings.cache_max_capacity,
        )
    }

    /// A cache that never stores anything.
    pub fn disabled() -> Self {
        Self { local: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.local.is_some()
    }

    /// Hex SHA-256 of the query's canonical JSON form.
    pub fn fingerprint(query: &CompoundQuery) -> Result<String> {
        let bytes = serde_json::to_vec(query).context("failed to serialize listing query")?;
        Ok(hex::encode(Sha256::digest(&bytes)))
    }

    /// Get a cached page.
    pub async fn get(&self, key: &str) -> Option<ListingPage> {
        let page = self.local.as_ref()?.get(key).await;
        if page.is_some() {
            debug!(key = %key, "listing cache hit");
        }
        page
    }

    /// Store a page.
    pub async fn insert(&self, key: String, page: ListingPage) {
        if let Some(local) = &self.local {
            debug!(key = %key, total = page.total, "listing cache set");
            local.insert(key, page).await;
        }
    }

    /// Drop every cached page, e.g. after listings change.
    pub fn invalidate_all(&self) {
        if let Some(local) = &self.local {
            local.invalidate_all();
        }
    }
}
