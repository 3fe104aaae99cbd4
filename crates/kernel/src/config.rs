//! Configuration loaded from environment variables and a settings file.

use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::listing::types::{DistanceUnit, PromotionPolicy, SortDirection, SortField, SortSpec};

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL connection URL. Required only for executing queries.
    pub database_url: Option<String>,

    /// Maximum database connections in pool (default: 10).
    pub database_max_connections: u32,

    /// Path to the listing settings TOML file (LISTING_SETTINGS).
    pub settings_path: Option<PathBuf>,

    /// Listing query settings.
    pub listings: ListingSettings,
}

/// Paging defaults for the search result page.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SearchDefaults {
    pub per_page: u32,
    pub paginate: bool,
}

impl Default for SearchDefaults {
    fn default() -> Self {
        Self {
            per_page: 6,
            paginate: true,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let database_url = env::var("DATABASE_URL").ok().filter(|v| !v.is_empty());

        let database_max_connections = env::var("DATABASE_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .context("DATABASE_MAX_CONNECTIONS must be a valid u32")?;

        let settings_path = env::var("LISTING_SETTINGS").ok().map(PathBuf::from);

        let listings = match &settings_path {
            Some(path) => ListingSettings::from_file(path)?,
            None => ListingSettings::default(),
        };

        Ok(Self {
            database_url,
            database_max_connections,
            settings_path,
            listings,
        })
    }
}

/// How listings qualify as popular.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PopularityMode {
    /// View count at or above `views_for_popular`.
    #[default]
    ViewCount,
    /// Average review at or above `average_review_for_popular`.
    AverageRating,
    /// Both conditions.
    #[serde(alias = "both_view_rating")]
    Both,
}

/// Custom field input types that decide scalar match operators.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Text,
    Textarea,
    Url,
    Number,
    Select,
    Radio,
    Checkbox,
    Date,
}

impl FieldType {
    /// Free-text inputs match by substring.
    pub fn is_free_text(&self) -> bool {
        matches!(self, FieldType::Text | FieldType::Textarea | FieldType::Url)
    }
}

/// Ordering and paging defaults for one page kind.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PageDefaults {
    pub order_by: String,
    pub order: String,
    pub per_page: u32,
    pub paginate: bool,
}

impl Default for PageDefaults {
    fn default() -> Self {
        Self {
            order_by: "date".to_string(),
            order: "asc".to_string(),
            per_page: 6,
            paginate: true,
        }
    }
}

impl PageDefaults {
    /// Configured default sort; unparseable settings fall back to latest first.
    pub fn default_sort(&self) -> SortSpec {
        SortSpec::from_pair(&self.order_by, &self.order)
            .unwrap_or(SortSpec::field(SortField::Date, SortDirection::Desc))
    }
}

/// Listing query settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ListingSettings {
    /// Content type holding listings.
    pub post_type: String,

    /// Listing archive defaults.
    pub browse: PageDefaults,

    /// Search result page paging; search results order by title ascending.
    pub search: SearchDefaults,

    /// Sort featured listings first.
    pub enable_featured_listing: bool,

    pub popular_by: PopularityMode,

    /// Minimum view count for a popular listing.
    pub views_for_popular: i64,

    /// Minimum average rating for a popular listing.
    pub average_review_for_popular: f64,

    pub radius_search_unit: DistanceUnit,

    /// Concurrent rating lookups during a rating scan.
    pub rating_scan_concurrency: usize,

    /// Per-lookup timeout in milliseconds.
    pub rating_timeout_ms: u64,

    /// Result cache TTL in seconds; 0 disables the cache.
    pub cache_ttl_secs: u64,

    pub cache_max_capacity: u64,

    /// Custom field input types keyed by field key.
    pub custom_field_types: BTreeMap<String, FieldType>,
}

impl Default for ListingSettings {
    fn default() -> Self {
        Self {
            post_type: "at_biz_dir".to_string(),
            browse: PageDefaults::default(),
            search: SearchDefaults::default(),
            enable_featured_listing: false,
            popular_by: PopularityMode::default(),
            views_for_popular: 4,
            average_review_for_popular: 4.0,
            radius_search_unit: DistanceUnit::default(),
            rating_scan_concurrency: 8,
            rating_timeout_ms: 2_000,
            cache_ttl_secs: 60,
            cache_max_capacity: 10_000,
            custom_field_types: BTreeMap::new(),
        }
    }
}

impl ListingSettings {
    /// Parse settings from TOML; missing keys keep their defaults.
    pub fn from_toml_str(source: &str) -> Result<Self> {
        toml::from_str(source).context("invalid listing settings")
    }

    /// Load settings from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let source = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read listing settings {}", path.display()))?;
        Self::from_toml_str(&source)
    }

    pub fn promotion(&self) -> PromotionPolicy {
        PromotionPolicy {
            featured_first: self.enable_featured_listing,
        }
    }

    pub fn rating_timeout(&self) -> Duration {
        Duration::from_millis(self.rating_timeout_ms)
    }

    pub fn field_type(&self, key: &str) -> Option<FieldType> {
        self.custom_field_types.get(key).copied()
    }
}
