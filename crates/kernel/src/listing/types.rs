//! Listing query types.
//!
//! Provides type definitions shared by the composer, the SQL renderer and
//! the executors:
//! - Predicate: taxonomy, metadata, and nested AND/OR groups
//! - SortSpec / OrderPlan: requested and resolved ordering
//! - CompoundQuery: the composed output handed to a `ListingStore`
//! - ListingPage: paginated executor result

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Listing identifier.
pub type ListingId = i64;

/// Metadata keys written by the listing editor.
pub mod meta_keys {
    pub const LISTING_STATUS: &str = "_listing_status";
    pub const DIRECTORY_TYPE: &str = "_directory_type";
    pub const FEATURED: &str = "_featured";
    pub const VIEW_COUNT: &str = "_atbdp_post_views_count";
    pub const PRICE: &str = "_price";
    pub const PRICE_RANGE: &str = "_price_range";
    pub const WEBSITE: &str = "_website";
    pub const EMAIL: &str = "_email";
    pub const PHONE: &str = "_phone";
    pub const PHONE_SECONDARY: &str = "_phone2";
    pub const FAX: &str = "_fax";
    pub const ADDRESS: &str = "_address";
    pub const ZIP: &str = "_zip";
    pub const LATITUDE: &str = "_manual_lat";
    pub const LONGITUDE: &str = "_manual_lng";
}

/// Status value that removes a listing from every query.
pub const EXPIRED_STATUS: &str = "expired";

/// Relation combining the members of a predicate group.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum Relation {
    And,
    Or,
}

/// Listing taxonomies.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Taxonomy {
    Category,
    Location,
    Tag,
}

impl Taxonomy {
    /// Taxonomy name as stored in the term table.
    pub fn as_str(&self) -> &'static str {
        match self {
            Taxonomy::Category => "at_biz_dir-category",
            Taxonomy::Location => "at_biz_dir-location",
            Taxonomy::Tag => "at_biz_dir-tags",
        }
    }
}

/// Terms of a taxonomy clause, matched by slug or by numeric term ID.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "field", content = "terms", rename_all = "snake_case")]
pub enum TermMatch {
    Slug(BTreeSet<String>),
    TermId(BTreeSet<i64>),
}

impl TermMatch {
    pub fn is_empty(&self) -> bool {
        match self {
            TermMatch::Slug(slugs) => slugs.is_empty(),
            TermMatch::TermId(ids) => ids.is_empty(),
        }
    }
}

/// One taxonomy restriction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaxonomyClause {
    pub taxonomy: Taxonomy,
    #[serde(flatten)]
    pub terms: TermMatch,
    /// Match listings tagged with a descendant of any listed term.
    pub include_descendants: bool,
}

/// Metadata comparison operators.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Compare {
    Equals,
    NotEquals,
    /// Case-insensitive substring match.
    Like,
    GreaterOrEqual,
    LessOrEqual,
    /// Inclusive range; value must be `MetaValue::Range`.
    Between,
    Exists,
}

/// Metadata comparison value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum MetaValue {
    None,
    Integer(i64),
    Float(f64),
    Text(String),
    Range(i64, i64),
}

impl MetaValue {
    /// Numeric value, parsing text when needed.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetaValue::Integer(i) => Some(*i as f64),
            MetaValue::Float(f) => Some(*f),
            MetaValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// String representation for text comparisons.
    pub fn as_text(&self) -> Option<String> {
        match self {
            MetaValue::Integer(i) => Some(i.to_string()),
            MetaValue::Float(f) => Some(f.to_string()),
            MetaValue::Text(s) => Some(s.clone()),
            _ => None,
        }
    }
}

/// One metadata restriction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetaClause {
    pub key: String,
    pub compare: Compare,
    pub value: MetaValue,
    /// Compare as numbers rather than strings.
    #[serde(default)]
    pub numeric: bool,
}

impl MetaClause {
    pub fn new(key: impl Into<String>, compare: Compare, value: MetaValue) -> Self {
        Self {
            key: key.into(),
            compare,
            value,
            numeric: false,
        }
    }

    /// Case-insensitive substring match on a text value.
    pub fn like(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(key, Compare::Like, MetaValue::Text(value.into()))
    }

    pub fn numeric(mut self) -> Self {
        self.numeric = true;
        self
    }
}

/// Predicate tree node.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Predicate {
    Taxonomy(TaxonomyClause),
    Meta(MetaClause),
    Group {
        relation: Relation,
        predicates: Vec<Predicate>,
    },
}

impl Predicate {
    pub fn and(predicates: Vec<Predicate>) -> Self {
        Predicate::Group {
            relation: Relation::And,
            predicates,
        }
    }

    pub fn or(predicates: Vec<Predicate>) -> Self {
        Predicate::Group {
            relation: Relation::Or,
            predicates,
        }
    }

    /// Number of leaf clauses under this node.
    pub fn leaf_count(&self) -> usize {
        match self {
            Predicate::Taxonomy(_) | Predicate::Meta(_) => 1,
            Predicate::Group { predicates, .. } => {
                predicates.iter().map(Predicate::leaf_count).sum()
            }
        }
    }
}

/// Sortable listing fields.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SortField {
    Title,
    Date,
    Price,
    Views,
}

impl SortField {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortField::Title => "title",
            SortField::Date => "date",
            SortField::Price => "price",
            SortField::Views => "views",
        }
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        }
    }
}

/// The single active sort selection.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "sort", rename_all = "snake_case")]
pub enum SortSpec {
    Field {
        field: SortField,
        direction: SortDirection,
    },
    Random,
}

impl SortSpec {
    pub const fn field(field: SortField, direction: SortDirection) -> Self {
        SortSpec::Field { field, direction }
    }

    /// Parse a combined sort key such as `title-asc` or `rand`.
    ///
    /// Only the eight recognized states parse; `views` sorts descending only.
    pub fn parse_key(key: &str) -> Option<Self> {
        let key = key.trim().to_ascii_lowercase();
        if key == "rand" || key == "random" {
            return Some(SortSpec::Random);
        }
        let (field, direction) = key.split_once('-')?;
        Self::from_pair(field, direction)
    }

    /// Parse an `orderby` / `order` pair.
    pub fn from_pair(orderby: &str, order: &str) -> Option<Self> {
        let orderby = orderby.trim().to_ascii_lowercase();
        if orderby == "rand" || orderby == "random" {
            return Some(SortSpec::Random);
        }
        let direction = match order.trim().to_ascii_lowercase().as_str() {
            "asc" => SortDirection::Asc,
            "desc" => SortDirection::Desc,
            _ => return None,
        };
        let field = match orderby.as_str() {
            "title" => SortField::Title,
            "date" => SortField::Date,
            "price" => SortField::Price,
            "views" if direction == SortDirection::Desc => SortField::Views,
            _ => return None,
        };
        Some(SortSpec::Field { field, direction })
    }

    /// Canonical key (`title-asc`, `rand`, ...).
    pub fn key(&self) -> String {
        match self {
            SortSpec::Field { field, direction } => {
                format!("{}-{}", field.as_str(), direction.as_str())
            }
            SortSpec::Random => "rand".to_string(),
        }
    }

    pub fn is_random(&self) -> bool {
        matches!(self, SortSpec::Random)
    }
}

/// Featured-item promotion rule.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct PromotionPolicy {
    /// Featured listings always sort ahead of the requested order.
    pub featured_first: bool,
}

/// One key of a resolved ordering plan.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "key", rename_all = "snake_case")]
pub enum OrderKey {
    /// Featured flag descending.
    Featured,
    Field {
        field: SortField,
        direction: SortDirection,
    },
    Random,
    /// Featured flag descending with random order inside each tier.
    FeaturedRandom,
}

impl OrderKey {
    pub fn is_random(&self) -> bool {
        matches!(self, OrderKey::Random | OrderKey::FeaturedRandom)
    }
}

/// Resolved ordering plan, most significant key first.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OrderPlan {
    pub keys: Vec<OrderKey>,
}

impl OrderPlan {
    pub fn contains_random(&self) -> bool {
        self.keys.iter().any(OrderKey::is_random)
    }
}

/// Whether the result of a query may be served from cache.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CacheDecision {
    Cache,
    Bypass,
}

impl CacheDecision {
    /// Random plans never repeat, so they are never cached.
    pub fn for_plan(plan: &OrderPlan) -> Self {
        if plan.contains_random() {
            CacheDecision::Bypass
        } else {
            CacheDecision::Cache
        }
    }

    pub fn is_cacheable(&self) -> bool {
        matches!(self, CacheDecision::Cache)
    }
}

/// Explicit ID restriction.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(tag = "ids", content = "allow", rename_all = "snake_case")]
pub enum IdFilter {
    #[default]
    Unrestricted,
    /// Only these listings may match. An empty set matches nothing.
    AllowList(BTreeSet<ListingId>),
}

impl IdFilter {
    /// Restrict further; two allow-lists combine by intersection.
    pub fn intersect(self, ids: BTreeSet<ListingId>) -> Self {
        match self {
            IdFilter::Unrestricted => IdFilter::AllowList(ids),
            IdFilter::AllowList(current) => {
                IdFilter::AllowList(current.intersection(&ids).copied().collect())
            }
        }
    }

    pub fn allows(&self, id: ListingId) -> bool {
        match self {
            IdFilter::Unrestricted => true,
            IdFilter::AllowList(ids) => ids.contains(&id),
        }
    }

    pub fn matches_nothing(&self) -> bool {
        matches!(self, IdFilter::AllowList(ids) if ids.is_empty())
    }
}

/// Distance unit for radius search.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DistanceUnit {
    #[default]
    Miles,
    Kilometers,
}

impl DistanceUnit {
    /// Mean earth radius in this unit.
    pub fn earth_radius(&self) -> f64 {
        match self {
            DistanceUnit::Miles => 3959.0,
            DistanceUnit::Kilometers => 6371.0,
        }
    }
}

/// Radius annotation evaluated by the executor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeoQuery {
    pub lat_field: String,
    pub lng_field: String,
    pub latitude: f64,
    pub longitude: f64,
    pub distance: f64,
    pub units: DistanceUnit,
}

/// Pagination window.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Pagination {
    /// Current page (1-indexed).
    pub page: u32,
    pub per_page: u32,
    /// Whether the executor should compute the total count.
    pub count_total: bool,
}

impl Pagination {
    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.per_page)
    }
}

/// Fully composed listing query.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompoundQuery {
    pub post_type: String,
    pub post_status: String,
    pub pagination: Pagination,
    /// Taxonomy predicates, combined with AND.
    pub taxonomy: Vec<Predicate>,
    /// Metadata predicates, combined with AND.
    pub meta: Vec<Predicate>,
    pub ids: IdFilter,
    pub order: OrderPlan,
    pub geo: Option<GeoQuery>,
    /// Free-text term (search mode only).
    pub search: Option<String>,
}

/// Result from executing a listing query.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ListingPage {
    /// Listing IDs in result order.
    pub ids: Vec<ListingId>,

    /// Total count (before paging).
    pub total: u64,

    /// Current page number (1-indexed).
    pub page: u32,

    /// Items per page.
    pub per_page: u32,

    /// Total number of pages.
    pub total_pages: u32,

    /// Whether there's a next page.
    pub has_next: bool,

    /// Whether there's a previous page.
    pub has_prev: bool,
}

impl ListingPage {
    /// Create a new page with paging calculations.
    pub fn new(ids: Vec<ListingId>, total: u64, page: u32, per_page: u32) -> Self {
        let total_pages = if per_page > 0 {
            total.div_ceil(u64::from(per_page)) as u32
        } else {
            1
        };

        Self {
            ids,
            total,
            page,
            per_page,
            total_pages,
            has_next: page < total_pages,
            has_prev: page > 1,
        }
    }

    /// Create an empty page.
    pub fn empty(page: u32, per_page: u32) -> Self {
        Self {
            ids: Vec::new(),
            total: 0,
            page,
            per_page,
            total_pages: 0,
            has_next: false,
            has_prev: false,
        }
    }
}
