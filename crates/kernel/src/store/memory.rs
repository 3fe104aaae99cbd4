//! In-memory listing executor.
//!
//! Evaluates composed queries over an in-memory listing set with the same
//! semantics as the PostgreSQL executor.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use anyhow::Result;
use async_trait::async_trait;
use rand::seq::SliceRandom;
use tokio::sync::RwLock;

use super::{ListingStore, RatingProvider};
use crate::listing::composer::PUBLISHED;
use crate::listing::types::{
    Compare, CompoundQuery, GeoQuery, ListingId, ListingPage, MetaClause, MetaValue, OrderKey,
    Predicate, Relation, SortDirection, SortField, Taxonomy, TaxonomyClause, TermMatch,
    meta_keys,
};

/// Post type of every in-memory listing.
const LISTING_POST_TYPE: &str = "at_biz_dir";

/// One taxonomy term.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TermNode {
    pub id: i64,
    pub taxonomy: Taxonomy,
    pub slug: String,
    pub parent: Option<i64>,
}

impl TermNode {
    pub fn new(id: i64, taxonomy: Taxonomy, slug: impl Into<String>) -> Self {
        Self {
            id,
            taxonomy,
            slug: slug.into(),
            parent: None,
        }
    }

    pub fn child_of(mut self, parent: i64) -> Self {
        self.parent = Some(parent);
        self
    }
}

/// One stored listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryListing {
    pub id: ListingId,
    pub post_type: String,
    pub status: String,
    pub title: String,
    /// Creation time (unix seconds).
    pub created: i64,
    /// Metadata values keyed by meta key.
    pub fields: BTreeMap<String, String>,
    /// Assigned term IDs.
    pub terms: BTreeSet<i64>,
}

impl MemoryListing {
    /// A published directory listing.
    pub fn new(id: ListingId, title: impl Into<String>, created: i64) -> Self {
        Self {
            id,
            post_type: LISTING_POST_TYPE.to_string(),
            status: PUBLISHED.to_string(),
            title: title.into(),
            created,
            fields: BTreeMap::new(),
            terms: BTreeSet::new(),
        }
    }

    pub fn field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn term(mut self, term_id: i64) -> Self {
        self.terms.insert(term_id);
        self
    }

    pub fn status(mut self, status: impl Into<String>) -> Self {
        self.status = status.into();
        self
    }

    fn numeric(&self, key: &str) -> Option<f64> {
        self.fields.get(key).and_then(|v| parse_numeric(v))
    }
}

/// In-memory listing store.
pub struct MemoryListingStore {
    listings: RwLock<Vec<MemoryListing>>,
    terms: Vec<TermNode>,
}

impl MemoryListingStore {
    pub fn new(listings: Vec<MemoryListing>, terms: Vec<TermNode>) -> Self {
        Self {
            listings: RwLock::new(listings),
            terms,
        }
    }

    /// Add or replace a listing.
    pub async fn insert(&self, listing: MemoryListing) {
        let mut listings = self.listings.write().await;
        listings.retain(|l| l.id != listing.id);
        listings.push(listing);
    }

    pub async fn len(&self) -> usize {
        self.listings.read().await.len()
    }

    /// Term IDs matched by a clause, expanded to descendants when asked.
    fn matched_terms(&self, clause: &TaxonomyClause) -> BTreeSet<i64> {
        let mut matched: BTreeSet<i64> = self
            .terms
            .iter()
            .filter(|t| t.taxonomy == clause.taxonomy)
            .filter(|t| match &clause.terms {
                TermMatch::Slug(slugs) => slugs.contains(&t.slug),
                TermMatch::TermId(ids) => ids.contains(&t.id),
            })
            .map(|t| t.id)
            .collect();

        if clause.include_descendants {
            let mut children: HashMap<i64, Vec<i64>> = HashMap::new();
            for term in &self.terms {
                if let Some(parent) = term.parent {
                    children.entry(parent).or_default().push(term.id);
                }
            }
            let mut pending: Vec<i64> = matched.iter().copied().collect();
            while let Some(id) = pending.pop() {
                for child in children.get(&id).into_iter().flatten() {
                    if matched.insert(*child) {
                        pending.push(*child);
                    }
                }
            }
        }

        matched
    }

    fn matches(&self, listing: &MemoryListing, query: &CompoundQuery) -> bool {
        listing.post_type == query.post_type
            && listing.status == query.post_status
            && query.ids.allows(listing.id)
            && query
                .taxonomy
                .iter()
                .chain(&query.meta)
                .all(|p| self.eval(listing, p))
            && query.geo.as_ref().is_none_or(|geo| within(listing, geo))
            && query
                .search
                .as_deref()
                .is_none_or(|text| text_matches(&listing.title, text))
    }

    fn eval(&self, listing: &MemoryListing, predicate: &Predicate) -> bool {
        match predicate {
            Predicate::Taxonomy(clause) => {
                clause.terms.is_empty()
                    || !self.matched_terms(clause).is_disjoint(&listing.terms)
            }
            Predicate::Meta(clause) => meta_matches(listing, clause),
            Predicate::Group {
                relation,
                predicates,
            } => {
                // Empty groups impose nothing
                if predicates.is_empty() {
                    return true;
                }
                match relation {
                    Relation::And => predicates.iter().all(|p| self.eval(listing, p)),
                    Relation::Or => predicates.iter().any(|p| self.eval(listing, p)),
                }
            }
        }
    }
}

#[async_trait]
impl ListingStore for MemoryListingStore {
    async fn listing_ids(&self) -> Result<Vec<ListingId>> {
        let listings = self.listings.read().await;
        let mut ids: Vec<ListingId> = listings
            .iter()
            .filter(|l| l.post_type == LISTING_POST_TYPE && l.status == PUBLISHED)
            .map(|l| l.id)
            .collect();
        ids.sort_unstable();
        Ok(ids)
    }

    async fn execute(&self, query: &CompoundQuery) -> Result<ListingPage> {
        let mut matched: Vec<MemoryListing> = {
            let listings = self.listings.read().await;
            listings
                .iter()
                .filter(|l| self.matches(l, query))
                .cloned()
                .collect()
        };

        if query.order.contains_random() {
            matched.shuffle(&mut rand::thread_rng());
        }
        // Stable sort keeps the shuffle inside equal keys
        matched.sort_by(|a, b| compare(a, b, &query.order.keys));

        let pagination = query.pagination;
        let ids: Vec<ListingId> = matched
            .iter()
            .skip(usize::try_from(pagination.offset()).unwrap_or(usize::MAX))
            .take(pagination.per_page as usize)
            .map(|l| l.id)
            .collect();

        let total = if pagination.count_total {
            matched.len() as u64
        } else {
            ids.len() as u64
        };

        Ok(ListingPage::new(ids, total, pagination.page, pagination.per_page))
    }
}

/// Fixed average ratings; listings without an entry average 0.
#[derive(Debug, Clone, Default)]
pub struct StaticRatingProvider {
    ratings: HashMap<ListingId, f64>,
}

impl StaticRatingProvider {
    pub fn new(ratings: impl IntoIterator<Item = (ListingId, f64)>) -> Self {
        Self {
            ratings: ratings.into_iter().collect(),
        }
    }
}

#[async_trait]
impl RatingProvider for StaticRatingProvider {
    async fn average_for(&self, id: ListingId) -> Result<f64> {
        Ok(self.ratings.get(&id).copied().unwrap_or(0.0))
    }
}

fn meta_matches(listing: &MemoryListing, clause: &MetaClause) -> bool {
    let value = listing.fields.get(&clause.key);

    match clause.compare {
        Compare::Exists if clause.numeric => value.is_some_and(|v| !v.is_empty()),
        Compare::Exists => value.is_some(),
        Compare::Like => match (value, clause.value.as_text()) {
            (Some(v), Some(needle)) => v.to_lowercase().contains(&needle.to_lowercase()),
            _ => false,
        },
        Compare::Between => match (listing.numeric(&clause.key), &clause.value) {
            (Some(n), MetaValue::Range(min, max)) => n >= *min as f64 && n <= *max as f64,
            _ => false,
        },
        compare
            if clause.numeric
                || matches!(compare, Compare::GreaterOrEqual | Compare::LessOrEqual) =>
        {
            let Some(target) = clause.value.as_f64().filter(|v| v.is_finite()) else {
                return false;
            };
            let actual = listing.numeric(&clause.key);
            match compare {
                Compare::NotEquals => actual != Some(target),
                Compare::GreaterOrEqual => actual.is_some_and(|n| n >= target),
                Compare::LessOrEqual => actual.is_some_and(|n| n <= target),
                _ => actual == Some(target),
            }
        }
        compare => {
            let Some(target) = clause.value.as_text() else {
                return false;
            };
            match compare {
                Compare::NotEquals => value != Some(&target),
                _ => value == Some(&target),
            }
        }
    }
}

/// Decimal numbers only, matching what the SQL renderer casts.
fn parse_numeric(value: &str) -> Option<f64> {
    let trimmed = value.trim();
    let unsigned = trimmed.strip_prefix('-').unwrap_or(trimmed);
    let (whole, fraction) = match unsigned.split_once('.') {
        Some((whole, fraction)) => (whole, Some(fraction)),
        None => (unsigned, None),
    };
    let digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
    if !digits(whole) || fraction.is_some_and(|f| !digits(f)) {
        return None;
    }
    trimmed.parse().ok()
}

/// Haversine distance check, mirroring the SQL renderer.
fn within(listing: &MemoryListing, geo: &GeoQuery) -> bool {
    let (Some(lat), Some(lng)) = (listing.numeric(&geo.lat_field), listing.numeric(&geo.lng_field))
    else {
        return false;
    };
    haversine(geo.latitude, geo.longitude, lat, lng, geo.units.earth_radius()) <= geo.distance
}

pub(crate) fn haversine(lat1: f64, lng1: f64, lat2: f64, lng2: f64, radius: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lng = (lng2 - lng1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lng / 2.0).sin().powi(2);
    2.0 * radius * a.sqrt().asin()
}

/// Every alphanumeric term of the search text appears in the title.
fn text_matches(title: &str, text: &str) -> bool {
    let title = title.to_lowercase();
    let sanitized: String = text
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    let mut terms = sanitized.split_whitespace().peekable();
    if terms.peek().is_none() {
        return true;
    }
    terms.all(|term| title.contains(&term.to_lowercase()))
}

fn compare(a: &MemoryListing, b: &MemoryListing, keys: &[OrderKey]) -> Ordering {
    let mut random = false;
    for key in keys {
        let ordering = match key {
            OrderKey::Featured | OrderKey::FeaturedRandom => {
                random |= key.is_random();
                featured(b).total_cmp(&featured(a))
            }
            OrderKey::Random => {
                random = true;
                Ordering::Equal
            }
            OrderKey::Field { field, direction } => {
                let ordering = match field {
                    SortField::Title => a.title.cmp(&b.title),
                    SortField::Date => a.created.cmp(&b.created),
                    SortField::Price => numeric_or_zero(a, meta_keys::PRICE)
                        .total_cmp(&numeric_or_zero(b, meta_keys::PRICE)),
                    SortField::Views => numeric_or_zero(a, meta_keys::VIEW_COUNT)
                        .total_cmp(&numeric_or_zero(b, meta_keys::VIEW_COUNT)),
                };
                match direction {
                    SortDirection::Asc => ordering,
                    SortDirection::Desc => ordering.reverse(),
                }
            }
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    if random {
        Ordering::Equal
    } else {
        a.id.cmp(&b.id)
    }
}

fn featured(listing: &MemoryListing) -> f64 {
    numeric_or_zero(listing, meta_keys::FEATURED)
}

fn numeric_or_zero(listing: &MemoryListing, key: &str) -> f64 {
    listing.numeric(key).unwrap_or(0.0)
}
