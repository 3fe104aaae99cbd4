//! Query composer.
//!
//! Combines predicates, the ordering plan, the popularity allow-list,
//! the radius annotation and paging into one [`CompoundQuery`], and
//! decides whether its result may be cached. Composition does no I/O;
//! rating scans run beforehand and are passed in.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::criteria::{GeoCriteria, ListingRequest, QueryMode};
use super::order::OrderResolution;
use super::popularity::PopularityPlan;
use super::predicate::{MetaContext, meta_predicates, taxonomy_predicates};
use super::types::{
    CacheDecision, CompoundQuery, DistanceUnit, GeoQuery, IdFilter, ListingId, Pagination,
    SortDirection, SortField, SortSpec, meta_keys,
};
use crate::config::ListingSettings;

/// Maximum items per page.
pub const MAX_PER_PAGE: u32 = 100;

/// Search results order by title unless the caller sorts.
pub const SEARCH_SORT: SortSpec = SortSpec::field(SortField::Title, SortDirection::Asc);

/// Post status of visible listings.
pub const PUBLISHED: &str = "publish";

/// Decisions made before composition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositionPlan {
    pub order: OrderResolution,
    pub popularity: PopularityPlan,
}

impl CompositionPlan {
    /// A rating scan must run before `compose`.
    pub fn needs_scan(&self) -> bool {
        self.popularity.needs_scan()
    }

    pub fn rating_threshold(&self) -> Option<f64> {
        self.popularity.rating_threshold
    }
}

/// A composed query and its cache decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComposedQuery {
    pub query: CompoundQuery,
    pub cache: CacheDecision,
}

/// Builds compound queries from listing requests.
pub struct QueryComposer<'a> {
    settings: &'a ListingSettings,
}

impl<'a> QueryComposer<'a> {
    pub fn new(settings: &'a ListingSettings) -> Self {
        Self { settings }
    }

    fn default_sort(&self, mode: QueryMode) -> SortSpec {
        match mode {
            QueryMode::Browse => self.settings.browse.default_sort(),
            QueryMode::Search => SEARCH_SORT,
        }
    }

    /// Page size and whether to count the total.
    fn paging(&self, mode: QueryMode) -> (u32, bool) {
        match mode {
            QueryMode::Browse => (self.settings.browse.per_page, self.settings.browse.paginate),
            QueryMode::Search => (self.settings.search.per_page, self.settings.search.paginate),
        }
    }

    /// Resolve ordering and popularity for a request.
    pub fn plan(&self, request: &ListingRequest) -> CompositionPlan {
        let default = self.default_sort(request.mode);
        let order =
            OrderResolution::resolve(request.sort.as_ref(), default, self.settings.promotion());
        let popularity = PopularityPlan::for_request(&request.criteria, &order, self.settings);
        CompositionPlan { order, popularity }
    }

    /// Compose the query for a request.
    ///
    /// `rated` is the rating scan result. When the plan needs one and none
    /// is given, the query matches nothing rather than ignoring the filter.
    pub fn compose(
        &self,
        request: &ListingRequest,
        rated: Option<&BTreeSet<ListingId>>,
    ) -> ComposedQuery {
        let plan = self.plan(request);
        let criteria = &request.criteria;

        let geo = criteria
            .geo
            .and_then(|geo| geo_query(geo, self.settings.radius_search_unit));

        let context = MetaContext {
            view_threshold: plan.popularity.view_threshold,
            price_sort: plan.order.sorts_by_price(),
            geo_attached: geo.is_some(),
            field_types: Some(&self.settings.custom_field_types),
        };

        let mut ids = IdFilter::Unrestricted;
        if let Some(explicit) = &criteria.ids {
            ids = ids.intersect(explicit.clone());
        }
        if plan.needs_scan() {
            let allowed = match rated {
                Some(rated) => rated.clone(),
                None => {
                    tracing::warn!("rating scan result missing; query will match nothing");
                    BTreeSet::new()
                }
            };
            ids = ids.intersect(allowed);
        }

        let search = match request.mode {
            QueryMode::Search => criteria
                .text
                .as_deref()
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string),
            QueryMode::Browse => None,
        };

        let query = CompoundQuery {
            post_type: self.settings.post_type.clone(),
            post_status: PUBLISHED.to_string(),
            pagination: self.pagination(request),
            taxonomy: taxonomy_predicates(criteria),
            meta: meta_predicates(criteria, &context),
            ids,
            order: plan.order.plan.clone(),
            geo,
            search,
        };
        let cache = CacheDecision::for_plan(&query.order);

        tracing::debug!(
            mode = ?request.mode,
            sort = %plan.order.spec.key(),
            fell_back = plan.order.fell_back,
            taxonomy = query.taxonomy.len(),
            meta = query.meta.len(),
            geo = query.geo.is_some(),
            cache = ?cache,
            "composed listing query"
        );

        ComposedQuery { query, cache }
    }

    fn pagination(&self, request: &ListingRequest) -> Pagination {
        let (default_per_page, count_total) = self.paging(request.mode);
        let requested = request.per_page.unwrap_or(default_per_page).max(1);
        let per_page = if requested > MAX_PER_PAGE {
            tracing::warn!(
                requested = requested,
                capped = MAX_PER_PAGE,
                "per_page exceeds maximum, capping"
            );
            MAX_PER_PAGE
        } else {
            requested
        };

        Pagination {
            page: request.page.max(1),
            per_page,
            count_total,
        }
    }
}

/// Radius annotation when coordinates are present and finite and the
/// distance is positive.
fn geo_query(geo: GeoCriteria, units: DistanceUnit) -> Option<GeoQuery> {
    let latitude = geo.latitude.filter(|v| v.is_finite())?;
    let longitude = geo.longitude.filter(|v| v.is_finite())?;
    let distance = geo.distance.filter(|d| d.is_finite() && *d > 0.0)?;
    Some(GeoQuery {
        lat_field: meta_keys::LATITUDE.to_string(),
        lng_field: meta_keys::LONGITUDE.to_string(),
        latitude,
        longitude,
        distance,
        units,
    })
}
