//! Filter criteria model.
//!
//! Turns shortcode attributes or search-form parameters into a typed
//! [`FilterCriteria`]. Parsing never fails: unparseable numbers, unknown
//! flags and empty values resolve to "not set".

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::params::{NestedValue, RequestParams};
use super::types::{ListingId, TermMatch};

/// Price restriction.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PriceFilter {
    Min(i64),
    Max(i64),
    Range(i64, i64),
}

/// Value selected for a custom field.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum CustomFieldValue {
    /// Sent as a plain value; operator depends on the field type.
    Scalar(String),
    /// Sent as an array (checkbox groups); always substring matched.
    List(Vec<String>),
}

/// Contact and address text filters.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContactCriteria {
    pub website: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub fax: Option<String>,
    pub address: Option<String>,
    pub zip: Option<String>,
}

/// Radius search input, validated during composition.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct GeoCriteria {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub distance: Option<f64>,
}

/// Typed listing filter criteria for one request.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FilterCriteria {
    pub categories: Option<TermMatch>,
    pub locations: Option<TermMatch>,
    pub tags: Option<TermMatch>,
    pub text: Option<String>,
    pub price: Option<PriceFilter>,
    pub price_range: Option<String>,
    pub custom_fields: BTreeMap<String, CustomFieldValue>,
    pub contact: ContactCriteria,
    /// Minimum average rating (1-5).
    pub rating: Option<f64>,
    pub geo: Option<GeoCriteria>,
    pub directory_type: Option<i64>,
    /// Explicit allow-list; other filters still apply.
    pub ids: Option<BTreeSet<ListingId>>,
    pub featured_only: bool,
    pub popular_only: bool,
}

/// Raw sort input; parsed by the order resolver.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum SortRequest {
    /// Combined key such as `title-asc` or `rand`.
    Key(String),
    /// `orderby` / `order` pair.
    Pair { orderby: String, order: String },
}

/// Whether the query comes from a listing archive or the search form.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum QueryMode {
    #[default]
    Browse,
    Search,
}

/// Everything the composer needs from one request.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ListingRequest {
    pub mode: QueryMode,
    pub criteria: FilterCriteria,
    pub sort: Option<SortRequest>,
    /// Requested page (1-indexed).
    pub page: u32,
    /// Overrides the configured page size.
    pub per_page: Option<u32>,
}

impl ListingRequest {
    /// Listing archive shortcode, with request parameters that may override it.
    pub fn from_shortcode(atts: &RequestParams, request: &RequestParams) -> Self {
        let sort = sort_request(request).or_else(|| sort_request(atts));
        Self {
            mode: QueryMode::Browse,
            criteria: FilterCriteria::from_shortcode(atts),
            sort,
            page: page_number(request),
            per_page: atts
                .get_non_empty("listings_per_page")
                .and_then(|v| v.parse().ok())
                .filter(|n: &u32| *n > 0),
        }
    }

    /// Search result page.
    pub fn from_search(params: &RequestParams) -> Self {
        Self {
            mode: QueryMode::Search,
            criteria: FilterCriteria::from_search(params),
            sort: sort_request(params),
            page: page_number(params),
            per_page: None,
        }
    }
}

impl FilterCriteria {
    /// Criteria from shortcode attributes: taxonomy by slug, comma lists.
    pub fn from_shortcode(atts: &RequestParams) -> Self {
        let ids: BTreeSet<ListingId> = comma_list(atts.get("ids"))
            .filter_map(|v| v.parse().ok())
            .collect();

        Self {
            categories: slug_terms(atts.get("category")),
            locations: slug_terms(atts.get("location")),
            tags: slug_terms(atts.get("tag")),
            directory_type: positive_int(atts.get("directory_type")),
            ids: (!ids.is_empty()).then_some(ids),
            featured_only: is_yes(atts.get("featured_only")),
            popular_only: is_yes(atts.get("popular_only")),
            ..Default::default()
        }
    }

    /// Criteria from search-form parameters: taxonomy by term ID.
    pub fn from_search(params: &RequestParams) -> Self {
        let contact = ContactCriteria {
            website: non_empty(params, "website"),
            email: non_empty(params, "email"),
            phone: non_empty(params, "phone"),
            fax: non_empty(params, "fax"),
            address: non_empty(params, "address"),
            zip: non_empty(params, "zip").or_else(|| non_empty(params, "zip_code")),
        };

        let geo = GeoCriteria {
            latitude: finite_float(params.get("cityLat")),
            longitude: finite_float(params.get("cityLng")),
            distance: finite_float(params.get("miles")),
        };
        let geo = (geo != GeoCriteria::default()).then_some(geo);

        Self {
            categories: id_terms(params.get_all("in_cat")),
            locations: id_terms(params.get_all("in_loc")),
            tags: id_terms(params.get_all("in_tag")),
            text: non_empty(params, "q"),
            price: price_filter(params),
            price_range: params
                .get_non_empty("price_range")
                .filter(|v| *v != "none")
                .map(str::to_string),
            custom_fields: custom_fields(params),
            contact,
            rating: params
                .get_non_empty("search_by_rating")
                .and_then(|v| v.parse::<f64>().ok())
                .filter(|r| (1.0..=5.0).contains(r)),
            geo,
            directory_type: positive_int(params.get("directory_type")),
            ids: None,
            featured_only: is_yes(params.get("featured_only")),
            popular_only: is_yes(params.get("popular_only")),
        }
    }

    /// Whether any taxonomy facet is set.
    pub fn has_taxonomy(&self) -> bool {
        [&self.categories, &self.locations, &self.tags]
            .iter()
            .any(|facet| matches!(facet, Some(terms) if !terms.is_empty()))
    }
}

fn sort_request(params: &RequestParams) -> Option<SortRequest> {
    if let Some(key) = params.get_non_empty("sort") {
        return Some(SortRequest::Key(key.to_string()));
    }
    let orderby = params.get_non_empty("orderby")?;
    Some(SortRequest::Pair {
        orderby: orderby.to_string(),
        order: params.get("order").unwrap_or_default().trim().to_string(),
    })
}

fn page_number(params: &RequestParams) -> u32 {
    params
        .get_non_empty("paged")
        .and_then(|v| v.parse::<u32>().ok())
        .filter(|p| *p >= 1)
        .unwrap_or(1)
}

fn comma_list(value: Option<&str>) -> impl Iterator<Item = &str> {
    value
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

fn slug_terms(value: Option<&str>) -> Option<TermMatch> {
    let slugs: BTreeSet<String> = comma_list(value).map(str::to_string).collect();
    (!slugs.is_empty()).then_some(TermMatch::Slug(slugs))
}

fn id_terms(values: Vec<&str>) -> Option<TermMatch> {
    let ids: BTreeSet<i64> = values
        .into_iter()
        .flat_map(|v| comma_list(Some(v)))
        .filter_map(|v| v.parse::<i64>().ok())
        .filter(|id| *id > 0)
        .collect();
    (!ids.is_empty()).then_some(TermMatch::TermId(ids))
}

fn is_yes(value: Option<&str>) -> bool {
    matches!(
        value.map(|v| v.trim().to_ascii_lowercase()).as_deref(),
        Some("yes" | "1" | "true")
    )
}

fn non_empty(params: &RequestParams, key: &str) -> Option<String> {
    params.get_non_empty(key).map(str::to_string)
}

fn positive_int(value: Option<&str>) -> Option<i64> {
    value
        .and_then(|v| v.trim().parse::<i64>().ok())
        .filter(|v| *v > 0)
}

fn finite_float(value: Option<&str>) -> Option<f64> {
    value
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite())
}

/// `price[0]` is the lower bound, `price[1]` the upper; empty and zero
/// bounds are dropped.
fn price_filter(params: &RequestParams) -> Option<PriceFilter> {
    let indexed = params.get_indexed("price");
    let bound = |index: usize| {
        indexed
            .get(&index)
            .and_then(|v| v.trim().parse::<f64>().ok())
            .map(|v| v.trunc() as i64)
            .filter(|v| *v != 0)
    };
    match (bound(0), bound(1)) {
        (Some(min), Some(max)) => Some(PriceFilter::Range(min, max)),
        (Some(min), None) => Some(PriceFilter::Min(min)),
        (None, Some(max)) => Some(PriceFilter::Max(max)),
        (None, None) => None,
    }
}

fn custom_fields(params: &RequestParams) -> BTreeMap<String, CustomFieldValue> {
    params
        .get_nested("custom_field")
        .into_iter()
        .filter_map(|(key, value)| {
            let value = match value {
                NestedValue::Scalar(v) => {
                    let v = v.trim();
                    (!v.is_empty()).then(|| CustomFieldValue::Scalar(v.to_string()))?
                }
                NestedValue::List(values) => {
                    let values: Vec<String> = values
                        .iter()
                        .map(|v| v.trim())
                        .filter(|v| !v.is_empty())
                        .map(str::to_string)
                        .collect();
                    (!values.is_empty()).then_some(CustomFieldValue::List(values))?
                }
            };
            Some((key, value))
        })
        .collect()
}
