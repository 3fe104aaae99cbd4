//! Predicate composer.
//!
//! Builds the taxonomy and metadata predicate lists of a compound query.
//! Metadata predicates always come out in the same order for the same
//! criteria, so composed queries fingerprint identically.

use std::collections::BTreeMap;

use super::criteria::{CustomFieldValue, FilterCriteria, PriceFilter};
use super::types::{
    Compare, EXPIRED_STATUS, MetaClause, MetaValue, Predicate, Taxonomy, TaxonomyClause,
    meta_keys,
};
use crate::config::FieldType;

/// Decisions made elsewhere that add metadata predicates.
#[derive(Debug, Clone, Default)]
pub struct MetaContext<'a> {
    /// Minimum view count, when popularity is decided by views.
    pub view_threshold: Option<i64>,
    /// The resolved sort orders by price.
    pub price_sort: bool,
    /// A radius search is attached; the address text filter is dropped.
    pub geo_attached: bool,
    /// Custom field input types.
    pub field_types: Option<&'a BTreeMap<String, FieldType>>,
}

/// Taxonomy predicates: nothing, one bare clause, or one AND group.
pub fn taxonomy_predicates(criteria: &FilterCriteria) -> Vec<Predicate> {
    let facets = [
        (Taxonomy::Category, &criteria.categories),
        (Taxonomy::Location, &criteria.locations),
        (Taxonomy::Tag, &criteria.tags),
    ];

    let clauses: Vec<Predicate> = facets
        .into_iter()
        .filter_map(|(taxonomy, terms)| {
            let terms = terms.as_ref().filter(|t| !t.is_empty())?;
            Some(Predicate::Taxonomy(TaxonomyClause {
                taxonomy,
                terms: terms.clone(),
                include_descendants: true,
            }))
        })
        .collect();

    if clauses.len() > 1 {
        vec![Predicate::and(clauses)]
    } else {
        clauses
    }
}

/// Metadata predicates in their fixed order.
pub fn meta_predicates(criteria: &FilterCriteria, context: &MetaContext<'_>) -> Vec<Predicate> {
    let mut predicates = vec![meta(MetaClause::new(
        meta_keys::LISTING_STATUS,
        Compare::NotEquals,
        MetaValue::Text(EXPIRED_STATUS.to_string()),
    ))];

    if let Some(directory_type) = criteria.directory_type {
        predicates.push(meta(MetaClause::new(
            meta_keys::DIRECTORY_TYPE,
            Compare::Equals,
            MetaValue::Integer(directory_type),
        )));
    }

    if criteria.featured_only {
        predicates.push(meta(MetaClause::new(
            meta_keys::FEATURED,
            Compare::Equals,
            MetaValue::Integer(1),
        )));
    }

    if let Some(threshold) = context.view_threshold {
        predicates.push(meta(
            MetaClause::new(
                meta_keys::VIEW_COUNT,
                Compare::GreaterOrEqual,
                MetaValue::Integer(threshold),
            )
            .numeric(),
        ));
    }

    if context.price_sort {
        predicates.push(meta(
            MetaClause::new(meta_keys::PRICE, Compare::Exists, MetaValue::None).numeric(),
        ));
    }

    for (key, value) in &criteria.custom_fields {
        if let Some(predicate) = custom_field_predicate(key, value, context.field_types) {
            predicates.push(predicate);
        }
    }

    if let Some(price) = criteria.price {
        predicates.push(meta(price_clause(price)));
    }

    if let Some(label) = &criteria.price_range {
        predicates.push(meta(MetaClause::like(meta_keys::PRICE_RANGE, label)));
    }

    let contact = &criteria.contact;
    if let Some(website) = &contact.website {
        predicates.push(meta(MetaClause::like(meta_keys::WEBSITE, website)));
    }
    if let Some(email) = &contact.email {
        predicates.push(meta(MetaClause::like(meta_keys::EMAIL, email)));
    }
    if let Some(phone) = &contact.phone {
        predicates.push(Predicate::or(vec![
            meta(MetaClause::like(meta_keys::PHONE_SECONDARY, phone)),
            meta(MetaClause::like(meta_keys::PHONE, phone)),
        ]));
    }
    if let Some(fax) = &contact.fax {
        predicates.push(meta(MetaClause::like(meta_keys::FAX, fax)));
    }
    if let Some(address) = &contact.address
        && !context.geo_attached
    {
        predicates.push(meta(MetaClause::like(meta_keys::ADDRESS, address)));
    }
    if let Some(zip) = &contact.zip {
        predicates.push(meta(MetaClause::like(meta_keys::ZIP, zip)));
    }

    predicates
}

fn meta(clause: MetaClause) -> Predicate {
    Predicate::Meta(clause)
}

fn price_clause(price: PriceFilter) -> MetaClause {
    let (compare, value) = match price {
        PriceFilter::Range(min, max) => (Compare::Between, MetaValue::Range(min, max)),
        PriceFilter::Min(min) => (Compare::GreaterOrEqual, MetaValue::Integer(min)),
        PriceFilter::Max(max) => (Compare::LessOrEqual, MetaValue::Integer(max)),
    };
    MetaClause::new(meta_keys::PRICE, compare, value).numeric()
}

fn custom_field_predicate(
    key: &str,
    value: &CustomFieldValue,
    field_types: Option<&BTreeMap<String, FieldType>>,
) -> Option<Predicate> {
    match value {
        CustomFieldValue::List(values) => match values.as_slice() {
            [] => None,
            [single] => Some(meta(MetaClause::like(key, single))),
            many => Some(Predicate::or(
                many.iter()
                    .map(|v| meta(MetaClause::like(key, v)))
                    .collect(),
            )),
        },
        CustomFieldValue::Scalar(v) => {
            let free_text = field_types
                .and_then(|types| types.get(key))
                .is_some_and(FieldType::is_free_text);
            if free_text {
                Some(meta(MetaClause::like(key, v)))
            } else {
                Some(meta(MetaClause::new(
                    key,
                    Compare::Equals,
                    MetaValue::Text(v.clone()),
                )))
            }
        }
    }
}
