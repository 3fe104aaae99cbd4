//! Order resolver.
//!
//! Maps the caller's raw sort input onto one of the recognized sort states
//! and expands it into an ordering plan under the featured promotion rule.

use serde::{Deserialize, Serialize};

use super::criteria::SortRequest;
use super::types::{OrderKey, OrderPlan, PromotionPolicy, SortDirection, SortField, SortSpec};

/// Outcome of resolving a sort request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderResolution {
    /// The single active sort selection.
    pub spec: SortSpec,
    pub plan: OrderPlan,
    /// The request was present but unrecognized and the default applied.
    pub fell_back: bool,
}

impl OrderResolution {
    /// Resolve a sort request; unrecognized input falls back to `default`.
    ///
    /// An `orderby` without an `order` takes the direction of `default`;
    /// `views` only sorts descending.
    pub fn resolve(
        requested: Option<&SortRequest>,
        default: SortSpec,
        policy: PromotionPolicy,
    ) -> Self {
        let parsed = requested.map(|request| match request {
            SortRequest::Key(key) => SortSpec::parse_key(key),
            SortRequest::Pair { orderby, order } if order.trim().is_empty() => {
                let direction = match default {
                    SortSpec::Field { direction, .. } => direction,
                    SortSpec::Random => SortDirection::Asc,
                };
                SortSpec::from_pair(orderby, direction.as_str())
                    .or_else(|| SortSpec::from_pair(orderby, SortDirection::Desc.as_str()))
            }
            SortRequest::Pair { orderby, order } => SortSpec::from_pair(orderby, order),
        });

        let (spec, fell_back) = match parsed {
            Some(Some(spec)) => (spec, false),
            Some(None) => {
                tracing::debug!(
                    requested = ?requested,
                    fallback = %default.key(),
                    "unrecognized sort, using default"
                );
                (default, true)
            }
            None => (default, false),
        };

        Self {
            spec,
            plan: plan_for(spec, policy),
            fell_back,
        }
    }

    /// The resolved sort orders by views.
    pub fn sorts_by_views(&self) -> bool {
        matches!(
            self.spec,
            SortSpec::Field {
                field: SortField::Views,
                ..
            }
        )
    }

    /// The resolved sort orders by price.
    pub fn sorts_by_price(&self) -> bool {
        matches!(
            self.spec,
            SortSpec::Field {
                field: SortField::Price,
                ..
            }
        )
    }
}

/// Expand a sort selection into its ordering plan.
pub fn plan_for(spec: SortSpec, policy: PromotionPolicy) -> OrderPlan {
    let keys = match (spec, policy.featured_first) {
        (SortSpec::Random, true) => vec![OrderKey::FeaturedRandom],
        (SortSpec::Random, false) => vec![OrderKey::Random],
        (SortSpec::Field { field, direction }, true) => {
            vec![OrderKey::Featured, OrderKey::Field { field, direction }]
        }
        (SortSpec::Field { field, direction }, false) => {
            vec![OrderKey::Field { field, direction }]
        }
    };
    OrderPlan { keys }
}
