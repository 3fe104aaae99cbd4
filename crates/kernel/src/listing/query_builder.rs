//! Listing query builder using SeaQuery.
//!
//! Renders a [`CompoundQuery`] into PostgreSQL with support for:
//! - JSONB metadata comparisons (text, numeric, substring, existence)
//! - Taxonomy filters with term hierarchy expansion
//! - Radius search over stored coordinates
//! - Full-text search
//! - Featured promotion, random order and pagination
//!
//! User-supplied values, including metadata keys, are always bound through
//! `$N` placeholders, never spliced into SQL text.

use sea_query::{
    Asterisk, Cond, Expr, Iden, Order, PostgresQueryBuilder, Query, SelectStatement, SimpleExpr,
    Value,
};

use super::types::{
    Compare, CompoundQuery, GeoQuery, IdFilter, MetaClause, MetaValue, OrderKey, Predicate,
    Relation, SortDirection, SortField, TaxonomyClause, TermMatch, meta_keys,
};

/// Listing table and columns.
#[derive(Iden)]
enum Listing {
    Table,
    Id,
    PostType,
    Status,
    Title,
    Created,
}

/// Pattern a metadata value must match before it is cast to numeric.
const NUMERIC_PATTERN: &str = r"^\s*-?[0-9]+(\.[0-9]+)?\s*$";

/// Query builder for composed listing queries.
pub struct ListingQueryBuilder<'a> {
    query: &'a CompoundQuery,
}

impl<'a> ListingQueryBuilder<'a> {
    pub fn new(query: &'a CompoundQuery) -> Self {
        Self { query }
    }

    /// Build the page query selecting listing IDs in result order.
    pub fn build(&self) -> String {
        let mut query = Query::select();
        query
            .column((Listing::Table, Listing::Id))
            .from(Listing::Table);

        self.add_filters(&mut query);
        self.add_order(&mut query);

        let pagination = self.query.pagination;
        query.limit(u64::from(pagination.per_page));
        query.offset(pagination.offset());

        query.to_string(PostgresQueryBuilder)
    }

    /// Build a COUNT query for total results.
    pub fn build_count(&self) -> String {
        let mut query = Query::select();
        query.expr(Expr::col(Asterisk).count()).from(Listing::Table);

        self.add_filters(&mut query);

        query.to_string(PostgresQueryBuilder)
    }

    /// Build the query enumerating every published listing of a post type.
    pub fn candidate_ids(post_type: &str, post_status: &str) -> String {
        Query::select()
            .column((Listing::Table, Listing::Id))
            .from(Listing::Table)
            .and_where(Expr::col((Listing::Table, Listing::PostType)).eq(post_type))
            .and_where(Expr::col((Listing::Table, Listing::Status)).eq(post_status))
            .order_by((Listing::Table, Listing::Id), Order::Asc)
            .to_string(PostgresQueryBuilder)
    }

    /// Add WHERE conditions shared by the page and count queries.
    fn add_filters(&self, query: &mut SelectStatement) {
        query.and_where(
            Expr::col((Listing::Table, Listing::PostType)).eq(self.query.post_type.as_str()),
        );
        query.and_where(
            Expr::col((Listing::Table, Listing::Status)).eq(self.query.post_status.as_str()),
        );

        for predicate in self.query.taxonomy.iter().chain(&self.query.meta) {
            if let Some(condition) = predicate_expr(predicate) {
                query.and_where(condition);
            }
        }

        match &self.query.ids {
            IdFilter::Unrestricted => {}
            // An empty allow-list restricts everything
            IdFilter::AllowList(ids) if ids.is_empty() => {
                query.and_where(Expr::cust("FALSE"));
            }
            IdFilter::AllowList(ids) => {
                query.and_where(
                    Expr::col((Listing::Table, Listing::Id)).is_in(ids.iter().copied()),
                );
            }
        }

        if let Some(geo) = &self.query.geo {
            query.and_where(geo_expr(geo));
        }

        if let Some(text) = &self.query.search
            && let Some(tsquery) = tsquery_terms(text)
        {
            query.and_where(Expr::cust_with_values(
                "listing.search_vector @@ to_tsquery('english', $1)",
                [tsquery],
            ));
        }
    }

    /// Add ORDER BY clauses, ending with an ID tie-breaker for stable paging.
    fn add_order(&self, query: &mut SelectStatement) {
        for key in &self.query.order.keys {
            match key {
                OrderKey::Featured => {
                    query.order_by_expr(numeric_sort_expr(meta_keys::FEATURED), Order::Desc);
                }
                OrderKey::Field { field, direction } => {
                    let order = match direction {
                        SortDirection::Asc => Order::Asc,
                        SortDirection::Desc => Order::Desc,
                    };
                    match field {
                        SortField::Title => {
                            query.order_by((Listing::Table, Listing::Title), order);
                        }
                        SortField::Date => {
                            query.order_by((Listing::Table, Listing::Created), order);
                        }
                        SortField::Price => {
                            query.order_by_expr(numeric_sort_expr(meta_keys::PRICE), order);
                        }
                        SortField::Views => {
                            query.order_by_expr(numeric_sort_expr(meta_keys::VIEW_COUNT), order);
                        }
                    }
                }
                OrderKey::Random => {
                    query.order_by_expr(Expr::cust("RANDOM()"), Order::Asc);
                }
                OrderKey::FeaturedRandom => {
                    query.order_by_expr(numeric_sort_expr(meta_keys::FEATURED), Order::Desc);
                    query.order_by_expr(Expr::cust("RANDOM()"), Order::Asc);
                }
            }
        }

        if !self.query.order.contains_random() {
            query.order_by((Listing::Table, Listing::Id), Order::Asc);
        }
    }
}

/// Custom SQL fragment with positional values.
#[derive(Default)]
struct Fragment {
    values: Vec<Value>,
}

impl Fragment {
    /// Bind a value and return its placeholder.
    fn bind(&mut self, value: impl Into<Value>) -> String {
        self.values.push(value.into());
        format!("${}", self.values.len())
    }

    /// Text of a metadata field; NULL when absent.
    fn field(&mut self, key: &str) -> String {
        format!("(listing.fields ->> {})", self.bind(key.to_string()))
    }

    /// Numeric value of a metadata field; NULL when absent or not a number.
    fn numeric_field(&mut self, key: &str) -> String {
        let text = self.field(key);
        let pattern = self.bind(NUMERIC_PATTERN.to_string());
        let cast = self.field(key);
        format!("(CASE WHEN {text} ~ {pattern} THEN {cast}::numeric END)")
    }

    fn finish(self, sql: String) -> SimpleExpr {
        if self.values.is_empty() {
            Expr::cust(sql)
        } else {
            Expr::cust_with_values(sql, self.values)
        }
    }
}

/// Render a predicate tree node. Empty groups render nothing.
fn predicate_expr(predicate: &Predicate) -> Option<SimpleExpr> {
    match predicate {
        Predicate::Taxonomy(clause) => taxonomy_expr(clause),
        Predicate::Meta(clause) => Some(meta_expr(clause)),
        Predicate::Group {
            relation,
            predicates,
        } => {
            let children: Vec<SimpleExpr> = predicates.iter().filter_map(predicate_expr).collect();
            if children.is_empty() {
                return None;
            }
            let mut cond = match relation {
                Relation::And => Cond::all(),
                Relation::Or => Cond::any(),
            };
            for child in children {
                cond = cond.add(child);
            }
            Some(cond.into())
        }
    }
}

/// Build a taxonomy condition as an EXISTS subquery.
///
/// With descendants, a recursive CTE expands the matched terms down the
/// term hierarchy. `UNION` keeps cyclic parent links from looping.
fn taxonomy_expr(clause: &TaxonomyClause) -> Option<SimpleExpr> {
    if clause.terms.is_empty() {
        return None;
    }

    let mut fragment = Fragment::default();
    let taxonomy = fragment.bind(clause.taxonomy.as_str());
    let (column, placeholders) = match &clause.terms {
        TermMatch::Slug(slugs) => (
            "slug",
            slugs
                .iter()
                .map(|slug| fragment.bind(slug.clone()))
                .collect::<Vec<_>>(),
        ),
        TermMatch::TermId(ids) => (
            "id",
            ids.iter().map(|id| fragment.bind(*id)).collect::<Vec<_>>(),
        ),
    };
    let terms = placeholders.join(", ");

    let sql = if clause.include_descendants {
        format!(
            "EXISTS (WITH RECURSIVE matched AS (\
             SELECT term.id FROM term \
             WHERE term.taxonomy = {taxonomy} AND term.{column} IN ({terms}) \
             UNION SELECT child.id FROM term child \
             INNER JOIN matched ON child.parent_id = matched.id) \
             SELECT 1 FROM listing_term WHERE listing_term.listing_id = listing.id \
             AND listing_term.term_id IN (SELECT matched.id FROM matched))"
        )
    } else {
        format!(
            "EXISTS (SELECT 1 FROM listing_term INNER JOIN term ON term.id = listing_term.term_id \
             WHERE listing_term.listing_id = listing.id AND term.taxonomy = {taxonomy} \
             AND term.{column} IN ({terms}))"
        )
    };

    Some(fragment.finish(sql))
}

/// Build a metadata condition.
fn meta_expr(clause: &MetaClause) -> SimpleExpr {
    let mut fragment = Fragment::default();

    let sql = match clause.compare {
        Compare::Exists if clause.numeric => {
            format!("NULLIF({}, '') IS NOT NULL", fragment.field(&clause.key))
        }
        Compare::Exists => format!("{} IS NOT NULL", fragment.field(&clause.key)),
        Compare::Like => {
            let Some(text) = clause.value.as_text() else {
                return restrict(clause);
            };
            let field = fragment.field(&clause.key);
            let pattern = fragment.bind(format!("%{}%", escape_like_wildcards(&text)));
            format!("{field} ILIKE {pattern}")
        }
        Compare::Between => {
            let MetaValue::Range(min, max) = clause.value else {
                return restrict(clause);
            };
            let field = fragment.numeric_field(&clause.key);
            let min = fragment.bind(min);
            let max = fragment.bind(max);
            format!("{field} BETWEEN {min} AND {max}")
        }
        compare if clause.numeric || is_ordering(compare) => {
            let Some(value) = numeric_value(&clause.value) else {
                return restrict(clause);
            };
            let field = fragment.numeric_field(&clause.key);
            let value = fragment.bind(value);
            format!("{field} {} {value}", operator(compare))
        }
        compare => {
            let Some(text) = clause.value.as_text() else {
                return restrict(clause);
            };
            let field = fragment.field(&clause.key);
            let value = fragment.bind(text);
            format!("{field} {} {value}", operator(compare))
        }
    };

    fragment.finish(sql)
}

fn is_ordering(compare: Compare) -> bool {
    matches!(compare, Compare::GreaterOrEqual | Compare::LessOrEqual)
}

/// SQL operator for the remaining comparisons. A missing key is distinct
/// from any value, so `!=` keeps listings that never set the field.
fn operator(compare: Compare) -> &'static str {
    match compare {
        Compare::NotEquals => "IS DISTINCT FROM",
        Compare::GreaterOrEqual => ">=",
        Compare::LessOrEqual => "<=",
        _ => "=",
    }
}

fn numeric_value(value: &MetaValue) -> Option<Value> {
    match value {
        MetaValue::Integer(i) => Some(Value::from(*i)),
        other => other.as_f64().filter(|v| v.is_finite()).map(Value::from),
    }
}

/// Clause whose value cannot be compared; restrict rather than widen.
fn restrict(clause: &MetaClause) -> SimpleExpr {
    tracing::warn!(
        key = %clause.key,
        compare = ?clause.compare,
        "metadata value not comparable; restricting results"
    );
    Expr::cust("FALSE")
}

/// Numeric metadata sort key; missing values sort as zero.
fn numeric_sort_expr(key: &str) -> SimpleExpr {
    let mut fragment = Fragment::default();
    let field = fragment.numeric_field(key);
    fragment.finish(format!("COALESCE({field}, 0)"))
}

/// Great-circle distance from the search point, within the radius.
fn geo_expr(geo: &GeoQuery) -> SimpleExpr {
    let mut fragment = Fragment::default();
    let lat = format!("{}::float8", fragment.numeric_field(&geo.lat_field));
    let lng = format!("{}::float8", fragment.numeric_field(&geo.lng_field));
    let origin_lat = fragment.bind(geo.latitude);
    let origin_lat_cos = fragment.bind(geo.latitude);
    let origin_lng = fragment.bind(geo.longitude);
    let radius = fragment.bind(geo.units.earth_radius());
    let distance = fragment.bind(geo.distance);

    fragment.finish(format!(
        "(2 * {radius} * asin(sqrt(\
         power(sin(radians({lat} - {origin_lat}) / 2), 2) + \
         cos(radians({origin_lat_cos})) * cos(radians({lat})) * \
         power(sin(radians({lng} - {origin_lng}) / 2), 2)))) <= {distance}"
    ))
}

/// Sanitize free text into `&`-joined tsquery terms.
fn tsquery_terms(text: &str) -> Option<String> {
    // Keep only alphanumeric + spaces, then join with &
    let sanitized: String = text
        .chars()
        .map(|c| if c.is_alphanumeric() || c == ' ' { c } else { ' ' })
        .collect();
    let terms: Vec<&str> = sanitized.split_whitespace().collect();
    if terms.is_empty() {
        return None;
    }
    Some(terms.join(" & "))
}

/// Escape SQL LIKE wildcard characters (`%`, `_`, `\`) in a value.
fn escape_like_wildcards(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listing::types::{
        DistanceUnit, OrderPlan, Pagination, PromotionPolicy, SortSpec, Taxonomy,
    };
    use crate::listing::order::plan_for;

    fn query() -> CompoundQuery {
        CompoundQuery {
            post_type: "at_biz_dir".to_string(),
            post_status: "publish".to_string(),
            pagination: Pagination {
                page: 1,
                per_page: 6,
                count_total: true,
            },
            taxonomy: Vec::new(),
            meta: Vec::new(),
            ids: IdFilter::Unrestricted,
            order: OrderPlan { keys: Vec::new() },
            geo: None,
            search: None,
        }
    }

    #[test]
    fn base_query() {
        let sql = ListingQueryBuilder::new(&query()).build();
        assert!(sql.starts_with(r#"SELECT "listing"."id" FROM "listing""#));
        assert!(sql.contains(r#""listing"."post_type" = 'at_biz_dir'"#));
        assert!(sql.contains(r#""listing"."status" = 'publish'"#));
        assert!(sql.contains(r#"ORDER BY "listing"."id" ASC"#));
        assert!(sql.contains("LIMIT 6"));
    }

    #[test]
    fn count_query_has_no_paging() {
        let sql = ListingQueryBuilder::new(&query()).build_count();
        assert!(sql.contains("COUNT(*)"));
        assert!(!sql.contains("LIMIT"));
        assert!(!sql.contains("ORDER BY"));
    }

    #[test]
    fn offset_from_page() {
        let mut q = query();
        q.pagination.page = 3;
        let sql = ListingQueryBuilder::new(&q).build();
        assert!(sql.contains("OFFSET 12"));
    }

    #[test]
    fn empty_allow_list_restricts() {
        let mut q = query();
        q.ids = IdFilter::AllowList(Default::default());
        assert!(ListingQueryBuilder::new(&q).build().contains("FALSE"));

        q.ids = IdFilter::AllowList([3, 1].into());
        let sql = ListingQueryBuilder::new(&q).build();
        assert!(sql.contains(r#""listing"."id" IN (1, 3)"#));
    }

    #[test]
    fn taxonomy_with_descendants() {
        let mut q = query();
        q.taxonomy = vec![Predicate::Taxonomy(TaxonomyClause {
            taxonomy: Taxonomy::Category,
            terms: TermMatch::Slug(["cafes".into()].into()),
            include_descendants: true,
        })];
        let sql = ListingQueryBuilder::new(&q).build();
        assert!(sql.contains("EXISTS (WITH RECURSIVE matched"));
        assert!(sql.contains("'at_biz_dir-category'"));
        assert!(sql.contains("'cafes'"));
    }

    #[test]
    fn taxonomy_without_descendants() {
        let clause = TaxonomyClause {
            taxonomy: Taxonomy::Tag,
            terms: TermMatch::TermId([4, 9].into()),
            include_descendants: false,
        };
        let mut q = query();
        q.taxonomy = vec![Predicate::Taxonomy(clause)];
        let sql = ListingQueryBuilder::new(&q).build();
        assert!(sql.contains("term.id IN (4, 9)"));
        assert!(!sql.contains("RECURSIVE"));
    }

    #[test]
    fn metadata_keys_are_bound() {
        let mut q = query();
        q.meta = vec![Predicate::Meta(MetaClause::like("x' OR '1'='1", "cozy"))];
        let sql = ListingQueryBuilder::new(&q).build();
        assert!(sql.contains("ILIKE '%cozy%'"));
        assert!(!sql.contains("->> 'x' OR"));
    }

    #[test]
    fn or_group_renders_or() {
        let mut q = query();
        q.meta = vec![Predicate::or(vec![
            Predicate::Meta(MetaClause::like("_phone2", "555")),
            Predicate::Meta(MetaClause::like("_phone", "555")),
        ])];
        let sql = ListingQueryBuilder::new(&q).build();
        assert!(sql.contains(" OR "));
    }

    #[test]
    fn not_equals_is_lenient() {
        let mut q = query();
        q.meta = vec![Predicate::Meta(MetaClause::new(
            "_listing_status",
            Compare::NotEquals,
            MetaValue::Text("expired".into()),
        ))];
        let sql = ListingQueryBuilder::new(&q).build();
        assert!(sql.contains("IS DISTINCT FROM 'expired'"));
    }

    #[test]
    fn between_is_numeric() {
        let mut q = query();
        q.meta = vec![Predicate::Meta(
            MetaClause::new("_price", Compare::Between, MetaValue::Range(10, 50)).numeric(),
        )];
        let sql = ListingQueryBuilder::new(&q).build();
        assert!(sql.contains("::numeric END) BETWEEN 10 AND 50"));
    }

    #[test]
    fn uncomparable_value_restricts() {
        let mut q = query();
        q.meta = vec![Predicate::Meta(
            MetaClause::new("_price", Compare::Between, MetaValue::Integer(3)).numeric(),
        )];
        let sql = ListingQueryBuilder::new(&q).build();
        assert!(sql.contains("FALSE"));
    }

    #[test]
    fn featured_first_order() {
        let mut q = query();
        q.order = plan_for(
            SortSpec::field(SortField::Title, SortDirection::Asc),
            PromotionPolicy {
                featured_first: true,
            },
        );
        let sql = ListingQueryBuilder::new(&q).build();
        let featured = sql.find("'_featured'").unwrap();
        let title = sql.find(r#""listing"."title" ASC"#).unwrap();
        assert!(featured < title);
        assert!(sql.contains(r#""listing"."id" ASC LIMIT 6"#));
    }

    #[test]
    fn random_order_has_no_tie_breaker() {
        let mut q = query();
        q.order = plan_for(SortSpec::Random, PromotionPolicy::default());
        let sql = ListingQueryBuilder::new(&q).build();
        assert!(sql.contains("RANDOM()"));
        assert!(!sql.contains(r#""listing"."id" ASC"#));
    }

    #[test]
    fn geo_radius() {
        let mut q = query();
        q.geo = Some(GeoQuery {
            lat_field: "_manual_lat".into(),
            lng_field: "_manual_lng".into(),
            latitude: 40.5,
            longitude: -74.5,
            distance: 10.0,
            units: DistanceUnit::Kilometers,
        });
        let sql = ListingQueryBuilder::new(&q).build();
        assert!(sql.contains("asin(sqrt("));
        assert!(sql.contains("6371"));
    }

    #[test]
    fn full_text_sanitized() {
        let mut q = query();
        q.search = Some("coffee; shop!".into());
        let sql = ListingQueryBuilder::new(&q).build();
        assert!(sql.contains("to_tsquery('english', 'coffee & shop')"));

        q.search = Some("!!!".into());
        let sql = ListingQueryBuilder::new(&q).build();
        assert!(!sql.contains("to_tsquery"));
    }

    #[test]
    fn candidate_ids_query() {
        let sql = ListingQueryBuilder::candidate_ids("at_biz_dir", "publish");
        assert!(sql.contains(r#""listing"."post_type" = 'at_biz_dir'"#));
        assert!(sql.contains(r#"ORDER BY "listing"."id" ASC"#));
    }

    #[test]
    fn escape_like() {
        assert_eq!(escape_like_wildcards("50%_off"), "50\\%\\_off");
    }
}
