//! PostgreSQL listing executor and rating provider.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::PgPool;
use tracing::debug;

use super::{ListingStore, RatingProvider};
use crate::listing::composer::PUBLISHED;
use crate::listing::query_builder::ListingQueryBuilder;
use crate::listing::types::{CompoundQuery, ListingId, ListingPage};

/// Listing executor backed by PostgreSQL.
pub struct PgListingStore {
    pool: PgPool,
    post_type: String,
}

impl PgListingStore {
    pub fn new(pool: PgPool, post_type: impl Into<String>) -> Self {
        Self {
            pool,
            post_type: post_type.into(),
        }
    }
}

#[async_trait]
impl ListingStore for PgListingStore {
    async fn listing_ids(&self) -> Result<Vec<ListingId>> {
        let sql = ListingQueryBuilder::candidate_ids(&self.post_type, PUBLISHED);
        sqlx::query_scalar(&sql)
            .fetch_all(&self.pool)
            .await
            .context("failed to list candidate listings")
    }

    async fn execute(&self, query: &CompoundQuery) -> Result<ListingPage> {
        let builder = ListingQueryBuilder::new(query);
        let pagination = query.pagination;

        // Use a transaction so SET LOCAL applies correctly and resets on commit/rollback.
        let mut tx = self
            .pool
            .begin()
            .await
            .context("failed to begin transaction")?;

        sqlx::query("SET LOCAL statement_timeout = '10s'")
            .execute(&mut *tx)
            .await
            .context("failed to set statement timeout")?;

        let total: Option<i64> = if pagination.count_total {
            let count_sql = builder.build_count();
            let total = sqlx::query_scalar(&count_sql)
                .fetch_one(&mut *tx)
                .await
                .context("failed to execute count query")?;
            Some(total)
        } else {
            None
        };

        let main_sql = builder.build();
        debug!(sql = %main_sql, "executing listing query");
        let ids: Vec<ListingId> = sqlx::query_scalar(&main_sql)
            .fetch_all(&mut *tx)
            .await
            .context("failed to execute listing query")?;

        tx.commit()
            .await
            .context("failed to commit query transaction")?;

        let total = total.map_or(ids.len() as u64, |t| t.max(0) as u64);
        Ok(ListingPage::new(
            ids,
            total,
            pagination.page,
            pagination.per_page,
        ))
    }
}

/// Average of approved review ratings.
pub struct PgRatingProvider {
    pool: PgPool,
}

impl PgRatingProvider {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RatingProvider for PgRatingProvider {
    async fn average_for(&self, id: ListingId) -> Result<f64> {
        sqlx::query_scalar(
            "SELECT COALESCE(AVG(rating), 0)::float8 FROM review \
             WHERE listing_id = $1 AND status = 'approved'",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await
        .with_context(|| format!("failed to load average rating for listing {id}"))
    }
}
