use async_trait::async_trait;
use sqlx::PgPool;

use crate::backends::Tsdb;
use crate::error::AppResult;
use crate::models::TsdbModel;

/// Environment id of the series that aggregates every environment
pub const NO_ENVIRONMENT: i64 = 0;

/// Rollups kept in `tsdb_counts`, `tsdb_distinct_counts` and `tsdb_frequencies`.
///
/// A merge folds every source series into the destination key and then removes
/// the source rows, all in one transaction per call.
#[derive(Clone)]
pub struct PgTsdb {
    pool: PgPool,
}

impl PgTsdb {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Records `count` events for a group in the bucket containing `timestamp`
    pub async fn incr(
        &self,
        model: TsdbModel,
        key: i64,
        environment_id: Option<i64>,
        timestamp: chrono::DateTime<chrono::Utc>,
        count: i64,
    ) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO tsdb_counts (model, key, environment_id, bucket, value)
            VALUES ($1, $2, $3, date_trunc('hour', $4), $5)
            ON CONFLICT (model, key, environment_id, bucket)
            DO UPDATE SET value = tsdb_counts.value + EXCLUDED.value
            "#,
        )
        .bind(model.as_str())
        .bind(key)
        .bind(environment_id.unwrap_or(NO_ENVIRONMENT))
        .bind(timestamp)
        .bind(count)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

/// Environments whose series take part in a merge
fn merged_environments(environment_ids: Option<&[i64]>) -> Vec<i64> {
    let mut envs = vec![NO_ENVIRONMENT];
    if let Some(ids) = environment_ids {
        envs.extend(ids.iter().copied().filter(|id| *id != NO_ENVIRONMENT));
    }
    envs
}

#[async_trait]
impl Tsdb for PgTsdb {
    async fn merge(
        &self,
        model: TsdbModel,
        destination: i64,
        sources: &[i64],
        environment_ids: Option<&[i64]>,
    ) -> AppResult<()> {
        let envs = merged_environments(environment_ids);
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO tsdb_counts (model, key, environment_id, bucket, value)
            SELECT model, $2, environment_id, bucket, SUM(value)
            FROM tsdb_counts
            WHERE model = $1 AND key = ANY($3) AND environment_id = ANY($4)
            GROUP BY model, environment_id, bucket
            ON CONFLICT (model, key, environment_id, bucket)
            DO UPDATE SET value = tsdb_counts.value + EXCLUDED.value
            "#,
        )
        .bind(model.as_str())
        .bind(destination)
        .bind(sources)
        .bind(&envs)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "DELETE FROM tsdb_counts WHERE model = $1 AND key = ANY($2) AND environment_id = ANY($3)",
        )
        .bind(model.as_str())
        .bind(sources)
        .bind(&envs)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn merge_distinct_counts(
        &self,
        model: TsdbModel,
        destination: i64,
        sources: &[i64],
        environment_ids: Option<&[i64]>,
    ) -> AppResult<()> {
        let envs = merged_environments(environment_ids);
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO tsdb_distinct_counts (model, key, environment_id, bucket, member)
            SELECT DISTINCT model, $2::BIGINT, environment_id, bucket, member
            FROM tsdb_distinct_counts
            WHERE model = $1 AND key = ANY($3) AND environment_id = ANY($4)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(model.as_str())
        .bind(destination)
        .bind(sources)
        .bind(&envs)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "DELETE FROM tsdb_distinct_counts WHERE model = $1 AND key = ANY($2) AND environment_id = ANY($3)",
        )
        .bind(model.as_str())
        .bind(sources)
        .bind(&envs)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn merge_frequencies(
        &self,
        model: TsdbModel,
        destination: i64,
        sources: &[i64],
        environment_ids: Option<&[i64]>,
    ) -> AppResult<()> {
        let envs = merged_environments(environment_ids);
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO tsdb_frequencies (model, key, environment_id, bucket, member, score)
            SELECT model, $2, environment_id, bucket, member, SUM(score)
            FROM tsdb_frequencies
            WHERE model = $1 AND key = ANY($3) AND environment_id = ANY($4)
            GROUP BY model, environment_id, bucket, member
            ON CONFLICT (model, key, environment_id, bucket, member)
            DO UPDATE SET score = tsdb_frequencies.score + EXCLUDED.score
            "#,
        )
        .bind(model.as_str())
        .bind(destination)
        .bind(sources)
        .bind(&envs)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "DELETE FROM tsdb_frequencies WHERE model = $1 AND key = ANY($2) AND environment_id = ANY($3)",
        )
        .bind(model.as_str())
        .bind(sources)
        .bind(&envs)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }
}
