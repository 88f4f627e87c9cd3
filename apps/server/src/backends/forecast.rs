use async_trait::async_trait;
use chrono::{Duration, Utc};
use sqlx::types::Json;
use sqlx::PgPool;

use crate::backends::tsdb::NO_ENVIRONMENT;
use crate::backends::{ForecastEngine, HourlyCountCache};
use crate::error::AppResult;
use crate::models::{Group, TsdbModel};

/// Days covered by one forecast: one event-count threshold per day
pub const FORECAST_DAYS: usize = 14;

/// Hours of history a forecast is built from
pub const HISTORY_HOURS: i64 = 7 * 24;

/// Lowest daily threshold a forecast ever predicts
pub const MIN_FORECAST: i64 = 10;

/// Headroom applied to the observed daily average
const ESCALATION_FACTOR: f64 = 1.5;

/// Builds a daily escalation forecast from hourly event counts.
///
/// Every day of the forecast gets the same threshold: the observed daily
/// average with headroom, never below [`MIN_FORECAST`].
pub fn compute_forecast(hourly_counts: &[i64]) -> Vec<i64> {
    let total: i64 = hourly_counts.iter().copied().filter(|c| *c > 0).sum();
    let days = (hourly_counts.len().max(1) as f64 / 24.0).max(1.0);
    let daily_average = total as f64 / days;

    let threshold = ((daily_average * ESCALATION_FACTOR).ceil() as i64).max(MIN_FORECAST);
    vec![threshold; FORECAST_DAYS]
}

/// Forecasts in `group_forecasts`, fed by the `tsdb_counts` group series and
/// cached per group in `group_hourly_counts`
#[derive(Clone)]
pub struct PgForecastEngine {
    pool: PgPool,
}

impl PgForecastEngine {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Hourly counts for the last week, oldest first, served from the cache when present
    pub async fn hourly_counts(&self, group: &Group) -> AppResult<Vec<i64>> {
        let cached: Option<Json<Vec<i64>>> =
            sqlx::query_scalar("SELECT counts FROM group_hourly_counts WHERE group_id = $1")
                .bind(group.id)
                .fetch_optional(&self.pool)
                .await?;

        if let Some(Json(counts)) = cached {
            return Ok(counts);
        }

        let since = Utc::now() - Duration::hours(HISTORY_HOURS);
        let counts: Vec<i64> = sqlx::query_scalar(
            r#"
            SELECT COALESCE(c.value, 0)
            FROM generate_series(
                date_trunc('hour', $3::TIMESTAMPTZ),
                date_trunc('hour', NOW()) - INTERVAL '1 hour',
                INTERVAL '1 hour'
            ) AS h(bucket)
            LEFT JOIN tsdb_counts c
              ON c.bucket = h.bucket AND c.model = $1 AND c.key = $2 AND c.environment_id = $4
            ORDER BY h.bucket
            "#,
        )
        .bind(TsdbModel::Group.as_str())
        .bind(group.id)
        .bind(since)
        .bind(NO_ENVIRONMENT)
        .fetch_all(&self.pool)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO group_hourly_counts (group_id, counts, computed_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (group_id) DO UPDATE SET counts = EXCLUDED.counts, computed_at = NOW()
            "#,
        )
        .bind(group.id)
        .bind(Json(&counts))
        .execute(&self.pool)
        .await?;

        Ok(counts)
    }

    /// Stored forecast of a group, if any
    pub async fn get(&self, group_id: i64) -> AppResult<Option<Vec<i64>>> {
        let forecast: Option<Json<Vec<i64>>> =
            sqlx::query_scalar("SELECT forecast FROM group_forecasts WHERE group_id = $1")
                .bind(group_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(forecast.map(|Json(f)| f))
    }
}

#[async_trait]
impl ForecastEngine for PgForecastEngine {
    async fn generate_and_save_forecasts(&self, groups: &[Group]) -> AppResult<()> {
        for group in groups {
            let counts = self.hourly_counts(group).await?;
            let forecast = compute_forecast(&counts);

            sqlx::query(
                r#"
                INSERT INTO group_forecasts (group_id, project_id, forecast, date_added)
                VALUES ($1, $2, $3, NOW())
                ON CONFLICT (group_id)
                DO UPDATE SET forecast = EXCLUDED.forecast, date_added = NOW()
                "#,
            )
            .bind(group.id)
            .bind(group.project_id)
            .bind(Json(&forecast))
            .execute(&self.pool)
            .await?;

            log::info!(
                "forecast.saved group_id={} threshold={}",
                group.id,
                forecast.first().copied().unwrap_or(MIN_FORECAST)
            );
        }
        Ok(())
    }

    async fn delete(&self, project_id: i64, group_id: i64) -> AppResult<()> {
        sqlx::query("DELETE FROM group_forecasts WHERE project_id = $1 AND group_id = $2")
            .bind(project_id)
            .bind(group_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl HourlyCountCache for PgForecastEngine {
    async fn invalidate(&self, group: &Group) -> AppResult<()> {
        sqlx::query("DELETE FROM group_hourly_counts WHERE group_id = $1")
            .bind(group.id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
