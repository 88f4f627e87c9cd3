use async_trait::async_trait;
use sqlx::PgPool;

use crate::backends::SimilarityIndex;
use crate::error::{AppError, AppResult};

/// Similarity features stored as `(label, value)` pairs per group
#[derive(Clone)]
pub struct PgSimilarityIndex {
    pool: PgPool,
}

impl PgSimilarityIndex {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SimilarityIndex for PgSimilarityIndex {
    async fn merge(
        &self,
        project_id: i64,
        destination: i64,
        sources: &[i64],
        allow_unsafe: bool,
    ) -> AppResult<()> {
        if sources.is_empty() {
            return Ok(());
        }

        if !allow_unsafe {
            let live: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM groups WHERE id = ANY($1)")
                .bind(sources)
                .fetch_one(&self.pool)
                .await?;
            if live > 0 {
                return Err(AppError::Validation(format!(
                    "{} source group(s) still exist, refusing unsafe similarity merge",
                    live
                )));
            }
        }

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO similarity_features (project_id, group_id, label, value)
            SELECT project_id, $2, label, value
            FROM similarity_features
            WHERE project_id = $1 AND group_id = ANY($3)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(project_id)
        .bind(destination)
        .bind(sources)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM similarity_features WHERE project_id = $1 AND group_id = ANY($2)")
            .bind(project_id)
            .bind(sources)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}
