use async_trait::async_trait;
use sqlx::{Connection, PgPool};

use crate::error::{AppError, AppResult};
use crate::models::{DependentKind, DependentRecord, Group, GroupCounter};
use crate::store::GroupStore;

/// [`GroupStore`] backed by the Postgres schema in `migrations/`.
///
/// Table and column names interpolated into SQL come from the static
/// [`DependentKind`] descriptors and [`GroupCounter::column`], never from input.
#[derive(Clone)]
pub struct PgGroupStore {
    pool: PgPool,
}

impl PgGroupStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// `SET` clause adding the source row's counters onto the destination row
fn counter_assignments(kind: &DependentKind) -> String {
    kind.counters
        .iter()
        .map(|c| format!("{c} = dst.{c} + src.{c}"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Join condition matching rows that share the unique key apart from `group_id`
fn unique_key_match(columns: &[&str]) -> String {
    columns
        .iter()
        .map(|c| format!(" AND dst.{c} IS NOT DISTINCT FROM src.{c}"))
        .collect()
}

#[async_trait]
impl GroupStore for PgGroupStore {
    async fn get_group(&self, id: i64) -> AppResult<Option<Group>> {
        let group = sqlx::query_as::<_, Group>("SELECT * FROM groups WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(group)
    }

    async fn get_groups(&self, ids: &[i64]) -> AppResult<Vec<Group>> {
        let groups =
            sqlx::query_as::<_, Group>("SELECT * FROM groups WHERE id = ANY($1) ORDER BY id")
                .bind(ids)
                .fetch_all(&self.pool)
                .await?;

        Ok(groups)
    }

    async fn get_redirect_target(&self, previous_group_id: i64) -> AppResult<Option<i64>> {
        let target: Option<i64> = sqlx::query_scalar(
            "SELECT group_id FROM group_redirects WHERE previous_group_id = $1",
        )
        .bind(previous_group_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(target)
    }

    async fn environment_ids(&self, project_id: i64) -> AppResult<Vec<i64>> {
        let ids: Vec<i64> =
            sqlx::query_scalar("SELECT id FROM environments WHERE project_id = $1 ORDER BY id")
                .bind(project_id)
                .fetch_all(&self.pool)
                .await?;

        Ok(ids)
    }

    async fn fetch_dependents(
        &self,
        kind: &DependentKind,
        source: &Group,
        limit: i64,
    ) -> AppResult<Vec<DependentRecord>> {
        let records = if kind.project_scoped {
            let sql = format!(
                "SELECT id, group_id FROM {} WHERE project_id = $1 AND group_id = $2 ORDER BY id LIMIT $3",
                kind.table
            );
            sqlx::query_as::<_, DependentRecord>(&sql)
                .bind(source.project_id)
                .bind(source.id)
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
        } else {
            let sql = format!(
                "SELECT id, group_id FROM {} WHERE group_id = $1 ORDER BY id LIMIT $2",
                kind.table
            );
            sqlx::query_as::<_, DependentRecord>(&sql)
                .bind(source.id)
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
        };

        Ok(records)
    }

    async fn reassign_dependent(
        &self,
        kind: &DependentKind,
        record: &DependentRecord,
        source: &Group,
        destination: &Group,
    ) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;

        let result = if kind.project_scoped {
            let sql = format!(
                "UPDATE {} SET group_id = $1 WHERE id = $2 AND project_id = $3",
                kind.table
            );
            sqlx::query(&sql)
                .bind(destination.id)
                .bind(record.id)
                .bind(source.project_id)
                .execute(&mut *tx)
                .await
        } else {
            let sql = format!("UPDATE {} SET group_id = $1 WHERE id = $2", kind.table);
            sqlx::query(&sql)
                .bind(destination.id)
                .bind(record.id)
                .execute(&mut *tx)
                .await
        };

        match result {
            Ok(_) => {
                tx.commit().await?;
                Ok(())
            }
            Err(e) => {
                // The failed statement aborted the transaction
                tx.rollback().await?;
                Err(e.into())
            }
        }
    }

    async fn absorb_dependent(
        &self,
        kind: &DependentKind,
        record: &DependentRecord,
        destination: &Group,
    ) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;

        if let Some(unique) = kind.unique_with_group.filter(|_| kind.has_counters()) {
            let sql = format!(
                r#"
                UPDATE {table} AS dst
                SET {assignments}
                FROM {table} AS src
                WHERE src.id = $1 AND dst.group_id = $2 AND dst.id <> src.id{key_match}
                "#,
                table = kind.table,
                assignments = counter_assignments(kind),
                key_match = unique_key_match(unique),
            );

            sqlx::query(&sql)
                .bind(record.id)
                .bind(destination.id)
                .execute(&mut *tx)
                .await?;
        }

        let sql = format!("DELETE FROM {} WHERE id = $1", kind.table);
        sqlx::query(&sql).bind(record.id).execute(&mut *tx).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn finalize_source(
        &self,
        source: &Group,
        destination: &Group,
    ) -> AppResult<Vec<GroupCounter>> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO group_redirects (project_id, group_id, previous_group_id)
            VALUES ($1, $2, $3)
            ON CONFLICT (previous_group_id)
            DO UPDATE SET group_id = EXCLUDED.group_id, date_added = NOW()
            "#,
        )
        .bind(destination.project_id)
        .bind(destination.id)
        .bind(source.id)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM group_history WHERE group_id = $1")
            .bind(source.id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM group_inbox WHERE group_id = $1")
            .bind(source.id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM groups WHERE id = $1")
            .bind(source.id)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            UPDATE groups
            SET first_seen = LEAST(first_seen, $2),
                last_seen = GREATEST(last_seen, $3)
            WHERE id = $1
            "#,
        )
        .bind(destination.id)
        .bind(source.first_seen)
        .bind(source.last_seen)
        .execute(&mut *tx)
        .await?;

        let mut skipped = Vec::new();
        for counter in GroupCounter::ALL {
            let sql = format!(
                "UPDATE groups SET {column} = {column} + $2 WHERE id = $1",
                column = counter.column()
            );

            // Savepoint, so an overflow only rolls back this increment
            let mut savepoint = tx.begin().await?;
            let result = sqlx::query(&sql)
                .bind(destination.id)
                .bind(i64::from(counter.value(source)))
                .execute(&mut *savepoint)
                .await;

            match result.map_err(AppError::from) {
                Ok(_) => savepoint.commit().await?,
                Err(AppError::OutOfRange(_)) => {
                    savepoint.rollback().await?;
                    skipped.push(counter);
                }
                Err(e) => return Err(e),
            }
        }

        tx.commit().await?;
        Ok(skipped)
    }

    async fn record_activity(
        &self,
        group: &Group,
        kind: &str,
        data: serde_json::Value,
    ) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO activities (project_id, group_id, kind, data) VALUES ($1, $2, $3, $4)",
        )
        .bind(group.project_id)
        .bind(group.id)
        .bind(kind)
        .bind(data)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
