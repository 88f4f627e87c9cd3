use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::backends::EventStream;
use crate::error::AppResult;
use crate::models::MergeState;

/// Writes merge notifications to the `eventstream_messages` outbox
#[derive(Clone)]
pub struct PgEventStream {
    pool: PgPool,
}

impl PgEventStream {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn publish(&self, kind: &str, payload: &serde_json::Value) -> AppResult<()> {
        sqlx::query("INSERT INTO eventstream_messages (kind, payload) VALUES ($1, $2)")
            .bind(kind)
            .bind(payload)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl EventStream for PgEventStream {
    async fn start_merge(
        &self,
        project_id: i64,
        previous_group_ids: &[i64],
        new_group_id: i64,
    ) -> AppResult<MergeState> {
        let state = json!({
            "transaction_id": Uuid::new_v4().simple().to_string(),
            "project_id": project_id,
            "previous_group_ids": previous_group_ids,
            "new_group_id": new_group_id,
            "datetime": Utc::now(),
        });

        self.publish("start_merge", &state).await?;
        log::debug!(
            "eventstream.start_merge project_id={} new_group_id={} previous_group_ids={:?}",
            project_id,
            new_group_id,
            previous_group_ids
        );

        Ok(MergeState(state))
    }

    async fn end_merge(&self, state: &MergeState) -> AppResult<()> {
        self.publish("end_merge", &state.0).await?;
        log::debug!("eventstream.end_merge state={}", state.0);
        Ok(())
    }
}
