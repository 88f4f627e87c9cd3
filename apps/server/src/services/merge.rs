use std::collections::HashSet;
use std::time::Duration;

use serde_json::json;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{Group, Job, MergeGroupsArgs, MergeQueuedResponse, MergeSummary};
use crate::tasks::TaskContext;

pub struct MergeService;

impl MergeService {
    /// Picks the group the others merge into: most events, then the oldest id
    pub fn select_primary(groups: &[Group]) -> Option<&Group> {
        groups.iter().max_by(|a, b| {
            a.times_seen
                .cmp(&b.times_seen)
                .then_with(|| b.id.cmp(&a.id))
        })
    }

    /// Validates a merge request and queues the first `merge_groups` invocation.
    ///
    /// Every group must exist and belong to `project_id`. Forecasts of all
    /// involved groups are dropped by the first invocation and the primary's
    /// forecast is regenerated once the merge completes.
    pub async fn queue_merge(
        ctx: &TaskContext,
        project_id: i64,
        group_ids: &[i64],
    ) -> AppResult<MergeQueuedResponse> {
        let mut seen = HashSet::new();
        let ids: Vec<i64> = group_ids
            .iter()
            .copied()
            .filter(|id| seen.insert(*id))
            .collect();

        if ids.len() < 2 {
            return Err(AppError::Validation(
                "At least two distinct groups are required to merge".to_string(),
            ));
        }

        let groups = ctx.store.get_groups(&ids).await?;
        for id in &ids {
            let in_project = groups
                .iter()
                .any(|g| g.id == *id && g.project_id == project_id);
            if !in_project {
                return Err(AppError::NotFound(format!("Group {} not found", id)));
            }
        }

        let primary = Self::select_primary(&groups)
            .cloned()
            .ok_or_else(|| AppError::Internal("No primary group selected".to_string()))?;
        let children: Vec<i64> = ids.iter().copied().filter(|id| *id != primary.id).collect();

        ctx.store
            .record_activity(&primary, "merge", json!({ "issues": children }))
            .await?;

        let state = ctx
            .eventstream
            .start_merge(project_id, &children, primary.id)
            .await?;
        let transaction_id = Uuid::new_v4().simple().to_string();

        let args = MergeGroupsArgs::new(children.clone(), primary.id)
            .with_transaction_id(transaction_id.clone())
            .with_eventstream_state(state)
            .with_forecasts(ids.clone(), true);

        ctx.queue
            .enqueue(&Job::MergeGroups(args), Duration::ZERO)
            .await?;

        log::info!(
            "merge.requested transaction_id={} project_id={} parent={} children={:?}",
            transaction_id,
            project_id,
            primary.id,
            children
        );

        Ok(MergeQueuedResponse {
            merge: MergeSummary {
                parent: primary.id,
                children,
            },
            transaction_id,
        })
    }
}
