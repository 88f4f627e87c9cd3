//! Recursive group merge.
//!
//! A logical merge folds every source group into one destination. Each
//! invocation handles a single source and at most one batch of its dependent
//! records, then re-enqueues itself with the remaining sources. Every step can be
//! re-run with the same arguments, so a failed invocation is simply retried.

use std::time::Duration;

use crate::error::{AppError, AppResult};
use crate::models::{DependentKind, Group, Job, MergeGroupsArgs, RegenerateForecastArgs, TsdbModel};
use crate::services::GroupService;
use crate::store::GroupStore;
use crate::tasks::TaskContext;

/// How one `merge_groups` invocation ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    /// No sources or no destination were given
    Malformed,
    /// The destination could not be resolved, even through redirects
    DestinationMissing,
    /// Work remains; the next invocation was enqueued with these sources
    Continued { remaining: Vec<i64> },
    /// Every source has been merged
    Completed,
}

/// One step of a merge job
pub async fn merge_groups(ctx: &TaskContext, mut args: MergeGroupsArgs) -> AppResult<MergeOutcome> {
    let to_object_id = match args.to_object_id {
        Some(id) if !args.from_object_ids.is_empty() => id,
        _ => {
            log::error!(
                "group.malformed.missing_params transaction_id={}",
                args.transaction()
            );
            return Ok(MergeOutcome::Malformed);
        }
    };

    // Only the first invocation carries these ids
    if !args.handle_forecasts_ids.is_empty() {
        let groups = ctx.store.get_groups(&args.handle_forecasts_ids).await?;
        invalidate_hourly_count_cache(ctx, &groups).await?;
        delete_outdated_forecasts(ctx, &groups).await?;
    }

    let from_object_id = args.from_object_ids[0];

    let new_group = match GroupService::get_with_redirect(ctx.store.as_ref(), to_object_id).await
    {
        Ok((group, _)) => group,
        Err(AppError::NotFound(_)) => {
            log::warn!(
                "group.malformed.invalid_id transaction_id={} old_object_ids={:?}",
                args.transaction(),
                args.from_object_ids
            );
            return Ok(MergeOutcome::DestinationMissing);
        }
        Err(e) => return Err(e),
    };

    if !args.recursed {
        log::info!(
            "merge.queued transaction_id={} new_group_id={} old_group_ids={:?}",
            args.transaction(),
            new_group.id,
            args.from_object_ids
        );
    }

    match ctx.store.get_group(from_object_id).await? {
        None => {
            args.from_object_ids.remove(0);
            log::warn!(
                "group.malformed.invalid_id transaction_id={} old_object_id={}",
                args.transaction(),
                from_object_id
            );
        }
        Some(group) if group.id == new_group.id => {
            // Folding a group into itself would never drain its records
            args.from_object_ids.remove(0);
            log::warn!(
                "group.malformed.self_merge transaction_id={} group_id={}",
                args.transaction(),
                group.id
            );
        }
        Some(group) => {
            let has_more = merge_objects(
                ctx.store.as_ref(),
                ctx.merge_models.kinds(),
                &group,
                &new_group,
                ctx.batch_limit,
                args.transaction(),
            )
            .await?;

            if !has_more {
                // Nothing left to move for this source: retire it
                args.from_object_ids.remove(0);
                finish_source(ctx, &group, &new_group, args.transaction()).await?;
            }
        }
    }

    if !args.from_object_ids.is_empty() {
        let next = args.continuation(args.from_object_ids.clone());
        ctx.queue
            .enqueue(&Job::MergeGroups(next), Duration::ZERO)
            .await?;
        return Ok(MergeOutcome::Continued {
            remaining: args.from_object_ids,
        });
    }

    if let Some(state) = &args.eventstream_state {
        ctx.eventstream.end_merge(state).await?;

        // Give downstream event counts time to catch up before forecasting
        if args.merge_forecasts {
            ctx.queue
                .enqueue(
                    &Job::RegeneratePrimaryGroupForecast(RegenerateForecastArgs {
                        group_id: to_object_id,
                    }),
                    ctx.forecast_delay,
                )
                .await?;
        }
    }

    Ok(MergeOutcome::Completed)
}

/// Reassigns at most `limit` records of the first kind that still has records
/// attached to `group`.
///
/// A record whose move would break a uniqueness constraint is folded into the
/// destination's equivalent record instead. Returns `true` when any record was
/// processed, `false` once every kind is empty for `group`.
pub async fn merge_objects(
    store: &dyn GroupStore,
    kinds: &[DependentKind],
    group: &Group,
    new_group: &Group,
    limit: i64,
    transaction_id: &str,
) -> AppResult<bool> {
    for kind in kinds {
        let records = store.fetch_dependents(kind, group, limit).await?;
        if records.is_empty() {
            continue;
        }

        for record in &records {
            match store
                .reassign_dependent(kind, record, group, new_group)
                .await
            {
                Ok(()) => {}
                // Only kinds with a group-level key can collide with the destination
                Err(AppError::Conflict(_)) if kind.can_conflict() => {
                    store.absorb_dependent(kind, record, new_group).await?;
                    log::debug!(
                        "object.delete.executed object_id={} transaction_id={} model={}",
                        record.id,
                        transaction_id,
                        kind.name
                    );
                }
                Err(e) => return Err(e),
            }
        }

        return Ok(true);
    }

    Ok(false)
}

/// Folds a drained source into the destination and deletes it
async fn finish_source(
    ctx: &TaskContext,
    group: &Group,
    new_group: &Group,
    transaction_id: &str,
) -> AppResult<()> {
    let sources = [group.id];

    ctx.similarity
        .merge(group.project_id, new_group.id, &sources, true)
        .await?;

    let environment_ids = ctx.store.environment_ids(group.project_id).await?;
    let scope = |model: TsdbModel| {
        model
            .supports_environments()
            .then_some(environment_ids.as_slice())
    };

    ctx.tsdb
        .merge(TsdbModel::Group, new_group.id, &sources, scope(TsdbModel::Group))
        .await?;

    ctx.tsdb
        .merge_distinct_counts(
            TsdbModel::UsersAffectedByGroup,
            new_group.id,
            &sources,
            scope(TsdbModel::UsersAffectedByGroup),
        )
        .await?;

    for model in [
        TsdbModel::FrequentReleasesByGroup,
        TsdbModel::FrequentEnvironmentsByGroup,
    ] {
        ctx.tsdb
            .merge_frequencies(model, new_group.id, &sources, scope(model))
            .await?;
    }

    let skipped = ctx.store.finalize_source(group, new_group).await?;
    log::info!(
        "object.delete.executed object_id={} transaction_id={} model=group",
        group.id,
        transaction_id
    );

    for counter in skipped {
        log::warn!(
            "group.counter.out_of_range group_id={} counter={} transaction_id={}",
            new_group.id,
            counter.column(),
            transaction_id
        );
    }

    Ok(())
}

async fn delete_outdated_forecasts(ctx: &TaskContext, groups: &[Group]) -> AppResult<()> {
    for group in groups {
        ctx.forecasts.delete(group.project_id, group.id).await?;
    }
    Ok(())
}

async fn invalidate_hourly_count_cache(ctx: &TaskContext, groups: &[Group]) -> AppResult<()> {
    for group in groups {
        ctx.hourly_counts.invalidate(group).await?;
    }
    Ok(())
}
