use crate::error::AppResult;
use crate::tasks::TaskContext;

/// Recomputes the escalation forecast of a merge destination
pub async fn regenerate_primary_group_forecast(ctx: &TaskContext, group_id: i64) -> AppResult<()> {
    let Some(group) = ctx.store.get_group(group_id).await? else {
        log::warn!("forecast.group_missing group_id={}", group_id);
        return Ok(());
    };

    ctx.forecasts
        .generate_and_save_forecasts(std::slice::from_ref(&group))
        .await
}
