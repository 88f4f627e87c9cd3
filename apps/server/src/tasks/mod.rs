//! Merge background tasks and the context they run with.

pub mod forecast;
pub mod merge;

use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;

use crate::backends::{
    EventStream, ForecastEngine, HourlyCountCache, PgEventStream, PgForecastEngine,
    PgSimilarityIndex, PgTsdb, SimilarityIndex, Tsdb,
};
use crate::config::WorkerConfig;
use crate::error::AppResult;
use crate::models::{Job, MergeModels};
use crate::queue::{JobQueue, PgJobQueue};
use crate::store::{GroupStore, PgGroupStore};

pub use forecast::regenerate_primary_group_forecast;
pub use merge::{merge_groups, merge_objects, MergeOutcome};

/// Retry delay of the forecast regeneration task
pub const FORECAST_RETRY_DELAY: Duration = Duration::from_secs(60);

/// Collaborators and tuning shared by every task invocation
pub struct TaskContext {
    pub store: Arc<dyn GroupStore>,
    pub queue: Arc<dyn JobQueue>,
    pub eventstream: Arc<dyn EventStream>,
    pub similarity: Arc<dyn SimilarityIndex>,
    pub tsdb: Arc<dyn Tsdb>,
    pub forecasts: Arc<dyn ForecastEngine>,
    pub hourly_counts: Arc<dyn HourlyCountCache>,
    /// Dependent kinds walked by `merge_objects`, in order
    pub merge_models: MergeModels,
    pub batch_limit: i64,
    pub forecast_delay: Duration,
    pub merge_retry_delay: Duration,
}

impl TaskContext {
    /// Wires every collaborator to the Postgres implementation
    pub fn postgres(pool: PgPool, config: &WorkerConfig) -> Self {
        let forecasts = Arc::new(PgForecastEngine::new(pool.clone()));

        Self {
            store: Arc::new(PgGroupStore::new(pool.clone())),
            queue: Arc::new(PgJobQueue::new(pool.clone())),
            eventstream: Arc::new(PgEventStream::new(pool.clone())),
            similarity: Arc::new(PgSimilarityIndex::new(pool.clone())),
            tsdb: Arc::new(PgTsdb::new(pool)),
            forecasts: forecasts.clone(),
            hourly_counts: forecasts,
            merge_models: MergeModels::default(),
            batch_limit: config.merge_batch_limit,
            forecast_delay: config.forecast_delay,
            merge_retry_delay: config.merge_retry_delay,
        }
    }

    /// Delay before a failed run of `job` is attempted again
    pub fn retry_delay(&self, job: &Job) -> Duration {
        match job {
            Job::MergeGroups(_) => self.merge_retry_delay,
            Job::RegeneratePrimaryGroupForecast(_) => FORECAST_RETRY_DELAY,
        }
    }
}

/// Runs one job to completion
pub async fn run_job(ctx: &TaskContext, job: Job) -> AppResult<()> {
    match job {
        Job::MergeGroups(args) => {
            let outcome = merge_groups(ctx, args).await?;
            log::debug!("merge_groups finished: {:?}", outcome);
            Ok(())
        }
        Job::RegeneratePrimaryGroupForecast(args) => {
            regenerate_primary_group_forecast(ctx, args.group_id).await
        }
    }
}
