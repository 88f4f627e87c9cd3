//! Subsystems the merge task delegates to.
//!
//! Each subsystem is a trait so the task can be driven against recording fakes,
//! with a Postgres implementation used by the worker binary.

pub mod eventstream;
pub mod forecast;
pub mod similarity;
pub mod tsdb;

use async_trait::async_trait;

use crate::error::AppResult;
use crate::models::{Group, MergeState, TsdbModel};

pub use eventstream::PgEventStream;
pub use forecast::{compute_forecast, PgForecastEngine};
pub use similarity::PgSimilarityIndex;
pub use tsdb::PgTsdb;

// =============================================================================
// Event Stream
// =============================================================================

/// Notifies downstream consumers about merges
#[async_trait]
pub trait EventStream: Send + Sync {
    /// Announces a merge and returns the token threaded through the merge job
    async fn start_merge(
        &self,
        project_id: i64,
        previous_group_ids: &[i64],
        new_group_id: i64,
    ) -> AppResult<MergeState>;

    /// Announces that every source of the merge has been folded
    async fn end_merge(&self, state: &MergeState) -> AppResult<()>;
}

// =============================================================================
// Similarity Index
// =============================================================================

#[async_trait]
pub trait SimilarityIndex: Send + Sync {
    /// Folds the similarity features of `sources` into `destination`.
    ///
    /// Without `allow_unsafe` the index refuses to fold features of groups that
    /// still exist.
    async fn merge(
        &self,
        project_id: i64,
        destination: i64,
        sources: &[i64],
        allow_unsafe: bool,
    ) -> AppResult<()>;
}

// =============================================================================
// Time-series Store
// =============================================================================

/// Rollup storage keyed by group id.
///
/// `environment_ids` of `None` merges only the environment-less series.
#[async_trait]
pub trait Tsdb: Send + Sync {
    async fn merge(
        &self,
        model: TsdbModel,
        destination: i64,
        sources: &[i64],
        environment_ids: Option<&[i64]>,
    ) -> AppResult<()>;

    async fn merge_distinct_counts(
        &self,
        model: TsdbModel,
        destination: i64,
        sources: &[i64],
        environment_ids: Option<&[i64]>,
    ) -> AppResult<()>;

    async fn merge_frequencies(
        &self,
        model: TsdbModel,
        destination: i64,
        sources: &[i64],
        environment_ids: Option<&[i64]>,
    ) -> AppResult<()>;
}

// =============================================================================
// Forecasts
// =============================================================================

/// Escalation forecasts derived from a group's recent event rate
#[async_trait]
pub trait ForecastEngine: Send + Sync {
    async fn generate_and_save_forecasts(&self, groups: &[Group]) -> AppResult<()>;

    async fn delete(&self, project_id: i64, group_id: i64) -> AppResult<()>;
}

/// Cache of per-hour event counts feeding the forecasts
#[async_trait]
pub trait HourlyCountCache: Send + Sync {
    async fn invalidate(&self, group: &Group) -> AppResult<()>;
}
