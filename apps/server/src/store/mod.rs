//! Storage seam for groups and the records that depend on them.
//!
//! The merge task only talks to [`GroupStore`], so the same orchestration runs
//! against Postgres in production and against in-memory stores in tests.

pub mod postgres;

use async_trait::async_trait;

use crate::error::AppResult;
use crate::models::{DependentKind, DependentRecord, Group, GroupCounter};

pub use postgres::PgGroupStore;

/// Group persistence operations used by the merge jobs
#[async_trait]
pub trait GroupStore: Send + Sync {
    /// Loads a group by id, without following redirects
    async fn get_group(&self, id: i64) -> AppResult<Option<Group>>;

    /// Loads every existing group among `ids`, ordered by id
    async fn get_groups(&self, ids: &[i64]) -> AppResult<Vec<Group>>;

    /// Returns the group a merged-away id now points to
    async fn get_redirect_target(&self, previous_group_id: i64) -> AppResult<Option<i64>>;

    /// Environment ids of a project
    async fn environment_ids(&self, project_id: i64) -> AppResult<Vec<i64>>;

    /// Up to `limit` records of `kind` still attached to `source`
    async fn fetch_dependents(
        &self,
        kind: &DependentKind,
        source: &Group,
        limit: i64,
    ) -> AppResult<Vec<DependentRecord>>;

    /// Moves one record to `destination` in its own transaction.
    ///
    /// Fails with [`crate::error::AppError::Conflict`] when the destination
    /// already holds an equivalent record.
    async fn reassign_dependent(
        &self,
        kind: &DependentKind,
        record: &DependentRecord,
        source: &Group,
        destination: &Group,
    ) -> AppResult<()>;

    /// Resolves a reassignment conflict: adds the declared counters of `record`
    /// onto the equivalent record of `destination`, then deletes `record`,
    /// both in one transaction
    async fn absorb_dependent(
        &self,
        kind: &DependentKind,
        record: &DependentRecord,
        destination: &Group,
    ) -> AppResult<()>;

    /// Retires a drained source in one transaction: records the
    /// `source -> destination` redirect, deletes the source with its history and
    /// inbox entries, widens the destination's seen range and adds the source's
    /// counters onto it.
    ///
    /// A counter whose sum does not fit its column is left untouched without
    /// failing the transaction; those counters are returned.
    async fn finalize_source(
        &self,
        source: &Group,
        destination: &Group,
    ) -> AppResult<Vec<GroupCounter>>;

    /// Appends an activity entry to a group's timeline
    async fn record_activity(
        &self,
        group: &Group,
        kind: &str,
        data: serde_json::Value,
    ) -> AppResult<()>;
}
