pub mod dependent;
pub mod group;
pub mod job;
pub mod tsdb;

pub use dependent::{DependentKind, DependentRecord, MergeModels};
pub use group::{Group, GroupCounter, MergeGroupsRequest, MergeQueuedResponse, MergeSummary};
pub use job::{Job, MergeGroupsArgs, MergeState, QueuedJob, RegenerateForecastArgs, MERGE_QUEUE};
pub use tsdb::TsdbModel;
