use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Group model - the canonical, deduplicated issue record
#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct Group {
    pub id: i64,
    pub project_id: i64,
    pub title: String,
    pub times_seen: i32,
    pub num_comments: i32,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

/// Additive counters on a group that are summed when groups merge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupCounter {
    TimesSeen,
    NumComments,
}

impl GroupCounter {
    pub const ALL: [GroupCounter; 2] = [GroupCounter::TimesSeen, GroupCounter::NumComments];

    /// Column backing the counter
    pub fn column(self) -> &'static str {
        match self {
            GroupCounter::TimesSeen => "times_seen",
            GroupCounter::NumComments => "num_comments",
        }
    }

    /// Reads the counter value from a group
    pub fn value(self, group: &Group) -> i32 {
        match self {
            GroupCounter::TimesSeen => group.times_seen,
            GroupCounter::NumComments => group.num_comments,
        }
    }
}

/// Request body for triggering a merge through the API
#[derive(Debug, Deserialize)]
pub struct MergeGroupsRequest {
    pub group_ids: Vec<i64>,
}

/// Parent/children summary returned once a merge is queued
#[derive(Debug, Serialize)]
pub struct MergeSummary {
    pub parent: i64,
    pub children: Vec<i64>,
}

/// Response for API
#[derive(Debug, Serialize)]
pub struct MergeQueuedResponse {
    pub merge: MergeSummary,
    pub transaction_id: String,
}
