use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Queue every merge-related job runs on
pub const MERGE_QUEUE: &str = "merge";

/// Opaque token threading the event stream's own merge protocol through the job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MergeState(pub serde_json::Value);

/// Arguments of one `merge_groups` invocation.
///
/// The full state of a logical merge travels in these arguments; nothing is kept
/// between invocations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MergeGroupsArgs {
    /// Sources still to be folded into the destination, front first
    #[serde(default)]
    pub from_object_ids: Vec<i64>,
    #[serde(default)]
    pub to_object_id: Option<i64>,
    /// Correlation id carried into every log line
    #[serde(default)]
    pub transaction_id: Option<String>,
    #[serde(default)]
    pub recursed: bool,
    #[serde(default)]
    pub eventstream_state: Option<MergeState>,
    /// Groups whose forecasts are dropped before the first step. Never re-passed.
    #[serde(default)]
    pub handle_forecasts_ids: Vec<i64>,
    /// Regenerate the destination forecast once every source is merged
    #[serde(default)]
    pub merge_forecasts: bool,
}

impl MergeGroupsArgs {
    pub fn new(from_object_ids: Vec<i64>, to_object_id: i64) -> Self {
        Self {
            from_object_ids,
            to_object_id: Some(to_object_id),
            ..Self::default()
        }
    }

    pub fn with_transaction_id(mut self, transaction_id: impl Into<String>) -> Self {
        self.transaction_id = Some(transaction_id.into());
        self
    }

    pub fn with_eventstream_state(mut self, state: MergeState) -> Self {
        self.eventstream_state = Some(state);
        self
    }

    pub fn with_forecasts(mut self, handle_forecasts_ids: Vec<i64>, merge_forecasts: bool) -> Self {
        self.handle_forecasts_ids = handle_forecasts_ids;
        self.merge_forecasts = merge_forecasts;
        self
    }

    /// Arguments for the next invocation once `remaining` sources are left
    pub fn continuation(&self, remaining: Vec<i64>) -> Self {
        Self {
            from_object_ids: remaining,
            to_object_id: self.to_object_id,
            transaction_id: self.transaction_id.clone(),
            recursed: true,
            eventstream_state: self.eventstream_state.clone(),
            handle_forecasts_ids: Vec::new(),
            merge_forecasts: self.merge_forecasts,
        }
    }

    /// Transaction id for log lines
    pub fn transaction(&self) -> &str {
        self.transaction_id.as_deref().unwrap_or("-")
    }
}

/// Arguments of `regenerate_primary_group_forecast`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegenerateForecastArgs {
    pub group_id: i64,
}

/// A named task with its keyword arguments, as stored in the queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "task", content = "kwargs", rename_all = "snake_case")]
pub enum Job {
    MergeGroups(MergeGroupsArgs),
    RegeneratePrimaryGroupForecast(RegenerateForecastArgs),
}

impl Job {
    /// Task name stored next to the payload
    pub fn task_name(&self) -> &'static str {
        match self {
            Job::MergeGroups(_) => "merge_groups",
            Job::RegeneratePrimaryGroupForecast(_) => "regenerate_primary_group_forecast",
        }
    }
}

/// Job row as stored in the `jobs` table
#[derive(Debug, Clone, FromRow)]
pub struct QueuedJob {
    pub id: i64,
    pub queue: String,
    pub task: String,
    pub payload: serde_json::Value,
    pub run_at: DateTime<Utc>,
    pub attempts: i32,
    pub locked_by: Option<String>,
    pub locked_until: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl QueuedJob {
    /// Decodes the stored payload back into a job
    pub fn decode(&self) -> Result<Job, serde_json::Error> {
        serde_json::from_value(self.payload.clone())
    }
}
