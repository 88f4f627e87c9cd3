use serde::{Deserialize, Serialize};

/// Time-series series families keyed by group id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TsdbModel {
    /// Event counts per group
    Group,
    /// Distinct users affected per group
    UsersAffectedByGroup,
    /// Release frequency table per group
    FrequentReleasesByGroup,
    /// Environment frequency table per group
    FrequentEnvironmentsByGroup,
}

impl TsdbModel {
    /// Value stored in the `model` column
    pub fn as_str(self) -> &'static str {
        match self {
            TsdbModel::Group => "group",
            TsdbModel::UsersAffectedByGroup => "users_affected_by_group",
            TsdbModel::FrequentReleasesByGroup => "frequent_releases_by_group",
            TsdbModel::FrequentEnvironmentsByGroup => "frequent_environments_by_group",
        }
    }

    /// Whether the series is also kept per environment
    pub fn supports_environments(self) -> bool {
        matches!(self, TsdbModel::Group | TsdbModel::UsersAffectedByGroup)
    }
}

impl std::fmt::Display for TsdbModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
