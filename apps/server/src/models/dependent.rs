//! Descriptors for the records that hang off a group.
//!
//! Every dependent table carries a `group_id` column. A [`DependentKind`] states,
//! once and explicitly, how the merge task may scope and move rows of that table:
//! whether it can be narrowed to the source project, which columns form a unique
//! key together with `group_id`, and which counters must be folded into the
//! destination when a move collides with that key.

/// Capability descriptor for one dependent record table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DependentKind {
    /// Stable name used in logs
    pub name: &'static str,
    /// Backing table
    pub table: &'static str,
    /// The table has a `project_id` column that can narrow the scan
    pub project_scoped: bool,
    /// Columns that, together with `group_id`, are unique.
    /// `None` when moving a row can never collide on a group-level key.
    pub unique_with_group: Option<&'static [&'static str]>,
    /// Counter columns summed into the destination record on collision
    pub counters: &'static [&'static str],
}

impl DependentKind {
    /// Whether a reassignment of this kind can hit a uniqueness conflict
    pub fn can_conflict(&self) -> bool {
        self.unique_with_group.is_some()
    }

    /// Whether conflicting rows carry counts that must be preserved
    pub fn has_counters(&self) -> bool {
        !self.counters.is_empty()
    }
}

pub const ACTIVITY: DependentKind = DependentKind {
    name: "activity",
    table: "activities",
    project_scoped: true,
    unique_with_group: None,
    counters: &[],
};

pub const GROUP_ASSIGNEE: DependentKind = DependentKind {
    name: "group_assignee",
    table: "group_assignees",
    project_scoped: true,
    unique_with_group: Some(&[]),
    counters: &[],
};

pub const GROUP_ENVIRONMENT: DependentKind = DependentKind {
    name: "group_environment",
    table: "group_environments",
    project_scoped: false,
    unique_with_group: Some(&["environment_id"]),
    counters: &[],
};

pub const GROUP_HASH: DependentKind = DependentKind {
    name: "group_hash",
    table: "group_hashes",
    project_scoped: true,
    unique_with_group: None,
    counters: &[],
};

pub const GROUP_RULE_STATUS: DependentKind = DependentKind {
    name: "group_rule_status",
    table: "group_rule_statuses",
    project_scoped: true,
    unique_with_group: Some(&["rule_id"]),
    counters: &[],
};

pub const GROUP_SUBSCRIPTION: DependentKind = DependentKind {
    name: "group_subscription",
    table: "group_subscriptions",
    project_scoped: true,
    unique_with_group: Some(&["user_id"]),
    counters: &[],
};

pub const EVENT_ATTACHMENT: DependentKind = DependentKind {
    name: "event_attachment",
    table: "event_attachments",
    project_scoped: true,
    unique_with_group: None,
    counters: &[],
};

pub const USER_REPORT: DependentKind = DependentKind {
    name: "user_report",
    table: "user_reports",
    project_scoped: true,
    unique_with_group: None,
    counters: &[],
};

pub const GROUP_REDIRECT: DependentKind = DependentKind {
    name: "group_redirect",
    table: "group_redirects",
    project_scoped: false,
    unique_with_group: None,
    counters: &[],
};

pub const GROUP_META: DependentKind = DependentKind {
    name: "group_meta",
    table: "group_metas",
    project_scoped: false,
    unique_with_group: Some(&["key"]),
    counters: &[],
};

/// Per-group tag value counts. Collisions fold `times_seen` into the destination.
pub const GROUP_TAG_VALUE: DependentKind = DependentKind {
    name: "group_tag_value",
    table: "group_tag_values",
    project_scoped: true,
    unique_with_group: Some(&["key", "value"]),
    counters: &["times_seen"],
};

/// Kinds every merge moves, in merge order
pub const BUILTIN_KINDS: [DependentKind; 10] = [
    ACTIVITY,
    GROUP_ASSIGNEE,
    GROUP_ENVIRONMENT,
    GROUP_HASH,
    GROUP_RULE_STATUS,
    GROUP_SUBSCRIPTION,
    EVENT_ATTACHMENT,
    USER_REPORT,
    GROUP_REDIRECT,
    GROUP_META,
];

/// The ordered, immutable list of kinds a merge walks through
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeModels {
    kinds: Vec<DependentKind>,
}

impl MergeModels {
    /// Builds the list with `extra` kinds ahead of the built-ins
    pub fn new(extra: &[DependentKind]) -> Self {
        let mut kinds = Vec::with_capacity(extra.len() + BUILTIN_KINDS.len());
        kinds.extend_from_slice(extra);
        for kind in BUILTIN_KINDS {
            if !kinds.iter().any(|k| k.table == kind.table) {
                kinds.push(kind);
            }
        }
        Self { kinds }
    }

    pub fn kinds(&self) -> &[DependentKind] {
        &self.kinds
    }
}

impl Default for MergeModels {
    fn default() -> Self {
        Self::new(&[GROUP_TAG_VALUE])
    }
}

/// A dependent row selected for reassignment
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::FromRow)]
pub struct DependentRecord {
    pub id: i64,
    pub group_id: i64,
}
