use std::collections::HashSet;

use crate::error::{AppError, AppResult};
use crate::models::Group;
use crate::store::GroupStore;

/// Upper bound on redirect hops followed while resolving a group id
pub const MAX_REDIRECT_HOPS: usize = 8;

pub struct GroupService;

impl GroupService {
    /// Resolves an id to its current group, following redirects left behind by merges.
    ///
    /// Returns the group and whether a redirect was followed.
    pub async fn get_with_redirect(store: &dyn GroupStore, id: i64) -> AppResult<(Group, bool)> {
        let mut current = id;
        let mut seen = HashSet::new();

        for _ in 0..=MAX_REDIRECT_HOPS {
            if let Some(group) = store.get_group(current).await? {
                return Ok((group, current != id));
            }

            if !seen.insert(current) {
                break;
            }

            match store.get_redirect_target(current).await? {
                Some(target) => current = target,
                None => break,
            }
        }

        Err(AppError::NotFound(format!("Group {} not found", id)))
    }
}
