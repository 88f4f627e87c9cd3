pub mod group;
pub mod merge;

pub use group::{GroupService, MAX_REDIRECT_HOPS};
pub use merge::MergeService;
