//! Job queue the merge tasks run on.
//!
//! Delivery is at-least-once: a job is removed only after its handler returned,
//! and a job whose worker disappeared becomes claimable again once its lock expires.

pub mod postgres;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::AppResult;
use crate::models::Job;

pub use postgres::PgJobQueue;

/// Schedules jobs for later execution
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Schedules `job` to run after `delay`, returning its queue id
    async fn enqueue(&self, job: &Job, delay: Duration) -> AppResult<i64>;
}
