//! Polling worker that executes queued merge jobs.
//!
//! Each loop handles one job at a time; throughput comes from running several
//! loops side by side. Failed jobs are rescheduled without an attempt limit
//! because every task can resume from the arguments it was enqueued with.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::config::WorkerConfig;
use crate::error::AppResult;
use crate::queue::PgJobQueue;
use crate::tasks::{run_job, TaskContext};

/// What a single poll did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollResult {
    /// No runnable job was available
    Idle,
    Completed(i64),
    /// The job failed and was rescheduled
    Retried(i64),
    /// The payload could not be decoded; the job was dropped
    Discarded(i64),
}

pub struct MergeWorker {
    id: String,
    queue: PgJobQueue,
    ctx: Arc<TaskContext>,
    poll_interval: Duration,
    lock_timeout: Duration,
}

impl MergeWorker {
    pub fn new(queue: PgJobQueue, ctx: Arc<TaskContext>, config: &WorkerConfig) -> Self {
        Self {
            id: format!("merge-worker-{}", Uuid::new_v4().simple()),
            queue,
            ctx,
            poll_interval: config.poll_interval,
            lock_timeout: config.lock_timeout,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Claims and runs at most one job
    pub async fn poll_once(&self) -> AppResult<PollResult> {
        let Some(queued) = self.queue.claim(&self.id, self.lock_timeout).await? else {
            return Ok(PollResult::Idle);
        };

        let job = match queued.decode() {
            Ok(job) => job,
            Err(e) => {
                log::error!(
                    "job.malformed id={} task={} error={}",
                    queued.id,
                    queued.task,
                    e
                );
                self.queue.complete(queued.id).await?;
                return Ok(PollResult::Discarded(queued.id));
            }
        };

        let retry_delay = self.ctx.retry_delay(&job);
        let task = job.task_name();

        match run_job(&self.ctx, job).await {
            Ok(()) => {
                self.queue.complete(queued.id).await?;
                log::debug!("job.completed id={} task={}", queued.id, task);
                Ok(PollResult::Completed(queued.id))
            }
            Err(e) => {
                log::error!(
                    "job.failed id={} task={} attempt={} retry_in={}s error={}",
                    queued.id,
                    task,
                    queued.attempts,
                    retry_delay.as_secs(),
                    e
                );
                self.queue
                    .retry(queued.id, retry_delay, &e.to_string())
                    .await?;
                Ok(PollResult::Retried(queued.id))
            }
        }
    }

    /// Polls until `shutdown` flips to `true`
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        log::info!("Worker {} started on queue '{}'", self.id, self.queue.queue_name());

        while !*shutdown.borrow() {
            let idle = match self.poll_once().await {
                Ok(PollResult::Idle) => true,
                Ok(_) => false,
                Err(e) => {
                    log::error!("Worker {} poll failed: {}", self.id, e);
                    true
                }
            };

            if idle {
                tokio::select! {
                    _ = tokio::time::sleep(self.poll_interval) => {}
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }
        }

        log::info!("Worker {} stopped", self.id);
    }
}

/// Starts `config.concurrency` worker loops sharing one task context
pub fn spawn_workers(
    queue: PgJobQueue,
    ctx: Arc<TaskContext>,
    config: &WorkerConfig,
    shutdown: watch::Receiver<bool>,
) -> Vec<JoinHandle<()>> {
    (0..config.concurrency)
        .map(|_| {
            let worker = MergeWorker::new(queue.clone(), ctx.clone(), config);
            log::debug!("Spawning worker {}", worker.id());
            tokio::spawn(worker.run(shutdown.clone()))
        })
        .collect()
}
