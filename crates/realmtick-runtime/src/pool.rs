//! Bounded worker pool draining the durable queues.
//!
//! Each registered lane pairs a [`JobQueue`] with a handler. Claimed jobs
//! run on tokio's blocking pool, at most `concurrency` at a time across all
//! lanes; handler errors go back to the queue, which retries or fails the
//! job according to [`TickError::is_retryable`].

use crate::digest::DigestWorker;
use crate::worker::TickWorker;
use realmtick_core::clock::Clock;
use realmtick_core::config::QueueConfig;
use realmtick_core::job::{DigestJob, Job, TickJob};
use realmtick_core::queue::{FailOutcome, JobQueue, JobRecord, Recovered};
use realmtick_core::{Result, TickError};
use std::sync::Arc;
use tokio::sync::{watch, Semaphore};
use tracing::{error, info, warn};

/// Typed handler for one job class.
pub trait JobHandler: Send + Sync + 'static {
    type Job: Job;

    fn handle(&self, job: &Self::Job) -> Result<()>;
}

impl JobHandler for TickWorker {
    type Job = TickJob;

    fn handle(&self, job: &TickJob) -> Result<()> {
        self.process(job).map(|_| ())
    }
}

impl JobHandler for DigestWorker {
    type Job = DigestJob;

    fn handle(&self, job: &DigestJob) -> Result<()> {
        self.process(job).map(|_| ())
    }
}

type RunFn = dyn Fn(&JobRecord) -> Result<()> + Send + Sync;

#[derive(Clone)]
struct Lane {
    queue: JobQueue,
    run: Arc<RunFn>,
}

impl Lane {
    fn execute(&self, record: JobRecord) {
        match (self.run)(&record) {
            Ok(()) => {
                if let Err(e) = self.queue.complete(&record.id) {
                    warn!(job_id = %record.id, error = %e, "failed to mark job completed");
                }
            }
            Err(e) => self.settle_failure(&record, &e),
        }
    }

    fn settle_failure(&self, record: &JobRecord, err: &TickError) {
        let retryable = err.is_retryable();
        match self.queue.fail(&record.id, &err.to_string(), retryable) {
            Ok(FailOutcome::Retrying { run_at }) => warn!(
                queue = %self.queue.name(),
                job_id = %record.id,
                attempt = record.attempts,
                retry_at = %run_at,
                error = %err,
                "job failed, retrying"
            ),
            Ok(FailOutcome::Failed) => error!(
                queue = %self.queue.name(),
                job_id = %record.id,
                attempts = record.attempts,
                retryable,
                error = %err,
                "job failed permanently"
            ),
            Err(e) => error!(job_id = %record.id, error = %e, "failed to record job failure"),
        }
    }
}

pub struct WorkerPool {
    lanes: Vec<Lane>,
    permits: Arc<Semaphore>,
    concurrency: u32,
    claim_batch: usize,
    stalled_after: std::time::Duration,
    clock: Arc<dyn Clock>,
}

impl WorkerPool {
    pub fn new(cfg: &QueueConfig, clock: Arc<dyn Clock>) -> Self {
        let concurrency = cfg.concurrency.clamp(1, 1024) as u32;
        Self {
            lanes: Vec::new(),
            permits: Arc::new(Semaphore::new(concurrency as usize)),
            concurrency,
            claim_batch: cfg.claim_batch.max(1),
            stalled_after: std::time::Duration::from_secs(cfg.stalled_after_secs),
            clock,
        }
    }

    pub fn register<H: JobHandler>(mut self, queue: JobQueue, handler: Arc<H>) -> Self {
        let run = move |record: &JobRecord| -> Result<()> {
            let job = record.decode::<H::Job>()?;
            handler.handle(&job)
        };
        self.lanes.push(Lane {
            queue,
            run: Arc::new(run),
        });
        self
    }

    /// Claim due jobs up to the free capacity and start them. Returns how
    /// many were started; they may still be running.
    pub async fn dispatch(&self) -> Result<usize> {
        let mut started = 0;
        for lane in &self.lanes {
            let room = self.permits.available_permits().min(self.claim_batch);
            if room == 0 {
                break;
            }
            for record in lane.queue.claim_due(room)? {
                let permit = self
                    .permits
                    .clone()
                    .acquire_owned()
                    .await
                    .map_err(|e| TickError::Queue(e.to_string()))?;
                let lane = lane.clone();
                tokio::task::spawn_blocking(move || {
                    let _permit = permit;
                    lane.execute(record);
                });
                started += 1;
            }
        }
        Ok(started)
    }

    /// Wait until every started job has finished.
    pub async fn wait_idle(&self) {
        if let Ok(all) = self.permits.acquire_many(self.concurrency).await {
            drop(all);
        }
    }

    /// Dispatch and wait repeatedly until nothing is due.
    pub async fn run_until_idle(&self) -> Result<usize> {
        let mut total = 0;
        loop {
            let started = self.dispatch().await?;
            self.wait_idle().await;
            if started == 0 {
                return Ok(total);
            }
            total += started;
        }
    }

    /// Return abandoned `running` jobs on every lane to pending, failing
    /// those already out of attempts.
    pub fn recover_stalled(&self) -> Result<Recovered> {
        let mut recovered = Recovered::default();
        for lane in &self.lanes {
            recovered += lane.queue.recover_stalled(self.stalled_after)?;
        }
        Ok(recovered)
    }

    pub async fn run(self, poll: std::time::Duration, mut shutdown: watch::Receiver<bool>) {
        info!(lanes = self.lanes.len(), concurrency = self.concurrency, "worker pool started");
        let recover_every = chrono::Duration::from_std(self.stalled_after / 2)
            .unwrap_or_else(|_| chrono::Duration::seconds(60));
        let mut last_recovery = self.clock.now();

        match self.recover_stalled() {
            Ok(r) if r.total() > 0 => info!(
                requeued = r.requeued,
                failed = r.failed,
                "stalled jobs recovered"
            ),
            Ok(_) => {}
            Err(e) => warn!(error = %e, "stalled job recovery failed"),
        }

        loop {
            if *shutdown.borrow() {
                break;
            }
            let started = match self.dispatch().await {
                Ok(n) => n,
                Err(e) => {
                    warn!(error = %e, "claiming jobs failed");
                    0
                }
            };

            let now = self.clock.now();
            if now - last_recovery >= recover_every {
                last_recovery = now;
                match self.recover_stalled() {
                    Ok(r) if r.total() > 0 => warn!(
                        requeued = r.requeued,
                        failed = r.failed,
                        "stalled jobs recovered"
                    ),
                    Ok(_) => {}
                    Err(e) => warn!(error = %e, "stalled job recovery failed"),
                }
            }

            if started == 0 {
                tokio::select! {
                    _ = tokio::time::sleep(poll) => {}
                    _ = shutdown.changed() => break,
                }
            }
        }
        self.wait_idle().await;
        info!("worker pool stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use realmtick_core::clock::ManualClock;
    use realmtick_core::queue::{QueueDb, RetryPolicy};
    use serde::{Deserialize, Serialize};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    #[derive(Serialize, Deserialize)]
    struct Ping {
        n: u32,
    }

    impl Job for Ping {
        const QUEUE: &'static str = "ping";

        fn job_id(&self) -> String {
            format!("ping:{}", self.n)
        }

        fn scheduled_at(&self) -> chrono::DateTime<Utc> {
            chrono::DateTime::<Utc>::MIN_UTC
        }
    }

    struct Handler {
        seen: AtomicUsize,
        fail_with: Option<fn() -> TickError>,
    }

    impl JobHandler for Handler {
        type Job = Ping;

        fn handle(&self, _job: &Ping) -> Result<()> {
            self.seen.fetch_add(1, Ordering::SeqCst);
            match self.fail_with {
                Some(make) => Err(make()),
                None => Ok(()),
            }
        }
    }

    fn setup(fail_with: Option<fn() -> TickError>) -> (TempDir, JobQueue, Arc<Handler>, WorkerPool) {
        let dir = TempDir::new().unwrap();
        let db = QueueDb::open(&dir.path().join("q.redb")).unwrap();
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(Utc::now()));
        let queue = db.queue("ping", RetryPolicy::default(), clock.clone()).unwrap();
        let handler = Arc::new(Handler {
            seen: AtomicUsize::new(0),
            fail_with,
        });
        let cfg = QueueConfig {
            concurrency: 2,
            ..QueueConfig::default()
        };
        let pool = WorkerPool::new(&cfg, clock).register(queue.clone(), handler.clone());
        (dir, queue, handler, pool)
    }

    #[tokio::test]
    async fn drains_due_jobs_and_completes_them() {
        let (_dir, queue, handler, pool) = setup(None);
        for n in 0..5 {
            queue.enqueue(&Ping { n }).unwrap();
        }
        assert_eq!(pool.run_until_idle().await.unwrap(), 5);
        assert_eq!(handler.seen.load(Ordering::SeqCst), 5);
        let stats = queue.stats().unwrap();
        assert_eq!(stats.completed, 5);
        assert_eq!(stats.waiting + stats.delayed + stats.running, 0);
    }

    #[tokio::test]
    async fn terminal_errors_fail_without_retry() {
        let (_dir, queue, handler, pool) =
            setup(Some(|| TickError::EntityNotFound("ghost".into())));
        queue.enqueue(&Ping { n: 1 }).unwrap();
        pool.run_until_idle().await.unwrap();
        assert_eq!(handler.seen.load(Ordering::SeqCst), 1);
        assert_eq!(queue.stats().unwrap().failed, 1);
    }

    #[tokio::test]
    async fn transient_errors_are_redelayed() {
        let (_dir, queue, handler, pool) = setup(Some(|| TickError::Store("down".into())));
        queue.enqueue(&Ping { n: 1 }).unwrap();
        pool.run_until_idle().await.unwrap();
        assert_eq!(handler.seen.load(Ordering::SeqCst), 1);
        let stats = queue.stats().unwrap();
        assert_eq!(stats.delayed, 1);
        assert_eq!(stats.failed, 0);
    }
}
