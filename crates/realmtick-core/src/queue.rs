//! Durable delayed job queue on redb.
//!
//! # Table design
//!
//! Each named queue owns four tables in one database file:
//!
//! ```text
//! {queue}:jobs       job id          → JSON JobRecord (every state)
//! {queue}:due        [run_at_ms BE | job id] → job id   (pending only)
//! {queue}:completed  [finished_ms BE | job id] → job id
//! {queue}:failed     [finished_ms BE | job id] → job id
//! ```
//!
//! Because the timestamp occupies the high bytes in big-endian encoding,
//! byte order equals time order: one range scan below `now + 1ms` returns
//! every job due by `now`, and the retention indexes prune oldest-first by
//! iterating from the front.
//!
//! redb serialises write transactions, so a claim moves a job from `due`
//! to `running` exactly once even with many workers in one process.

use crate::clock::Clock;
use crate::config::QueueConfig;
use crate::error::{Result, TickError};
use crate::job::{self, Job};
use chrono::{DateTime, Utc};
use redb::{Database, ReadableTable, ReadableTableMetadata, Table, TableDefinition};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: String,
    pub queue: String,
    pub payload: serde_json::Value,
    pub state: JobState,
    pub attempts: u32,
    pub max_attempts: u32,
    pub run_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl JobRecord {
    pub fn decode<J: Job>(&self) -> Result<J> {
        job::decode(&self.payload)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FailOutcome {
    /// Re-delayed; will be claimable again at `run_at`.
    Retrying { run_at: DateTime<Utc> },
    /// Terminal. Kept in the failed set for inspection.
    Failed,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    /// Pending and due now.
    pub waiting: usize,
    /// Pending with a future run time.
    pub delayed: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
}

/// Outcome of one stall sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Recovered {
    /// Returned to pending for another attempt.
    pub requeued: usize,
    /// Out of attempts; moved to the failed set.
    pub failed: usize,
}

impl Recovered {
    pub fn total(&self) -> usize {
        self.requeued + self.failed
    }
}

impl std::ops::AddAssign for Recovered {
    fn add_assign(&mut self, other: Self) {
        self.requeued += other.requeued;
        self.failed += other.failed;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_base: Duration,
    pub keep_completed: usize,
    pub keep_failed: usize,
}

impl RetryPolicy {
    /// `base × 2^(attempt − 1)` for the attempt that just failed.
    pub fn backoff(&self, attempt: u32) -> chrono::Duration {
        let factor = 1u32 << attempt.saturating_sub(1).min(16);
        let delay = self.backoff_base.saturating_mul(factor);
        chrono::Duration::from_std(delay).unwrap_or(chrono::Duration::zero())
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&QueueConfig::default())
    }
}

impl From<&QueueConfig> for RetryPolicy {
    fn from(cfg: &QueueConfig) -> Self {
        Self {
            max_attempts: cfg.max_attempts.max(1),
            backoff_base: Duration::from_millis(cfg.backoff_base_ms),
            keep_completed: cfg.keep_completed,
            keep_failed: cfg.keep_failed,
        }
    }
}

// ---------------------------------------------------------------------------
// Key helpers
// ---------------------------------------------------------------------------

type JobsTable<'a> = TableDefinition<'a, &'static str, &'static [u8]>;
type IndexTable<'a> = TableDefinition<'a, &'static [u8], &'static [u8]>;

fn time_key(ts: DateTime<Utc>, id: &str) -> Vec<u8> {
    let ms = ts.timestamp_millis().max(0) as u64;
    let mut key = Vec::with_capacity(8 + id.len());
    key.extend_from_slice(&ms.to_be_bytes());
    key.extend_from_slice(id.as_bytes());
    key
}

/// Exclusive upper bound for a scan returning every key at or before `now`.
fn due_upper_bound(now: DateTime<Utc>) -> [u8; 8] {
    let ms = now.timestamp_millis().max(0) as u64;
    (ms + 1).to_be_bytes()
}

fn queue_err(e: impl std::fmt::Display) -> TickError {
    TickError::Queue(e.to_string())
}

// ---------------------------------------------------------------------------
// QueueDb
// ---------------------------------------------------------------------------

/// The database file shared by every named queue.
#[derive(Clone)]
pub struct QueueDb {
    db: Arc<Database>,
}

impl QueueDb {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path).map_err(queue_err)?;
        Ok(Self { db: Arc::new(db) })
    }

    /// Open (creating if needed) the queue called `name`.
    pub fn queue(&self, name: &str, policy: RetryPolicy, clock: Arc<dyn Clock>) -> Result<JobQueue> {
        let queue = JobQueue {
            db: self.db.clone(),
            name: name.to_string(),
            names: TableNames::new(name),
            policy,
            clock,
        };
        let wt = self.db.begin_write().map_err(queue_err)?;
        wt.open_table(queue.jobs_def()).map_err(queue_err)?;
        wt.open_table(queue.index_def(&queue.names.due)).map_err(queue_err)?;
        wt.open_table(queue.index_def(&queue.names.completed))
            .map_err(queue_err)?;
        wt.open_table(queue.index_def(&queue.names.failed))
            .map_err(queue_err)?;
        wt.commit().map_err(queue_err)?;
        Ok(queue)
    }
}

#[derive(Clone)]
struct TableNames {
    jobs: String,
    due: String,
    completed: String,
    failed: String,
}

impl TableNames {
    fn new(queue: &str) -> Self {
        Self {
            jobs: format!("{queue}:jobs"),
            due: format!("{queue}:due"),
            completed: format!("{queue}:completed"),
            failed: format!("{queue}:failed"),
        }
    }
}

// ---------------------------------------------------------------------------
// JobQueue
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct JobQueue {
    db: Arc<Database>,
    name: String,
    names: TableNames,
    policy: RetryPolicy,
    clock: Arc<dyn Clock>,
}

impl JobQueue {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    fn jobs_def(&self) -> JobsTable<'_> {
        TableDefinition::new(&self.names.jobs)
    }

    fn index_def<'a>(&self, name: &'a str) -> IndexTable<'a> {
        TableDefinition::new(name)
    }

    /// Add `job` under its deterministic id, runnable at
    /// `max(scheduled_at, now)`. Returns `false` if the id already exists.
    pub fn enqueue<J: Job>(&self, job: &J) -> Result<bool> {
        if J::QUEUE != self.name {
            return Err(TickError::Queue(format!(
                "job for queue '{}' sent to queue '{}'",
                J::QUEUE,
                self.name
            )));
        }
        let id = job.job_id();
        let now = self.clock.now();
        let run_at = job.scheduled_at().max(now);
        let record = JobRecord {
            id: id.clone(),
            queue: self.name.clone(),
            payload: job::encode(job)?,
            state: JobState::Pending,
            attempts: 0,
            max_attempts: self.policy.max_attempts,
            run_at,
            created_at: now,
            updated_at: now,
            last_error: None,
            finished_at: None,
        };
        let value = serde_json::to_vec(&record)?;

        let wt = self.db.begin_write().map_err(queue_err)?;
        let inserted = {
            let mut jobs = wt.open_table(self.jobs_def()).map_err(queue_err)?;
            if jobs.get(id.as_str()).map_err(queue_err)?.is_some() {
                false
            } else {
                jobs.insert(id.as_str(), value.as_slice())
                    .map_err(queue_err)?;
                let mut due = wt
                    .open_table(self.index_def(&self.names.due))
                    .map_err(queue_err)?;
                due.insert(time_key(run_at, &id).as_slice(), id.as_bytes())
                    .map_err(queue_err)?;
                true
            }
        };
        wt.commit().map_err(queue_err)?;
        Ok(inserted)
    }

    /// Move up to `limit` due jobs to `running`, counting one attempt each.
    pub fn claim_due(&self, limit: usize) -> Result<Vec<JobRecord>> {
        let now = self.clock.now();
        let upper = due_upper_bound(now);
        let wt = self.db.begin_write().map_err(queue_err)?;
        let mut claimed = Vec::new();
        {
            let mut due = wt
                .open_table(self.index_def(&self.names.due))
                .map_err(queue_err)?;
            let mut jobs = wt.open_table(self.jobs_def()).map_err(queue_err)?;

            let mut ready: Vec<(Vec<u8>, String)> = Vec::new();
            for entry in due.range(..upper.as_slice()).map_err(queue_err)? {
                if ready.len() >= limit {
                    break;
                }
                let (k, v) = entry.map_err(queue_err)?;
                ready.push((
                    k.value().to_vec(),
                    String::from_utf8_lossy(v.value()).into_owned(),
                ));
            }

            for (key, id) in ready {
                due.remove(key.as_slice()).map_err(queue_err)?;
                let Some(raw) = jobs
                    .get(id.as_str())
                    .map_err(queue_err)?
                    .map(|g| g.value().to_vec())
                else {
                    continue;
                };
                let mut record: JobRecord = serde_json::from_slice(&raw)?;
                record.state = JobState::Running;
                record.attempts += 1;
                record.updated_at = now;
                let value = serde_json::to_vec(&record)?;
                jobs.insert(id.as_str(), value.as_slice())
                    .map_err(queue_err)?;
                claimed.push(record);
            }
        }
        wt.commit().map_err(queue_err)?;
        Ok(claimed)
    }

    pub fn complete(&self, id: &str) -> Result<()> {
        let now = self.clock.now();
        let wt = self.db.begin_write().map_err(queue_err)?;
        {
            let mut jobs = wt.open_table(self.jobs_def()).map_err(queue_err)?;
            let mut record = load_record(&jobs, id)?;
            record.state = JobState::Completed;
            record.updated_at = now;
            record.finished_at = Some(now);
            let value = serde_json::to_vec(&record)?;
            jobs.insert(id, value.as_slice()).map_err(queue_err)?;

            let mut done = wt
                .open_table(self.index_def(&self.names.completed))
                .map_err(queue_err)?;
            done.insert(time_key(now, id).as_slice(), id.as_bytes())
                .map_err(queue_err)?;
            prune(&mut jobs, &mut done, self.policy.keep_completed)?;
        }
        wt.commit().map_err(queue_err)?;
        Ok(())
    }

    /// Record a failed attempt. Retryable failures with attempts left are
    /// re-delayed with exponential backoff; everything else is terminal.
    pub fn fail(&self, id: &str, error: &str, retryable: bool) -> Result<FailOutcome> {
        let now = self.clock.now();
        let wt = self.db.begin_write().map_err(queue_err)?;
        let outcome = {
            let mut jobs = wt.open_table(self.jobs_def()).map_err(queue_err)?;
            let mut record = load_record(&jobs, id)?;
            record.last_error = Some(error.to_string());
            record.updated_at = now;

            let outcome = if retryable && record.attempts < record.max_attempts {
                let run_at = now + self.policy.backoff(record.attempts);
                record.state = JobState::Pending;
                record.run_at = run_at;
                let mut due = wt
                    .open_table(self.index_def(&self.names.due))
                    .map_err(queue_err)?;
                due.insert(time_key(run_at, id).as_slice(), id.as_bytes())
                    .map_err(queue_err)?;
                FailOutcome::Retrying { run_at }
            } else {
                record.state = JobState::Failed;
                record.finished_at = Some(now);
                FailOutcome::Failed
            };

            let value = serde_json::to_vec(&record)?;
            jobs.insert(id, value.as_slice()).map_err(queue_err)?;

            if outcome == FailOutcome::Failed {
                let mut failed = wt
                    .open_table(self.index_def(&self.names.failed))
                    .map_err(queue_err)?;
                failed
                    .insert(time_key(now, id).as_slice(), id.as_bytes())
                    .map_err(queue_err)?;
                prune(&mut jobs, &mut failed, self.policy.keep_failed)?;
            }
            outcome
        };
        wt.commit().map_err(queue_err)?;
        Ok(outcome)
    }

    /// Return jobs stuck in `running` for longer than `max_age` (a worker
    /// died mid-job) to the due set. A stalled job that has already used
    /// every attempt is failed instead.
    pub fn recover_stalled(&self, max_age: Duration) -> Result<Recovered> {
        let now = self.clock.now();
        let cutoff = now - chrono::Duration::from_std(max_age).map_err(queue_err)?;
        let wt = self.db.begin_write().map_err(queue_err)?;
        let mut recovered = Recovered::default();
        {
            let mut jobs = wt.open_table(self.jobs_def()).map_err(queue_err)?;
            let mut stalled = Vec::new();
            for entry in jobs.iter().map_err(queue_err)? {
                let (_, v) = entry.map_err(queue_err)?;
                let record: JobRecord = serde_json::from_slice(v.value())?;
                if record.state == JobState::Running && record.updated_at < cutoff {
                    stalled.push(record);
                }
            }

            let mut due = wt
                .open_table(self.index_def(&self.names.due))
                .map_err(queue_err)?;
            let mut failed = wt
                .open_table(self.index_def(&self.names.failed))
                .map_err(queue_err)?;
            for mut record in stalled {
                record.updated_at = now;
                if record.attempts >= record.max_attempts {
                    record.state = JobState::Failed;
                    record.finished_at = Some(now);
                    record.last_error = Some(format!(
                        "stalled after {} of {} attempts",
                        record.attempts, record.max_attempts
                    ));
                    failed
                        .insert(time_key(now, &record.id).as_slice(), record.id.as_bytes())
                        .map_err(queue_err)?;
                    recovered.failed += 1;
                } else {
                    record.state = JobState::Pending;
                    record.run_at = now;
                    record.last_error = Some("recovered after stalling".to_string());
                    due.insert(time_key(now, &record.id).as_slice(), record.id.as_bytes())
                        .map_err(queue_err)?;
                    recovered.requeued += 1;
                }
                let value = serde_json::to_vec(&record)?;
                jobs.insert(record.id.as_str(), value.as_slice())
                    .map_err(queue_err)?;
            }
            if recovered.failed > 0 {
                prune(&mut jobs, &mut failed, self.policy.keep_failed)?;
            }
        }
        wt.commit().map_err(queue_err)?;
        Ok(recovered)
    }

    pub fn get(&self, id: &str) -> Result<Option<JobRecord>> {
        let rt = self.db.begin_read().map_err(queue_err)?;
        let jobs = rt.open_table(self.jobs_def()).map_err(queue_err)?;
        let Some(raw) = jobs
            .get(id)
            .map_err(queue_err)?
            .map(|g| g.value().to_vec())
        else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_slice(&raw)?))
    }

    pub fn stats(&self) -> Result<QueueStats> {
        let now = self.clock.now();
        let rt = self.db.begin_read().map_err(queue_err)?;
        let jobs = rt.open_table(self.jobs_def()).map_err(queue_err)?;
        let mut stats = QueueStats::default();
        for entry in jobs.iter().map_err(queue_err)? {
            let (_, v) = entry.map_err(queue_err)?;
            let record: JobRecord = serde_json::from_slice(v.value())?;
            match record.state {
                JobState::Pending if record.run_at <= now => stats.waiting += 1,
                JobState::Pending => stats.delayed += 1,
                JobState::Running => stats.running += 1,
                JobState::Completed => stats.completed += 1,
                JobState::Failed => stats.failed += 1,
            }
        }
        Ok(stats)
    }

    /// Terminal failures, newest first.
    pub fn failed(&self, limit: usize) -> Result<Vec<JobRecord>> {
        let rt = self.db.begin_read().map_err(queue_err)?;
        let index = rt
            .open_table(self.index_def(&self.names.failed))
            .map_err(queue_err)?;
        let jobs = rt.open_table(self.jobs_def()).map_err(queue_err)?;
        let mut out = Vec::new();
        for entry in index.iter().map_err(queue_err)?.rev() {
            if out.len() >= limit {
                break;
            }
            let (_, v) = entry.map_err(queue_err)?;
            let id = String::from_utf8_lossy(v.value()).into_owned();
            if let Some(raw) = jobs
                .get(id.as_str())
                .map_err(queue_err)?
                .map(|g| g.value().to_vec())
            {
                out.push(serde_json::from_slice(&raw)?);
            }
        }
        Ok(out)
    }
}

fn load_record(jobs: &Table<'_, &'static str, &'static [u8]>, id: &str) -> Result<JobRecord> {
    let raw = jobs
        .get(id)
        .map_err(queue_err)?
        .map(|g| g.value().to_vec())
        .ok_or_else(|| TickError::JobNotFound(id.to_string()))?;
    Ok(serde_json::from_slice(&raw)?)
}

/// Drop the oldest finished jobs beyond `keep` from both the index and the
/// jobs table.
fn prune(
    jobs: &mut Table<'_, &'static str, &'static [u8]>,
    index: &mut Table<'_, &'static [u8], &'static [u8]>,
    keep: usize,
) -> Result<usize> {
    let len = index.len().map_err(queue_err)? as usize;
    if len <= keep {
        return Ok(0);
    }
    let mut victims = Vec::with_capacity(len - keep);
    for entry in index.iter().map_err(queue_err)?.take(len - keep) {
        let (k, v) = entry.map_err(queue_err)?;
        victims.push((
            k.value().to_vec(),
            String::from_utf8_lossy(v.value()).into_owned(),
        ));
    }
    for (key, id) in &victims {
        index.remove(key.as_slice()).map_err(queue_err)?;
        jobs.remove(id.as_str()).map_err(queue_err)?;
    }
    Ok(victims.len())
}
