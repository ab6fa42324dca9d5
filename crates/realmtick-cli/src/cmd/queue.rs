use crate::output::{print_json, print_table, truncate};
use anyhow::Context;
use clap::Subcommand;
use realmtick_core::clock::SystemClock;
use realmtick_core::config::Config;
use realmtick_core::queue::{JobQueue, Recovered};
use realmtick_runtime::{open_queues, Queues};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

// ---------------------------------------------------------------------------
// Subcommand types
// ---------------------------------------------------------------------------

#[derive(Subcommand)]
pub enum QueueSubcommand {
    /// Job counts per state for every queue
    Stats,

    /// List permanently failed jobs, newest first
    Failed {
        #[arg(long, default_value = "20")]
        limit: usize,
    },

    /// Return abandoned running jobs to pending
    Recover {
        /// Treat jobs running longer than this as abandoned
        /// (default: queue.stalled_after_secs)
        #[arg(long)]
        older_than_secs: Option<u64>,
    },
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub fn run(root: &Path, subcmd: QueueSubcommand, json: bool) -> anyhow::Result<()> {
    let config = Config::load_effective(root).context("failed to load config")?;
    let queues = open_queues(root, &config.queue, Arc::new(SystemClock))
        .context("failed to open job queue (is 'realmtick run' holding it?)")?;
    match subcmd {
        QueueSubcommand::Stats => stats(&queues, json),
        QueueSubcommand::Failed { limit } => failed(&queues, limit, json),
        QueueSubcommand::Recover { older_than_secs } => {
            let max_age = older_than_secs.unwrap_or(config.queue.stalled_after_secs);
            recover(&queues, Duration::from_secs(max_age), json)
        }
    }
}

fn all(queues: &Queues) -> [&JobQueue; 2] {
    [&queues.ticks, &queues.digests]
}

// ---------------------------------------------------------------------------
// stats
// ---------------------------------------------------------------------------

fn stats(queues: &Queues, json: bool) -> anyhow::Result<()> {
    let mut per_queue = Vec::new();
    for q in all(queues) {
        per_queue.push((q.name().to_string(), q.stats()?));
    }

    if json {
        let by_name: BTreeMap<_, _> = per_queue.into_iter().collect();
        return print_json(&by_name);
    }

    let rows = per_queue
        .iter()
        .map(|(name, s)| {
            vec![
                name.clone(),
                s.waiting.to_string(),
                s.delayed.to_string(),
                s.running.to_string(),
                s.completed.to_string(),
                s.failed.to_string(),
            ]
        })
        .collect();
    print_table(
        &["QUEUE", "WAITING", "DELAYED", "RUNNING", "COMPLETED", "FAILED"],
        rows,
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// failed
// ---------------------------------------------------------------------------

fn failed(queues: &Queues, limit: usize, json: bool) -> anyhow::Result<()> {
    let mut jobs = Vec::new();
    for q in all(queues) {
        jobs.extend(q.failed(limit)?);
    }
    jobs.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
    jobs.truncate(limit);

    if json {
        return print_json(&jobs);
    }
    if jobs.is_empty() {
        println!("No failed jobs.");
        return Ok(());
    }
    let rows = jobs
        .iter()
        .map(|j| {
            vec![
                j.queue.clone(),
                j.id.clone(),
                format!("{}/{}", j.attempts, j.max_attempts),
                j.updated_at.format("%Y-%m-%d %H:%M:%S").to_string(),
                truncate(j.last_error.as_deref().unwrap_or("-"), 60),
            ]
        })
        .collect();
    print_table(&["QUEUE", "JOB", "ATTEMPTS", "FAILED AT", "ERROR"], rows);
    Ok(())
}

// ---------------------------------------------------------------------------
// recover
// ---------------------------------------------------------------------------

fn recover(queues: &Queues, max_age: Duration, json: bool) -> anyhow::Result<()> {
    let mut by_name = BTreeMap::new();
    let mut total = Recovered::default();
    for q in all(queues) {
        let r = q.recover_stalled(max_age)?;
        total += r;
        by_name.insert(q.name().to_string(), r);
    }

    if json {
        return print_json(&by_name);
    }
    if total.total() == 0 {
        println!("No stalled jobs.");
        return Ok(());
    }
    if total.requeued > 0 {
        println!("Returned {} stalled job(s) to the queue.", total.requeued);
    }
    if total.failed > 0 {
        println!(
            "Failed {} stalled job(s) that had no attempts left.",
            total.failed
        );
    }
    Ok(())
}
