use crate::output::print_json;
use anyhow::Context;
use realmtick_core::clock::SystemClock;
use realmtick_core::config::Config;
use realmtick_core::job::{Job, TickJob};
use realmtick_runtime::open_queues;
use std::path::Path;
use std::sync::Arc;

pub fn run(
    root: &Path,
    realm_id: &str,
    entity_id: &str,
    delay_ms: u64,
    json: bool,
) -> anyhow::Result<()> {
    let config = Config::load_effective(root).context("failed to load config")?;
    let queues = open_queues(root, &config.queue, Arc::new(SystemClock))
        .context("failed to open job queue (is 'realmtick run' holding it?)")?;

    let delay = chrono::Duration::milliseconds(i64::try_from(delay_ms).unwrap_or(i64::MAX));
    let run_at = chrono::Utc::now()
        .checked_add_signed(delay)
        .context("--delay-ms is out of range")?;
    let job = TickJob::new(realm_id, entity_id, run_at);
    let job_id = job.job_id();
    let added = queues.ticks.enqueue(&job)?;

    if json {
        print_json(&serde_json::json!({
            "job_id": job_id,
            "correlation_id": job.correlation_id,
            "run_at": job.scheduled_at(),
            "enqueued": added,
        }))?;
    } else if added {
        println!("Enqueued {job_id}");
    } else {
        println!("Already queued: {job_id}");
    }
    Ok(())
}
