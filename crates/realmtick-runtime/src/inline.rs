use crate::scheduler::TickDispatch;
use crate::worker::{ProcessOutcome, TickWorker};
use realmtick_core::job::TickJob;
use realmtick_core::Result;
use std::sync::Arc;
use tracing::warn;

/// Fused scheduler and worker: due ticks run in the scheduler's own loop
/// instead of going through the queue.
///
/// A failing tick is logged and reported as not dispatched, so the
/// scheduler moves on to the next entity and retries this one at its next
/// interval.
pub struct InlineDispatch {
    worker: Arc<TickWorker>,
}

impl InlineDispatch {
    pub fn new(worker: Arc<TickWorker>) -> Self {
        Self { worker }
    }
}

impl TickDispatch for InlineDispatch {
    fn dispatch(&self, job: &TickJob) -> Result<bool> {
        match self.worker.process(job) {
            Ok(ProcessOutcome::Processed { .. }) => Ok(true),
            Ok(ProcessOutcome::Duplicate) => Ok(false),
            Err(e) => {
                warn!(
                    entity_id = %job.entity_id,
                    realm_id = %job.realm_id,
                    correlation_id = %job.correlation_id,
                    error = %e,
                    "inline tick failed"
                );
                Ok(false)
            }
        }
    }
}
