//! Periodic sweep (spec §4.7's third trigger): "catches up missed transitions"
//! by re-running `schedule` for every active (plan, student) pair on a fixed
//! interval, mirroring `platform_queue::Sweeper`'s tick-then-act shape.

use std::sync::Arc;
use std::time::Duration;

use platform_storage::VirtualRepository;

use crate::progressive::ProgressiveScheduler;

pub struct Sweeper {
    scheduler: Arc<ProgressiveScheduler>,
    virtual_store: VirtualRepository,
    interval: Duration,
}

impl Sweeper {
    pub fn new(scheduler: Arc<ProgressiveScheduler>, virtual_store: VirtualRepository, interval: Duration) -> Self {
        Self { scheduler, virtual_store, interval }
    }

    /// Runs until the process exits; intended to be handed to `tokio::spawn`.
    pub async fn run(self) {
        let mut ticker = tokio::time::interval(self.interval);
        loop {
            ticker.tick().await;
            let pairs = match self.virtual_store.list_active_plan_student_pairs().await {
                Ok(pairs) => pairs,
                Err(err) => {
                    tracing::error!(error = %err, "scheduler-sweeper-list-failed");
                    continue;
                }
            };

            let mut enqueued = 0usize;
            for (plan_id, student_id) in pairs {
                match self.scheduler.schedule(plan_id, student_id).await {
                    Ok(outcome) => enqueued += outcome.enqueued_task_ids.len(),
                    Err(err) => {
                        tracing::error!(%plan_id, %student_id, error = %err, "scheduler-sweeper-schedule-failed");
                    }
                }
            }
            if enqueued > 0 {
                tracing::info!(enqueued, "scheduler-sweeper-caught-up-transitions");
            }
        }
    }
}
