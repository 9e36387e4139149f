//! Lease sweeper: a `tokio::time::interval` loop that reclaims tasks whose
//! worker died or hung mid-lease, grounded on the corpus's periodic-interval
//! actor-monitor pattern (tick, act, repeat).

use std::time::Duration;

use platform_storage::QueueRepository;

pub struct Sweeper {
    repository: QueueRepository,
    interval: Duration,
}

impl Sweeper {
    pub fn new(repository: QueueRepository, interval: Duration) -> Self {
        Self { repository, interval }
    }

    /// Runs until the process exits; intended to be handed to `tokio::spawn`.
    pub async fn run(self) {
        let mut ticker = tokio::time::interval(self.interval);
        loop {
            ticker.tick().await;
            match self.repository.reclaim_expired_leases().await {
                Ok(0) => {}
                Ok(n) => tracing::info!(reclaimed = n, "queue-sweeper-reclaimed-expired-leases"),
                Err(err) => tracing::error!(error = %err, "queue-sweeper-reclaim-failed"),
            }
        }
    }
}
