use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use kerbside_core::repository::OccupancyOutbox;
use kerbside_shared::events::OccupancyUpdate;

use crate::feed::{FeedError, OccupancyFeed};

/// Bounded retry for one remote push
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff: Duration::from_millis(200),
        }
    }
}

pub(crate) async fn push_with_retry(
    feed: &dyn OccupancyFeed,
    update: &OccupancyUpdate,
    policy: &RetryPolicy,
) -> Result<(), FeedError> {
    let mut last_error = FeedError::Publish("no attempts configured".to_string());

    for attempt in 1..=policy.attempts {
        match feed.publish(update).await {
            Ok(()) => return Ok(()),
            Err(e) => {
                warn!(facility_id = %update.facility_id, attempt, error = %e,
                    "occupancy push attempt failed");
                last_error = e;
                if attempt < policy.attempts {
                    tokio::time::sleep(policy.backoff).await;
                }
            }
        }
    }

    Err(last_error)
}

const REPLAY_BATCH: i64 = 50;

/// Drains the occupancy outbox on an interval, replaying pushes that never
/// acked. Rows stay until a push succeeds; the remote side is
/// last-write-wins so replaying stale updates is harmless.
pub struct OutboxReplayer {
    outbox: Arc<dyn OccupancyOutbox>,
    feed: Arc<dyn OccupancyFeed>,
    interval: Duration,
}

impl OutboxReplayer {
    pub fn new(
        outbox: Arc<dyn OccupancyOutbox>,
        feed: Arc<dyn OccupancyFeed>,
        interval: Duration,
    ) -> Self {
        Self {
            outbox,
            feed,
            interval,
        }
    }

    /// One replay pass; returns how many rows were delivered and removed
    pub async fn run_once(&self) -> usize {
        let pending = match self.outbox.list_pending(REPLAY_BATCH).await {
            Ok(pending) => pending,
            Err(e) => {
                error!(error = %e, "failed to read occupancy outbox");
                return 0;
            }
        };

        let mut delivered = 0;
        for entry in pending {
            match self.feed.publish(&entry.update).await {
                Ok(()) => {
                    if let Err(e) = self.outbox.delete(entry.id).await {
                        error!(outbox_id = entry.id, error = %e, "failed to clear outbox row");
                    } else {
                        delivered += 1;
                    }
                }
                Err(e) => {
                    warn!(outbox_id = entry.id, attempts = entry.attempts, error = %e,
                        "outbox replay attempt failed");
                    self.outbox.mark_attempt(entry.id).await.ok();
                }
            }
        }

        if delivered > 0 {
            info!(delivered, "replayed queued occupancy pushes");
        }
        delivered
    }

    /// Background replay loop; abort the handle on shutdown
    pub fn start(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                self.run_once().await;
            }
        })
    }
}
