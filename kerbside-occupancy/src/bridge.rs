use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use kerbside_core::repository::{OccupancyOutbox, OccupancyRepository};
use kerbside_core::{CoreError, CoreResult};
use kerbside_shared::events::OccupancyUpdate;
use kerbside_shared::models::OccupancyStatus;

use crate::feed::{FeedError, OccupancyFeed, UpdateStream};
use crate::publisher::{push_with_retry, RetryPolicy};

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// The registry already holds a live listener for this facility
    #[error("Already subscribed to facility {0}")]
    AlreadySubscribed(Uuid),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Feed(#[from] FeedError),
}

/// Delay before re-establishing a broken remote listen
const RESUBSCRIBE_DELAY: Duration = Duration::from_secs(1);

/// Scoped remote listener. Dropping the handle (or calling `release`) aborts
/// the listener task and frees the facility's registry slot; leaking one
/// would keep remote overwrites flowing into local state, so release is tied
/// to the owning context's teardown.
#[derive(Debug)]
pub struct SubscriptionHandle {
    facility_id: Option<Uuid>,
    registry: Arc<Mutex<HashSet<Uuid>>>,
    task: JoinHandle<()>,
}

impl SubscriptionHandle {
    pub fn release(self) {
        // Drop does the work.
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.task.abort();
        if let Some(facility_id) = self.facility_id {
            if let Ok(mut registry) = self.registry.lock() {
                registry.remove(&facility_id);
            }
            debug!(%facility_id, "occupancy subscription released");
        }
    }
}

/// Live mapping of facility id to the latest occupancy seen on the remote
/// feed, used for list/map views. The embedded handle keeps the listen alive.
pub struct LiveOccupancyMap {
    rx: watch::Receiver<HashMap<Uuid, OccupancyStatus>>,
    _handle: SubscriptionHandle,
}

impl LiveOccupancyMap {
    pub fn snapshot(&self) -> HashMap<Uuid, OccupancyStatus> {
        self.rx.borrow().clone()
    }

    pub fn receiver(&self) -> watch::Receiver<HashMap<Uuid, OccupancyStatus>> {
        self.rx.clone()
    }
}

/// Keeps local occupancy eventually consistent with the remote feed and
/// propagates local changes outward.
///
/// Remote-to-local is remote-wins overwrite, no merge. Local-to-remote is
/// two-phase: the local CAS write is authoritative, the remote push is
/// best-effort with an outbox for replay.
pub struct SyncBridge {
    occupancy: Arc<dyn OccupancyRepository>,
    outbox: Arc<dyn OccupancyOutbox>,
    feed: Arc<dyn OccupancyFeed>,
    registry: Arc<Mutex<HashSet<Uuid>>>,
    retry: RetryPolicy,
}

impl SyncBridge {
    pub fn new(
        occupancy: Arc<dyn OccupancyRepository>,
        outbox: Arc<dyn OccupancyOutbox>,
        feed: Arc<dyn OccupancyFeed>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            occupancy,
            outbox,
            feed,
            registry: Arc::new(Mutex::new(HashSet::new())),
            retry,
        }
    }

    pub fn feed(&self) -> Arc<dyn OccupancyFeed> {
        self.feed.clone()
    }

    /// Begin a long-lived listen for one facility. Every remote update
    /// overwrites the local record unconditionally, stamping the local
    /// last-updated time from the remote payload. The listen is attached
    /// before this returns, so no update published afterwards is missed.
    pub async fn subscribe(&self, facility_id: Uuid) -> Result<SubscriptionHandle, BridgeError> {
        {
            let mut registry = self.registry.lock().expect("subscription registry poisoned");
            if !registry.insert(facility_id) {
                return Err(BridgeError::AlreadySubscribed(facility_id));
            }
        }

        let initial = match self.feed.subscribe(facility_id).await {
            Ok(stream) => stream,
            Err(e) => {
                self.registry
                    .lock()
                    .expect("subscription registry poisoned")
                    .remove(&facility_id);
                return Err(e.into());
            }
        };

        let occupancy = self.occupancy.clone();
        let feed = self.feed.clone();
        let task = tokio::spawn(async move {
            let mut stream = initial;
            loop {
                consume_stream(&mut stream, |update| {
                    let occupancy = occupancy.clone();
                    async move {
                        if let Err(e) = occupancy.overwrite(&update).await {
                            error!(%facility_id, error = %e, "failed to apply remote occupancy");
                        }
                    }
                })
                .await;

                stream = reestablish(feed.as_ref(), Some(facility_id)).await;
            }
        });

        info!(%facility_id, "occupancy subscription started");
        Ok(SubscriptionHandle {
            facility_id: Some(facility_id),
            registry: self.registry.clone(),
            task,
        })
    }

    /// Live view of the entire remote feed. Updates also overwrite the local
    /// store, so list views and per-facility reads agree.
    pub async fn subscribe_all(&self) -> Result<LiveOccupancyMap, BridgeError> {
        let initial = self.feed.subscribe_all().await?;
        let (tx, rx) = watch::channel(HashMap::new());

        let occupancy = self.occupancy.clone();
        let feed = self.feed.clone();
        let task = tokio::spawn(async move {
            let mut stream = initial;
            loop {
                consume_stream(&mut stream, |update| {
                    let occupancy = occupancy.clone();
                    let tx = &tx;
                    async move {
                        if let Err(e) = occupancy.overwrite(&update).await {
                            error!(facility_id = %update.facility_id, error = %e,
                                "failed to apply remote occupancy");
                        }
                        tx.send_modify(|map| {
                            map.insert(update.facility_id, update.into_status());
                        });
                    }
                })
                .await;

                stream = reestablish(feed.as_ref(), None).await;
            }
        });

        Ok(LiveOccupancyMap {
            rx,
            _handle: SubscriptionHandle {
                facility_id: None,
                registry: self.registry.clone(),
                task,
            },
        })
    }

    /// Two-phase occupancy write: local CAS write first, then outbox-backed
    /// remote push. A remote failure is logged and left for replay; the
    /// local write stands either way.
    pub async fn publish(
        &self,
        status: &OccupancyStatus,
        expected_version: Option<i64>,
    ) -> CoreResult<OccupancyStatus> {
        let stored = self.occupancy.put(status, expected_version).await?;
        let update = OccupancyUpdate::from(&stored);

        let outbox_id = self.outbox.enqueue(&update).await?;

        match push_with_retry(self.feed.as_ref(), &update, &self.retry).await {
            Ok(()) => {
                self.outbox.delete(outbox_id).await?;
            }
            Err(e) => {
                // RemoteSyncFailure: not rolled back, not fatal to the caller.
                self.outbox.mark_attempt(outbox_id).await.ok();
                error!(facility_id = %update.facility_id, error = %e,
                    "remote occupancy push failed; queued for replay");
            }
        }

        Ok(stored)
    }
}

/// Drain a feed stream, applying each update; returns when the stream ends
/// or reports a non-lag error (TransientReadFailure: log and re-establish)
async fn consume_stream<F, Fut>(stream: &mut UpdateStream, mut apply: F)
where
    F: FnMut(OccupancyUpdate) -> Fut,
    Fut: std::future::Future<Output = ()>,
{
    while let Some(item) = stream.next().await {
        match item {
            Ok(update) => apply(update).await,
            Err(FeedError::Lagged(skipped)) => {
                warn!(skipped, "occupancy listener lagged");
            }
            Err(e) => {
                warn!(error = %e, "occupancy listener error, re-establishing");
                return;
            }
        }
    }
}

async fn reestablish(feed: &dyn OccupancyFeed, facility_id: Option<Uuid>) -> UpdateStream {
    loop {
        tokio::time::sleep(RESUBSCRIBE_DELAY).await;
        let attempt = match facility_id {
            Some(id) => feed.subscribe(id).await,
            None => feed.subscribe_all().await,
        };
        match attempt {
            Ok(stream) => return stream,
            Err(e) => {
                warn!(error = %e, "occupancy re-subscribe failed, retrying");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::InProcessFeed;
    use async_trait::async_trait;
    use chrono::Utc;
    use kerbside_store::Store;

    struct FailingFeed;

    #[async_trait]
    impl OccupancyFeed for FailingFeed {
        async fn publish(&self, _update: &OccupancyUpdate) -> Result<(), FeedError> {
            Err(FeedError::Publish("connection refused".to_string()))
        }

        async fn subscribe(&self, _facility_id: Uuid) -> Result<UpdateStream, FeedError> {
            Err(FeedError::Subscribe("connection refused".to_string()))
        }

        async fn subscribe_all(&self) -> Result<UpdateStream, FeedError> {
            Err(FeedError::Subscribe("connection refused".to_string()))
        }
    }

    fn retry_fast() -> RetryPolicy {
        RetryPolicy {
            attempts: 2,
            backoff: Duration::from_millis(5),
        }
    }

    async fn wait_for<F, Fut>(mut check: F) -> bool
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = bool>,
    {
        for _ in 0..100 {
            if check().await {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    #[tokio::test]
    async fn test_remote_update_overwrites_local() {
        let store = Store::in_memory().await.unwrap();
        let feed = Arc::new(InProcessFeed::new());
        let bridge = SyncBridge::new(
            store.occupancy.clone(),
            store.outbox.clone(),
            feed.clone(),
            retry_fast(),
        );

        let facility_id = Uuid::new_v4();
        let _handle = bridge.subscribe(facility_id).await.unwrap();

        let remote_time = Utc::now() - chrono::Duration::minutes(1);
        feed.publish(&OccupancyUpdate {
            facility_id,
            available_spots: 33,
            last_updated: remote_time,
        })
        .await
        .unwrap();

        let occupancy = store.occupancy.clone();
        let applied = wait_for(|| {
            let occupancy = occupancy.clone();
            async move {
                occupancy
                    .get(facility_id)
                    .await
                    .unwrap()
                    .is_some_and(|s| {
                        s.available_spots == 33
                            && s.last_updated.timestamp_millis() == remote_time.timestamp_millis()
                    })
            }
        })
        .await;
        assert!(applied, "remote update never reached the local store");
    }

    #[tokio::test]
    async fn test_duplicate_subscription_rejected_until_release() {
        let store = Store::in_memory().await.unwrap();
        let feed = Arc::new(InProcessFeed::new());
        let bridge = SyncBridge::new(
            store.occupancy.clone(),
            store.outbox.clone(),
            feed,
            retry_fast(),
        );

        let facility_id = Uuid::new_v4();
        let handle = bridge.subscribe(facility_id).await.unwrap();

        let err = bridge.subscribe(facility_id).await.unwrap_err();
        assert!(matches!(err, BridgeError::AlreadySubscribed(id) if id == facility_id));

        handle.release();
        bridge.subscribe(facility_id).await.unwrap();
    }

    #[tokio::test]
    async fn test_publish_reaches_store_and_feed_and_clears_outbox() {
        let store = Store::in_memory().await.unwrap();
        let feed = Arc::new(InProcessFeed::new());
        let bridge = SyncBridge::new(
            store.occupancy.clone(),
            store.outbox.clone(),
            feed.clone(),
            retry_fast(),
        );

        let facility_id = Uuid::new_v4();
        let mut remote = feed.subscribe(facility_id).await.unwrap();

        let stored = bridge
            .publish(&OccupancyStatus::new(facility_id, 12), None)
            .await
            .unwrap();
        assert_eq!(stored.version, 1);

        let received = remote.next().await.unwrap().unwrap();
        assert_eq!(received.available_spots, 12);

        assert_eq!(
            store
                .occupancy
                .get(facility_id)
                .await
                .unwrap()
                .unwrap()
                .available_spots,
            12
        );
        assert!(store.outbox.list_pending(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_remote_failure_keeps_local_write_and_outbox_row() {
        let store = Store::in_memory().await.unwrap();
        let bridge = SyncBridge::new(
            store.occupancy.clone(),
            store.outbox.clone(),
            Arc::new(FailingFeed),
            retry_fast(),
        );

        let facility_id = Uuid::new_v4();
        let stored = bridge
            .publish(&OccupancyStatus::new(facility_id, 8), None)
            .await
            .unwrap();
        assert_eq!(stored.available_spots, 8);

        // Local write stands, the push waits in the outbox.
        assert!(store.occupancy.get(facility_id).await.unwrap().is_some());
        let pending = store.outbox.list_pending(10).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].attempts, 1);
    }

    #[tokio::test]
    async fn test_subscribe_all_builds_live_map() {
        let store = Store::in_memory().await.unwrap();
        let feed = Arc::new(InProcessFeed::new());
        let bridge = SyncBridge::new(
            store.occupancy.clone(),
            store.outbox.clone(),
            feed.clone(),
            retry_fast(),
        );

        let map = bridge.subscribe_all().await.unwrap();

        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        feed.publish(&OccupancyUpdate {
            facility_id: a,
            available_spots: 4,
            last_updated: Utc::now(),
        })
        .await
        .unwrap();
        feed.publish(&OccupancyUpdate {
            facility_id: b,
            available_spots: 9,
            last_updated: Utc::now(),
        })
        .await
        .unwrap();

        let filled = wait_for(|| {
            let len = map.snapshot().len();
            async move { len == 2 }
        })
        .await;
        assert!(filled, "live map never saw both facilities");
        assert_eq!(map.snapshot().get(&a).unwrap().available_spots, 4);
        assert_eq!(map.snapshot().get(&b).unwrap().available_spots, 9);
    }
}
