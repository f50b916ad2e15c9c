use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use futures_util::stream::{BoxStream, StreamExt};
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use uuid::Uuid;

use kerbside_shared::events::OccupancyUpdate;

#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("Feed publish failed: {0}")]
    Publish(String),

    #[error("Feed subscribe failed: {0}")]
    Subscribe(String),

    /// Listener fell behind and missed {0} updates; the stream continues
    /// with the next delivery
    #[error("Feed listener lagged, {0} updates skipped")]
    Lagged(u64),
}

pub type UpdateStream = BoxStream<'static, Result<OccupancyUpdate, FeedError>>;

/// Path-addressable, per-facility-id keyed publish/subscribe channel.
/// Every write by any writer reaches every subscriber of that facility and
/// every firehose subscriber.
#[async_trait]
pub trait OccupancyFeed: Send + Sync {
    async fn publish(&self, update: &OccupancyUpdate) -> Result<(), FeedError>;

    async fn subscribe(&self, facility_id: Uuid) -> Result<UpdateStream, FeedError>;

    async fn subscribe_all(&self) -> Result<UpdateStream, FeedError>;
}

const TOPIC_CAPACITY: usize = 64;

/// In-process broker used in embedded mode and tests: one broadcast topic
/// per facility plus a firehose carrying everything.
pub struct InProcessFeed {
    topics: Mutex<HashMap<Uuid, broadcast::Sender<OccupancyUpdate>>>,
    firehose: broadcast::Sender<OccupancyUpdate>,
}

impl InProcessFeed {
    pub fn new() -> Self {
        let (firehose, _) = broadcast::channel(TOPIC_CAPACITY);
        Self {
            topics: Mutex::new(HashMap::new()),
            firehose,
        }
    }

    fn topic(&self, facility_id: Uuid) -> broadcast::Sender<OccupancyUpdate> {
        let mut topics = self.topics.lock().expect("feed topic registry poisoned");
        topics
            .entry(facility_id)
            .or_insert_with(|| broadcast::channel(TOPIC_CAPACITY).0)
            .clone()
    }
}

impl Default for InProcessFeed {
    fn default() -> Self {
        Self::new()
    }
}

fn into_update_stream(rx: broadcast::Receiver<OccupancyUpdate>) -> UpdateStream {
    BroadcastStream::new(rx)
        .map(|item| {
            item.map_err(|BroadcastStreamRecvError::Lagged(skipped)| FeedError::Lagged(skipped))
        })
        .boxed()
}

#[async_trait]
impl OccupancyFeed for InProcessFeed {
    async fn publish(&self, update: &OccupancyUpdate) -> Result<(), FeedError> {
        // A send with no subscribers is not a failure.
        let _ = self.topic(update.facility_id).send(update.clone());
        let _ = self.firehose.send(update.clone());
        Ok(())
    }

    async fn subscribe(&self, facility_id: Uuid) -> Result<UpdateStream, FeedError> {
        Ok(into_update_stream(self.topic(facility_id).subscribe()))
    }

    async fn subscribe_all(&self) -> Result<UpdateStream, FeedError> {
        Ok(into_update_stream(self.firehose.subscribe()))
    }
}
