use async_trait::async_trait;
use futures_util::StreamExt;
use redis::AsyncCommands;
use tracing::info;
use uuid::Uuid;

use kerbside_shared::events::OccupancyUpdate;

use crate::feed::{FeedError, OccupancyFeed, UpdateStream};

/// Occupancy feed over Redis pub/sub, for deployments where occupancy
/// changes propagate across devices. One channel per facility plus a
/// firehose channel carrying every update.
pub struct RedisFeed {
    client: redis::Client,
}

const FIREHOSE_CHANNEL: &str = "occupancy:all";

fn facility_channel(facility_id: Uuid) -> String {
    format!("occupancy:{}", facility_id)
}

impl RedisFeed {
    pub fn new(connection_string: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(connection_string)?;
        Ok(Self { client })
    }

    async fn subscribe_channel(&self, channel: String) -> Result<UpdateStream, FeedError> {
        let mut pubsub = self
            .client
            .get_async_pubsub()
            .await
            .map_err(|e| FeedError::Subscribe(e.to_string()))?;
        pubsub
            .subscribe(&channel)
            .await
            .map_err(|e| FeedError::Subscribe(e.to_string()))?;
        info!(%channel, "subscribed to occupancy channel");

        let stream = pubsub.into_on_message().map(|msg| {
            let payload: String = msg
                .get_payload()
                .map_err(|e| FeedError::Subscribe(e.to_string()))?;
            serde_json::from_str::<OccupancyUpdate>(&payload)
                .map_err(|e| FeedError::Subscribe(format!("bad payload: {e}")))
        });

        Ok(stream.boxed())
    }
}

#[async_trait]
impl OccupancyFeed for RedisFeed {
    async fn publish(&self, update: &OccupancyUpdate) -> Result<(), FeedError> {
        let payload =
            serde_json::to_string(update).map_err(|e| FeedError::Publish(e.to_string()))?;

        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| FeedError::Publish(e.to_string()))?;

        conn.publish::<_, _, ()>(facility_channel(update.facility_id), &payload)
            .await
            .map_err(|e| FeedError::Publish(e.to_string()))?;
        conn.publish::<_, _, ()>(FIREHOSE_CHANNEL, &payload)
            .await
            .map_err(|e| FeedError::Publish(e.to_string()))?;

        Ok(())
    }

    async fn subscribe(&self, facility_id: Uuid) -> Result<UpdateStream, FeedError> {
        self.subscribe_channel(facility_channel(facility_id)).await
    }

    async fn subscribe_all(&self) -> Result<UpdateStream, FeedError> {
        self.subscribe_channel(FIREHOSE_CHANNEL.to_string()).await
    }
}
