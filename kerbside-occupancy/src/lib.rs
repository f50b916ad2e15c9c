pub mod bridge;
pub mod feed;
pub mod publisher;
pub mod redis_feed;

pub use bridge::{BridgeError, LiveOccupancyMap, SubscriptionHandle, SyncBridge};
pub use feed::{FeedError, InProcessFeed, OccupancyFeed, UpdateStream};
pub use publisher::{OutboxReplayer, RetryPolicy};
pub use redis_feed::RedisFeed;
