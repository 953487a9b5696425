//! Queue Module
//!
//! Redis connection management and the Redis Streams binding of
//! [`SubmissionQueue`](crate::domain::SubmissionQueue).
//!
//! ```text
//! +-----------------------+
//! |  SubmissionQueue      |  <-- Domain contract
//! +-----------------------+
//!          |
//!          v
//! +-----------------------+
//! |  RedisStreamQueue     |  <-- One stream, one consumer group per stage
//! +-----------------------+
//!          |
//!          v
//! +-----------------------+
//! |  ConnectionManager    |  <-- Reconnecting multiplexed connection
//! +-----------------------+
//! ```

mod redis_stream;

pub use redis_stream::RedisStreamQueue;

use redis::aio::ConnectionManager;
use redis::Client;
use tracing::{info, instrument};

use crate::config::{QueueSettings, RedisSettings};

/// Creates a Redis connection manager with automatic reconnection.
///
/// # Errors
/// Returns `redis::RedisError` if the URL is invalid or the server is unreachable.
#[instrument(skip(settings), fields(url = %settings.url))]
pub async fn create_redis_client(
    settings: &RedisSettings,
) -> Result<ConnectionManager, redis::RedisError> {
    info!("Connecting to Redis...");
    let client = Client::open(settings.url.as_str())?;
    let manager = ConnectionManager::new(client).await?;
    info!("Redis connection established");
    Ok(manager)
}

/// Connects to Redis and builds the stream queue from configuration.
#[instrument(skip_all, fields(stream = %queue.stream))]
pub async fn create_stream_queue(
    redis: &RedisSettings,
    queue: &QueueSettings,
) -> Result<RedisStreamQueue, redis::RedisError> {
    let conn = create_redis_client(redis).await?;
    Ok(RedisStreamQueue::new(
        conn,
        queue.stream.clone(),
        queue.block(),
        queue.ack_timeout(),
        queue.max_len,
    ))
}
