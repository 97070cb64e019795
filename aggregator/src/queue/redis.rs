use std::time::Duration;

use ::redis::aio::MultiplexedConnection;
use ::redis::{AsyncCommands, AsyncConnectionConfig, Client};
use async_trait::async_trait;
use tracing::debug;

use super::{EventQueue, QueueError, QueueReceiver};

/// Upper bound on how long we wait for redis to answer a non-blocking command.
const RESPONSE_TIMEOUT: Duration = Duration::from_secs(5);
const CONNECTION_TIMEOUT: Duration = Duration::from_secs(5);

/// A queue backed by a single redis list: `RPUSH` to enqueue, `BLPOP` to dequeue.
pub struct RedisQueue {
    key: String,
    client: Client,
    /// Shared by every publisher; multiplexed, so cheap to clone.
    connection: MultiplexedConnection,
    /// Longest blocking pop a receiver will issue.
    max_block: Duration,
}

impl RedisQueue {
    /// Connect to redis at `url` and use the list stored under `key`.
    /// `max_block` is the longest pop timeout receivers will be asked to honour.
    pub async fn new(url: &str, key: &str, max_block: Duration) -> Result<Self, QueueError> {
        let client = Client::open(url).map_err(|error| QueueError::ConnectionError { error })?;

        let config = AsyncConnectionConfig::new()
            .set_response_timeout(RESPONSE_TIMEOUT)
            .set_connection_timeout(CONNECTION_TIMEOUT);
        let mut connection = client
            .get_multiplexed_async_connection_with_config(&config)
            .await
            .map_err(|error| QueueError::ConnectionError { error })?;

        let pong: String = ::redis::cmd("PING")
            .query_async(&mut connection)
            .await
            .map_err(|error| QueueError::ConnectionError { error })?;
        debug!(key, %pong, "connected to redis queue");

        Ok(Self {
            key: key.to_owned(),
            client,
            connection,
            max_block,
        })
    }
}

#[async_trait]
impl EventQueue for RedisQueue {
    async fn push(&self, messages: Vec<String>) -> Result<(), QueueError> {
        if messages.is_empty() {
            return Ok(());
        }

        // A single RPUSH with many values is atomic: the batch lands as a whole, in order.
        let mut connection = self.connection.clone();
        let length: i64 = connection
            .rpush(&self.key, messages)
            .await
            .map_err(|error| QueueError::CommandError {
                command: "RPUSH".to_owned(),
                error,
            })?;
        debug!(key = %self.key, length, "pushed to redis queue");

        Ok(())
    }

    async fn receiver(&self) -> Result<Box<dyn QueueReceiver>, QueueError> {
        // BLPOP occupies the whole connection while it waits, so every receiver gets its own,
        // with a response timeout that leaves room for the blocking wait itself.
        let config = AsyncConnectionConfig::new()
            .set_response_timeout(self.max_block + RESPONSE_TIMEOUT)
            .set_connection_timeout(CONNECTION_TIMEOUT);
        let connection = self
            .client
            .get_multiplexed_async_connection_with_config(&config)
            .await
            .map_err(|error| QueueError::ConnectionError { error })?;

        Ok(Box::new(RedisReceiver {
            key: self.key.clone(),
            connection,
            max_block: self.max_block,
        }))
    }
}

struct RedisReceiver {
    key: String,
    connection: MultiplexedConnection,
    max_block: Duration,
}

#[async_trait]
impl QueueReceiver for RedisReceiver {
    async fn pop(&mut self, timeout: Duration) -> Result<Option<String>, QueueError> {
        // BLPOP treats 0 as "block forever", which would make shutdown wait indefinitely.
        let seconds = timeout.min(self.max_block).as_secs_f64().max(0.01);

        let popped: Option<(String, String)> = self
            .connection
            .blpop(&self.key, seconds)
            .await
            .map_err(|error| QueueError::CommandError {
                command: "BLPOP".to_owned(),
                error,
            })?;

        Ok(popped.map(|(_key, message)| message))
    }
}
