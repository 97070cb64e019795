//! # Queue
//!
//! The FIFO list sitting between the ingestion gate and the consumer pool.
//! Pushes append to the tail, consumers block-pop from the head with a timeout.
//! There is no acknowledgement: a popped message belongs to that consumer.
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

mod memory;
mod redis;

pub use self::memory::MemoryQueue;
pub use self::redis::RedisQueue;

/// Enumeration of errors for operations on a queue.
#[derive(Error, Debug)]
pub enum QueueError {
    #[error("connection failed with: {error}")]
    ConnectionError { error: ::redis::RedisError },
    #[error("{command} command failed with: {error}")]
    CommandError {
        command: String,
        error: ::redis::RedisError,
    },
    #[error("queue is unavailable")]
    Unavailable,
}

#[async_trait]
pub trait EventQueue: Send + Sync {
    /// Append `messages`, in order, to the tail of the queue in a single atomic operation.
    async fn push(&self, messages: Vec<String>) -> Result<(), QueueError>;

    /// Open a receiver dedicated to one consumer, so a blocked pop never holds up
    /// pushes or other consumers.
    async fn receiver(&self) -> Result<Box<dyn QueueReceiver>, QueueError>;
}

#[async_trait]
pub trait QueueReceiver: Send {
    /// Pop the message at the head of the queue, waiting up to `timeout` for one.
    /// Returns `Ok(None)` when the wait ran out.
    async fn pop(&mut self, timeout: Duration) -> Result<Option<String>, QueueError>;
}
