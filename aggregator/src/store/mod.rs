//! # Store
//!
//! Durable storage for events, keyed uniquely by `(topic, event_id)`.
//! The uniqueness constraint is the only thing deciding whether an insert is a duplicate.
use async_trait::async_trait;
use thiserror::Error;

use crate::event::{EventRecord, StoredEvent};

mod memory;
mod postgres;

pub use self::memory::MemoryEventStore;
pub use self::postgres::PgEventStore;

/// How many events a listing returns at most.
pub const LIST_LIMIT: i64 = 50;

/// Enumeration of errors for operations on an event store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("connection failed with: {error}")]
    ConnectionError { error: sqlx::Error },
    #[error("{command} query failed with: {error}")]
    QueryError { command: String, error: sqlx::Error },
    #[error("running migrations failed with: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),
    #[error("store is unavailable")]
    Unavailable,
}

/// What happened to an insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// First time this `(topic, event_id)` was seen: a new record exists.
    Inserted,
    /// A record with this `(topic, event_id)` already existed and was left untouched.
    Duplicate,
}

#[async_trait]
pub trait EventStore: Send + Sync {
    /// Insert `record` unless its `(topic, event_id)` is already stored.
    async fn insert(&self, record: &EventRecord) -> Result<InsertOutcome, StoreError>;

    /// Stored events, newest timestamp first, optionally restricted to one topic.
    async fn list(&self, topic: Option<&str>, limit: i64) -> Result<Vec<StoredEvent>, StoreError>;

    /// Distinct topics present in the store, in ascending order.
    async fn topics(&self) -> Result<Vec<String>, StoreError>;

    /// Release any held resources. Called once, after every consumer has stopped.
    async fn close(&self) {}
}
