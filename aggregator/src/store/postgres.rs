use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde_json::{Map, Value};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use tracing::debug;

use super::{EventStore, InsertOutcome, StoreError};
use crate::event::{EventRecord, StoredEvent};

const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

/// An event store backed by the `events` table in PostgreSQL.
#[derive(Clone)]
pub struct PgEventStore {
    pool: PgPool,
}

#[derive(Debug, sqlx::FromRow)]
struct EventRow {
    id: i64,
    topic: String,
    event_id: String,
    timestamp: NaiveDateTime,
    source: String,
    payload: Json<Map<String, Value>>,
    received_at: NaiveDateTime,
}

impl From<EventRow> for StoredEvent {
    fn from(row: EventRow) -> Self {
        StoredEvent {
            id: row.id,
            topic: row.topic,
            event_id: row.event_id,
            timestamp: row.timestamp,
            source: row.source,
            payload: row.payload.0,
            received_at: row.received_at,
        }
    }
}

impl PgEventStore {
    /// Connect to the database at `url` and bring its schema up to date.
    pub async fn new(url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .test_before_acquire(true)
            .connect(url)
            .await
            .map_err(|error| StoreError::ConnectionError { error })?;

        sqlx::migrate!("../migrations").run(&pool).await?;
        debug!(max_connections, "connected to event store");

        Ok(Self { pool })
    }

    /// Use an existing pool. The schema is assumed to be in place.
    pub fn new_from_pool(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EventStore for PgEventStore {
    async fn insert(&self, record: &EventRecord) -> Result<InsertOutcome, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|error| StoreError::ConnectionError { error })?;

        let result = sqlx::query(
            r#"
INSERT INTO events (topic, event_id, timestamp, source, payload)
VALUES ($1, $2, $3, $4, $5)
ON CONFLICT (topic, event_id) DO NOTHING
            "#,
        )
        .bind(&record.topic)
        .bind(&record.event_id)
        .bind(record.timestamp)
        .bind(&record.source)
        .bind(Json(&record.payload))
        .execute(&mut *tx)
        .await
        .map_err(|error| StoreError::QueryError {
            command: "INSERT".to_owned(),
            error,
        })?;

        tx.commit()
            .await
            .map_err(|error| StoreError::QueryError {
                command: "COMMIT".to_owned(),
                error,
            })?;

        if result.rows_affected() == 0 {
            Ok(InsertOutcome::Duplicate)
        } else {
            Ok(InsertOutcome::Inserted)
        }
    }

    async fn list(&self, topic: Option<&str>, limit: i64) -> Result<Vec<StoredEvent>, StoreError> {
        let rows: Vec<EventRow> = match topic {
            Some(topic) => {
                sqlx::query_as(
                    r#"
SELECT id, topic, event_id, timestamp, source, payload, received_at
FROM events
WHERE topic = $1
ORDER BY timestamp DESC, id DESC
LIMIT $2
                    "#,
                )
                .bind(topic)
                .bind(limit)
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query_as(
                    r#"
SELECT id, topic, event_id, timestamp, source, payload, received_at
FROM events
ORDER BY timestamp DESC, id DESC
LIMIT $1
                    "#,
                )
                .bind(limit)
                .fetch_all(&self.pool)
                .await
            }
        }
        .map_err(|error| StoreError::QueryError {
            command: "SELECT".to_owned(),
            error,
        })?;

        Ok(rows.into_iter().map(StoredEvent::from).collect())
    }

    async fn topics(&self) -> Result<Vec<String>, StoreError> {
        sqlx::query_scalar("SELECT DISTINCT topic FROM events ORDER BY topic")
            .fetch_all(&self.pool)
            .await
            .map_err(|error| StoreError::QueryError {
                command: "SELECT DISTINCT".to_owned(),
                error,
            })
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
