use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;

use super::{EventStore, InsertOutcome, StoreError};
use crate::event::{EventRecord, StoredEvent};

/// An in-process store, used when running without postgres and in tests.
///
/// Uniqueness of `(topic, event_id)` is checked and enforced under one lock,
/// which plays the part of the table's unique constraint.
#[derive(Clone, Default)]
pub struct MemoryEventStore {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    events: Mutex<Vec<StoredEvent>>,
    unavailable: AtomicBool,
}

impl MemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub fn count(&self) -> usize {
        self.lock_events().len()
    }

    /// Make every operation fail, to simulate losing the database.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.inner.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.inner.unavailable.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable)
        } else {
            Ok(())
        }
    }

    fn lock_events(&self) -> MutexGuard<'_, Vec<StoredEvent>> {
        match self.inner.events.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl EventStore for MemoryEventStore {
    async fn insert(&self, record: &EventRecord) -> Result<InsertOutcome, StoreError> {
        self.check_available()?;

        let mut events = self.lock_events();
        let exists = events
            .iter()
            .any(|event| event.topic == record.topic && event.event_id == record.event_id);
        if exists {
            return Ok(InsertOutcome::Duplicate);
        }

        let id = events.len() as i64 + 1;
        events.push(StoredEvent {
            id,
            topic: record.topic.clone(),
            event_id: record.event_id.clone(),
            timestamp: record.timestamp,
            source: record.source.clone(),
            payload: record.payload.clone(),
            received_at: Utc::now().naive_utc(),
        });

        Ok(InsertOutcome::Inserted)
    }

    async fn list(&self, topic: Option<&str>, limit: i64) -> Result<Vec<StoredEvent>, StoreError> {
        self.check_available()?;

        let mut listed: Vec<StoredEvent> = self
            .lock_events()
            .iter()
            .filter(|event| topic.map_or(true, |topic| event.topic == topic))
            .cloned()
            .collect();
        listed.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));
        listed.truncate(usize::try_from(limit).unwrap_or(0));

        Ok(listed)
    }

    async fn topics(&self) -> Result<Vec<String>, StoreError> {
        self.check_available()?;

        let mut topics: Vec<String> = self
            .lock_events()
            .iter()
            .map(|event| event.topic.clone())
            .collect();
        topics.sort();
        topics.dedup();

        Ok(topics)
    }
}
