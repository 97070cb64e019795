//! # Query surface
//!
//! Read-only views over the store and the counters.
use crate::api::{ApiError, StatsResponse};
use crate::event::StoredEvent;
use crate::stats::{format_uptime, Stats};
use crate::store::{EventStore, LIST_LIMIT};

/// The newest stored events, optionally for one topic only. An empty topic means no filter.
pub async fn list_events(
    store: &dyn EventStore,
    topic: Option<&str>,
) -> Result<Vec<StoredEvent>, ApiError> {
    let topic = topic.filter(|topic| !topic.is_empty());
    Ok(store.list(topic, LIST_LIMIT).await?)
}

/// Counters, distinct stored topics and uptime. Topics are read from the store on every call.
pub async fn get_stats(store: &dyn EventStore, stats: &Stats) -> Result<StatsResponse, ApiError> {
    let snapshot = stats.snapshot();
    let topics = store.topics().await?;

    Ok(StatsResponse {
        received: snapshot.received,
        unique_processed: snapshot.processed_success,
        duplicate_dropped: snapshot.duplicates_dropped,
        topics,
        uptime: format_uptime(stats.uptime()),
    })
}
