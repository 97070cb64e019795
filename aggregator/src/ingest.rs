//! # Ingestion gate
//!
//! Validates submitted events and appends them to the queue. Never touches the store.
use std::time::Instant;

use serde_json::Value;
use tracing::debug;

use crate::api::ApiError;
use crate::event::Event;
use crate::metrics::{EVENTS_RECEIVED, PUBLISH_ENQUEUE_SECONDS};
use crate::queue::EventQueue;
use crate::stats::Stats;

/// Turn a request body into events: either a single event object or a non-empty array of them.
/// Any invalid event rejects the whole body.
pub fn parse_events(body: Value) -> Result<Vec<Event>, ApiError> {
    let events = match body {
        Value::Array(items) => {
            if items.is_empty() {
                return Err(ApiError::EmptyBatch);
            }
            items
                .into_iter()
                .enumerate()
                .map(|(index, item)| {
                    serde_json::from_value::<Event>(item)
                        .map_err(|e| ApiError::InvalidEvent(format!("event {index}: {e}")))
                })
                .collect::<Result<Vec<_>, _>>()?
        }
        Value::Object(_) => {
            let event = serde_json::from_value::<Event>(body)
                .map_err(|e| ApiError::InvalidEvent(e.to_string()))?;
            vec![event]
        }
        other => {
            return Err(ApiError::InvalidEvent(format!(
                "expected an event object or an array of events, got {}",
                json_type(&other)
            )))
        }
    };

    Ok(events)
}

/// Enqueue `events` in order with a single push and count them as received.
/// Returns how many events were queued.
pub async fn publish(
    queue: &dyn EventQueue,
    stats: &Stats,
    events: Vec<Event>,
) -> Result<usize, ApiError> {
    if events.is_empty() {
        return Err(ApiError::EmptyBatch);
    }

    let mut messages = Vec::with_capacity(events.len());
    for (index, event) in events.iter().enumerate() {
        event
            .validate()
            .map_err(|e| ApiError::InvalidEvent(format!("event {index}: {e}")))?;
        let message = serde_json::to_string(event)
            .map_err(|e| ApiError::InvalidEvent(format!("event {index}: {e}")))?;
        messages.push(message);
    }

    let count = messages.len();
    let start = Instant::now();

    // Count first: once pushed, a worker may process an event before we get to run again,
    // and `received` must never trail the consumer counters.
    stats.record_received(count as u64);
    if let Err(error) = queue.push(messages).await {
        stats.revert_received(count as u64);
        return Err(ApiError::from(error));
    }

    metrics::counter!(EVENTS_RECEIVED).increment(count as u64);
    metrics::histogram!(PUBLISH_ENQUEUE_SECONDS).record(start.elapsed().as_secs_f64());
    debug!(count, "queued events");

    Ok(count)
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
