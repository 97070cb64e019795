use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::AppState;
use crate::api::{ApiError, PublishResponse, PublishStatus, StatsResponse};
use crate::event::StoredEvent;
use crate::{ingest, query};

#[derive(Debug, Default, Deserialize)]
pub struct EventsQuery {
    pub topic: Option<String>,
}

pub async fn post_publish(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<PublishResponse>, ApiError> {
    let Json(body) = body?;
    let events = ingest::parse_events(body)?;
    debug!(count = events.len(), "received publish request");

    let count = ingest::publish(state.queue.as_ref(), &state.stats, events).await?;

    Ok(Json(PublishResponse {
        status: PublishStatus::Queued,
        count,
    }))
}

pub async fn get_events(
    State(state): State<AppState>,
    Query(params): Query<EventsQuery>,
) -> Result<Json<Vec<StoredEvent>>, ApiError> {
    let events = query::list_events(state.store.as_ref(), params.topic.as_deref()).await?;
    Ok(Json(events))
}

pub async fn get_stats(State(state): State<AppState>) -> Result<Json<StatsResponse>, ApiError> {
    let stats = query::get_stats(state.store.as_ref(), &state.stats).await?;
    Ok(Json(stats))
}
