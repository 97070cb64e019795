use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::{routing, Router};
use health::HealthRegistry;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::trace::TraceLayer;

use super::events;
use crate::queue::EventQueue;
use crate::stats::Stats;
use crate::store::EventStore;

/// Everything the HTTP handlers share.
#[derive(Clone)]
pub struct AppState {
    pub queue: Arc<dyn EventQueue>,
    pub store: Arc<dyn EventStore>,
    pub stats: Arc<Stats>,
    pub liveness: HealthRegistry,
}

pub fn add_routes(
    router: Router,
    state: AppState,
    max_body_size: usize,
    concurrency_limit: usize,
) -> Router {
    let liveness = state.liveness.clone();

    let api = Router::new()
        .route(
            "/publish",
            routing::post(events::post_publish)
                .layer::<_, Infallible>(ConcurrencyLimitLayer::new(concurrency_limit))
                .layer(DefaultBodyLimit::max(max_body_size)),
        )
        .route("/events", routing::get(events::get_events))
        .route("/stats", routing::get(events::get_stats))
        .with_state(state);

    router
        .route("/", routing::get(index))
        .route("/_readiness", routing::get(index))
        .route(
            "/_liveness",
            routing::get(move || std::future::ready(liveness.get_status())),
        )
        .merge(api)
        .layer(TraceLayer::new_for_http())
}

pub async fn index() -> &'static str {
    "log aggregator"
}
