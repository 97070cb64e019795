use std::future::Future;
use std::sync::Arc;

use axum::Router;
use common_metrics::setup_metrics_routes;
use health::HealthRegistry;
use metrics_exporter_prometheus::BuildError;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

use crate::config::Config;
use crate::handlers::{add_routes, AppState};
use crate::queue::{EventQueue, MemoryQueue, QueueError, RedisQueue};
use crate::retry::retry;
use crate::stats::Stats;
use crate::store::{EventStore, MemoryEventStore, PgEventStore, StoreError};
use crate::worker::{ConsumerPool, WorkerOptions};

#[derive(Error, Debug)]
pub enum StartupError {
    #[error("event store is unreachable: {0}")]
    Store(#[from] StoreError),
    #[error("queue is unreachable: {0}")]
    Queue(#[from] QueueError),
    #[error("failed to install metrics recorder: {0}")]
    Metrics(#[from] BuildError),
    #[error("server failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Connect to postgres and redis, retrying each with backoff up to the configured attempts.
pub async fn connect_with_retry(config: &Config) -> Result<(PgEventStore, RedisQueue), StartupError> {
    let policy = config.startup.retry_policy();
    let attempts = config.startup.max_attempts;

    let store = retry(&policy, attempts, "connecting to postgres", || {
        PgEventStore::new(&config.database_url, config.max_pg_connections)
    })
    .await?;
    info!("connected to postgres");

    let queue = retry(&policy, attempts, "connecting to redis", || {
        RedisQueue::new(
            &config.redis_url,
            config.queue_name.as_str(),
            config.pop_timeout.0,
        )
    })
    .await?;
    info!(queue = config.queue_name.as_str(), "connected to redis");

    Ok((store, queue))
}

/// Run the consumer pool and the HTTP server until `shutdown` resolves.
///
/// On shutdown the server stops accepting requests, the workers finish the message they
/// hold, and only then is the store closed. Waiting for workers is bounded by the
/// configured shutdown timeout.
pub async fn serve<F>(config: Config, listener: TcpListener, shutdown: F) -> Result<(), StartupError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let (queue, store): (Arc<dyn EventQueue>, Arc<dyn EventStore>) = if config.ephemeral {
        warn!("using in-memory queue and store, events will not survive a restart");
        (Arc::new(MemoryQueue::new()), Arc::new(MemoryEventStore::new()))
    } else {
        let (store, queue) = connect_with_retry(&config).await?;
        (Arc::new(queue), Arc::new(store))
    };

    let stats = Arc::new(Stats::new());
    let liveness = HealthRegistry::new("liveness");
    let token = CancellationToken::new();
    let tracker = TaskTracker::new();

    let options = WorkerOptions {
        pop_timeout: config.pop_timeout.0,
        timestamp_mode: config.timestamp_mode,
    };
    let pool = ConsumerPool::new(
        config.worker_count,
        queue.clone(),
        store.clone(),
        stats.clone(),
        options,
        &liveness,
        config.worker_restart_policy(),
    );
    if pool.is_empty() {
        warn!("no consumers configured, published events will stay queued");
    }

    let state = AppState {
        queue,
        store: store.clone(),
        stats,
        liveness,
    };
    let router = add_routes(
        Router::new(),
        state,
        config.max_body_size,
        config.concurrency_limit,
    );
    let router = if config.export_prometheus {
        setup_metrics_routes(router)?
    } else {
        router
    };

    pool.spawn(&tracker, token.clone());
    tracker.close();

    let signal_token = token.clone();
    tokio::spawn(async move {
        shutdown.await;
        info!("shutdown requested");
        signal_token.cancel();
    });

    info!(address = ?listener.local_addr().ok(), "listening");
    let served = axum::serve(listener, router)
        .with_graceful_shutdown(token.clone().cancelled_owned())
        .await;
    token.cancel();

    if tokio::time::timeout(config.shutdown_timeout.0, tracker.wait())
        .await
        .is_err()
    {
        warn!(
            timeout = ?config.shutdown_timeout.0,
            "consumers did not stop in time"
        );
    }
    store.close().await;
    info!("shutdown complete");

    served?;
    Ok(())
}
