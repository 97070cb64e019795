//! # Consumer pool
//!
//! A fixed number of workers, each popping one message at a time from the queue and
//! inserting it into the store. Whether an event is new or a duplicate is decided by
//! the store's uniqueness constraint alone.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use health::{ComponentStatus, HealthHandle, HealthRegistry};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::event::{Event, TimestampError, TimestampMode};
use crate::metrics::{EVENTS_DROPPED, EVENTS_PROCESSED, WORKER_RESTARTS};
use crate::queue::{EventQueue, QueueError};
use crate::retry::RetryPolicy;
use crate::stats::Stats;
use crate::store::{EventStore, InsertOutcome, StoreError};

/// Slack on top of the pop timeout before a silent worker is reported as stalled.
const LIVENESS_GRACE: Duration = Duration::from_secs(30);

/// Errors that stop a worker. The supervisor restarts it.
#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("queue failed: {0}")]
    Queue(#[from] QueueError),
}

/// Errors for a single message. The message is logged and dropped.
#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("message is not a valid event: {0}")]
    Parse(#[from] serde_json::Error),
    #[error(transparent)]
    Timestamp(#[from] TimestampError),
    #[error("failed to store event {topic}/{event_id}: {error}")]
    Store {
        topic: String,
        event_id: String,
        #[source]
        error: StoreError,
    },
}

impl ProcessError {
    fn reason(&self) -> &'static str {
        match self {
            ProcessError::Parse(_) => "parse",
            ProcessError::Timestamp(_) => "timestamp",
            ProcessError::Store { .. } => "store",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct WorkerOptions {
    /// Longest a single pop waits for a message.
    pub pop_timeout: Duration,
    pub timestamp_mode: TimestampMode,
}

/// A single consumer: one dedicated queue receiver, one message at a time.
#[derive(Clone)]
pub struct Worker {
    name: String,
    queue: Arc<dyn EventQueue>,
    store: Arc<dyn EventStore>,
    stats: Arc<Stats>,
    options: WorkerOptions,
    liveness: HealthHandle,
    /// Set once the current run has popped from the queue without error.
    progressed: Arc<AtomicBool>,
}

impl Worker {
    pub fn new(
        name: &str,
        queue: Arc<dyn EventQueue>,
        store: Arc<dyn EventStore>,
        stats: Arc<Stats>,
        options: WorkerOptions,
        liveness: HealthHandle,
    ) -> Self {
        Self {
            name: name.to_owned(),
            queue,
            store,
            stats,
            options,
            liveness,
            progressed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Consume until `shutdown` is cancelled. Cancellation is checked between pops,
    /// so an insert that already started always completes.
    pub async fn run(&self, shutdown: &CancellationToken) -> Result<(), WorkerError> {
        let mut receiver = self.queue.receiver().await?;
        debug!(worker = %self.name, "worker started");

        while !shutdown.is_cancelled() {
            self.liveness.report_healthy();

            let popped = receiver.pop(self.options.pop_timeout).await?;
            self.progressed.store(true, Ordering::Relaxed);
            let Some(message) = popped else {
                continue;
            };
            self.handle(&message).await;
        }

        self.liveness.report_status(ComponentStatus::Stopped);
        Ok(())
    }

    /// Process one message and update the counters. Failures never leave this function.
    async fn handle(&self, message: &str) -> Option<InsertOutcome> {
        match self.process(message).await {
            Ok(outcome) => {
                match outcome {
                    InsertOutcome::Inserted => {
                        self.stats.record_processed();
                        metrics::counter!(EVENTS_PROCESSED, &[("outcome", "inserted")])
                            .increment(1);
                    }
                    InsertOutcome::Duplicate => {
                        self.stats.record_duplicate();
                        metrics::counter!(EVENTS_PROCESSED, &[("outcome", "duplicate")])
                            .increment(1);
                    }
                }
                Some(outcome)
            }
            Err(e) => {
                error!(worker = %self.name, "dropping message: {}", e);
                metrics::counter!(EVENTS_DROPPED, &[("reason", e.reason())]).increment(1);
                None
            }
        }
    }

    async fn process(&self, message: &str) -> Result<InsertOutcome, ProcessError> {
        let event: Event = serde_json::from_str(message)?;
        let record = event.into_record(self.options.timestamp_mode)?;

        let outcome = self
            .store
            .insert(&record)
            .await
            .map_err(|error| ProcessError::Store {
                topic: record.topic.clone(),
                event_id: record.event_id.clone(),
                error,
            })?;

        match outcome {
            InsertOutcome::Inserted => info!(
                worker = %self.name,
                topic = %record.topic,
                event_id = %record.event_id,
                "stored event"
            ),
            InsertOutcome::Duplicate => warn!(
                worker = %self.name,
                topic = %record.topic,
                event_id = %record.event_id,
                "dropped duplicate event"
            ),
        }

        Ok(outcome)
    }
}

/// The set of workers sharing one queue and one store.
pub struct ConsumerPool {
    workers: Vec<Worker>,
    restart_policy: RetryPolicy,
}

impl ConsumerPool {
    /// Build `count` workers, each registered with `liveness` under `worker-<n>`.
    pub fn new(
        count: usize,
        queue: Arc<dyn EventQueue>,
        store: Arc<dyn EventStore>,
        stats: Arc<Stats>,
        options: WorkerOptions,
        liveness: &HealthRegistry,
        restart_policy: RetryPolicy,
    ) -> Self {
        let deadline = options.pop_timeout + LIVENESS_GRACE;
        let workers = (0..count)
            .map(|index| {
                let name = format!("worker-{index}");
                let handle = liveness.register(name.clone(), deadline);
                Worker::new(
                    &name,
                    queue.clone(),
                    store.clone(),
                    stats.clone(),
                    options,
                    handle,
                )
            })
            .collect();

        Self {
            workers,
            restart_policy,
        }
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Start one supervised task per worker on `tracker`. Every task ends once
    /// `shutdown` is cancelled and its worker has finished the message in hand.
    pub fn spawn(self, tracker: &TaskTracker, shutdown: CancellationToken) {
        info!(workers = self.workers.len(), "starting consumer pool");
        for worker in self.workers {
            tracker.spawn(supervise(
                worker,
                self.restart_policy.clone(),
                shutdown.clone(),
            ));
        }
    }
}

/// Run `worker`, restarting it with backoff whenever it fails or panics.
/// A worker that returns because of shutdown is not restarted. The backoff starts over
/// once a restarted worker has popped from the queue again.
async fn supervise(worker: Worker, restart_policy: RetryPolicy, shutdown: CancellationToken) {
    let mut restarts: u32 = 0;

    loop {
        worker.progressed.store(false, Ordering::Relaxed);
        let task = {
            let worker = worker.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move { worker.run(&shutdown).await })
        };

        let failure = match task.await {
            Ok(Ok(())) => {
                info!(worker = %worker.name, "worker stopped");
                return;
            }
            Ok(Err(e)) => e.to_string(),
            Err(e) if e.is_panic() => "worker panicked".to_owned(),
            Err(e) => e.to_string(),
        };

        if shutdown.is_cancelled() {
            warn!(worker = %worker.name, "worker failed during shutdown: {}", failure);
            return;
        }

        if worker.progressed.load(Ordering::Relaxed) {
            restarts = 0;
        }
        restarts = restarts.saturating_add(1);
        let interval = restart_policy.retry_interval(restarts);
        worker.liveness.report_status(ComponentStatus::Unhealthy);
        metrics::counter!(WORKER_RESTARTS).increment(1);
        error!(
            worker = %worker.name,
            restarts,
            ?interval,
            "worker exited unexpectedly, restarting: {}", failure
        );

        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = tokio::time::sleep(interval) => {}
        }
    }
}
