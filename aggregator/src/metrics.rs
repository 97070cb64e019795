//! Names of the metrics the aggregator records.
pub const EVENTS_RECEIVED: &str = "events_received_total";
/// Labelled with `outcome`: `inserted` or `duplicate`.
pub const EVENTS_PROCESSED: &str = "events_processed_total";
/// Labelled with `reason`: `parse`, `timestamp` or `store`.
pub const EVENTS_DROPPED: &str = "events_dropped_total";
pub const PUBLISH_ENQUEUE_SECONDS: &str = "publish_enqueue_seconds";
pub const WORKER_RESTARTS: &str = "worker_restarts_total";
