pub mod api;
pub mod config;
pub mod event;
pub mod handlers;
pub mod ingest;
pub mod metrics;
pub mod query;
pub mod queue;
pub mod retry;
pub mod server;
pub mod stats;
pub mod store;
pub mod worker;
