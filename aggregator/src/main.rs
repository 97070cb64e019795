//! Accept events over HTTP, queue them in redis and store each one once in postgres.
use envconfig::Envconfig;
use tokio::signal;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use aggregator::config::Config;
use aggregator::server::{serve, StartupError};

async fn shutdown() {
    let mut term = signal::unix::signal(signal::unix::SignalKind::terminate())
        .expect("failed to register SIGTERM handler");

    let mut interrupt = signal::unix::signal(signal::unix::SignalKind::interrupt())
        .expect("failed to register SIGINT handler");

    tokio::select! {
        _ = term.recv() => {},
        _ = interrupt.recv() => {},
    };

    tracing::info!("Shutdown status change: TERMINATING");
}

#[tokio::main]
async fn main() -> Result<(), StartupError> {
    let config = Config::init_from_env().expect("Invalid configuration:");

    // stdout with a level configured by the RUST_LOG envvar (default=INFO)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let listener = tokio::net::TcpListener::bind(config.bind())
        .await
        .expect("could not bind port");
    serve(config, listener, shutdown()).await?;

    tracing::info!("Shutdown status change: COMPLETED");
    Ok(())
}
