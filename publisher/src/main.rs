//! Simulate clients of the aggregator: post a new or replayed event every tick.
use envconfig::Envconfig;
use eyre::Result;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::signal;
use tokio::time::{Interval, MissedTickBehavior};
use tracing::level_filters::LevelFilter;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::generator::{EventGenerator, Generated};

mod config;
mod generator;

async fn shutdown() {
    let mut term = signal::unix::signal(signal::unix::SignalKind::terminate())
        .expect("failed to register SIGTERM handler");

    let mut interrupt = signal::unix::signal(signal::unix::SignalKind::interrupt())
        .expect("failed to register SIGINT handler");

    tokio::select! {
        _ = term.recv() => {},
        _ = interrupt.recv() => {},
    };
}

/// Ticks every `period`. A slow send pushes the next tick back instead of bursting.
fn new_ticker(period: std::time::Duration) -> Interval {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

async fn send(client: &reqwest::Client, url: &str, generated: &Generated) {
    let event = generated.event();
    let kind = if generated.is_duplicate() {
        "duplicate"
    } else {
        "new"
    };

    match client.post(url).json(event).send().await {
        Ok(response) if response.status().is_success() => info!(
            kind,
            topic = %event.topic,
            event_id = %event.event_id,
            "sent event"
        ),
        Ok(response) => warn!(
            kind,
            status = %response.status(),
            event_id = %event.event_id,
            "event was rejected"
        ),
        Err(e) => error!(kind, event_id = %event.event_id, "failed to send event: {}", e),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let config = Config::init_from_env()?;
    let client = reqwest::Client::builder()
        .timeout(config.request_timeout.0)
        .build()?;
    let mut generator = EventGenerator::new(
        StdRng::from_entropy(),
        config.history_size,
        config.duplicate_rate,
    );

    info!(
        target_url = %config.target_url,
        interval = ?config.tick_interval.0,
        "starting publisher"
    );

    let mut ticker = new_ticker(config.tick_interval.0);
    let shutdown = shutdown();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = ticker.tick() => {
                let generated = generator.next_event(chrono::Utc::now());
                send(&client, &config.target_url, &generated).await;
            }
        }
    }

    info!("publisher stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn missed_ticks_are_not_replayed() {
        let mut ticker = new_ticker(Duration::from_millis(50));
        ticker.tick().await;

        tokio::time::sleep(Duration::from_millis(200)).await;
        ticker.tick().await;

        let next = tokio::time::timeout(Duration::from_millis(10), ticker.tick()).await;
        assert!(next.is_err());
    }
}
