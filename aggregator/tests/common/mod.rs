#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Once};
use std::time::Duration;

use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use aggregator::config::Config;
use aggregator::server::{serve, StartupError};

static TRACING_INIT: Once = Once::new();
pub fn setup_tracing() {
    TRACING_INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_writer(tracing_subscriber::fmt::TestWriter::new())
            .init()
    });
}

/// A running aggregator over in-memory backends, stopped through `shutdown`.
pub struct ServerHandle {
    pub addr: SocketAddr,
    shutdown: Arc<Notify>,
    server: JoinHandle<Result<(), StartupError>>,
    client: reqwest::Client,
}

impl ServerHandle {
    pub async fn for_config(config: Config) -> Self {
        setup_tracing();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let notify = Arc::new(Notify::new());
        let shutdown = notify.clone();

        let server = tokio::spawn(async move {
            serve(config, listener, async move { notify.notified().await }).await
        });

        Self {
            addr,
            shutdown,
            server,
            client: reqwest::Client::new(),
        }
    }

    pub async fn ephemeral() -> Self {
        Self::for_config(Config::default_for_test()).await
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub async fn publish(&self, body: &Value) -> reqwest::Response {
        self.client
            .post(self.url("/publish"))
            .json(body)
            .send()
            .await
            .expect("failed to send request")
    }

    pub async fn get_json(&self, path: &str) -> Value {
        self.client
            .get(self.url(path))
            .send()
            .await
            .expect("failed to send request")
            .json()
            .await
            .expect("response is not json")
    }

    pub async fn stats(&self) -> Value {
        self.get_json("/stats").await
    }

    /// Stop the server and wait for it to drain its consumers.
    pub async fn stop(self) -> Result<(), StartupError> {
        self.shutdown.notify_one();
        tokio::time::timeout(Duration::from_secs(10), self.server)
            .await
            .expect("server did not stop in time")
            .expect("server task panicked")
    }
}

pub fn event(topic: &str, event_id: &str, timestamp: &str) -> Value {
    json!({
        "topic": topic,
        "event_id": event_id,
        "timestamp": timestamp,
        "source": "service-a",
        "payload": {"cpu_usage": 50, "memory": 512, "status": "active"}
    })
}

/// Retry `check` until it passes or five seconds went by.
pub async fn assert_or_retry<F, Fut>(check: F)
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !check().await && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    assert!(check().await)
}

/// Wait until every received event has been either stored or dropped as a duplicate.
pub async fn wait_until_drained(server: &ServerHandle) {
    assert_or_retry(|| async {
        let stats = server.stats().await;
        stats["received"].as_u64().unwrap()
            == stats["unique_processed"].as_u64().unwrap()
                + stats["duplicate_dropped"].as_u64().unwrap()
    })
    .await;
}
