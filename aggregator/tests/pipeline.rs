use futures::future::join_all;
use reqwest::StatusCode;
use serde_json::{json, Value};

use crate::common::*;

mod common;

#[tokio::test]
async fn concurrent_identical_publishes_store_one_event() {
    let server = ServerHandle::ephemeral().await;
    let body = event("payment.gateway", "txn-001", "2024-01-01T00:00:00Z");

    let responses = join_all((0..10).map(|_| server.publish(&body))).await;
    for response in responses {
        assert_eq!(response.status(), StatusCode::OK);
    }
    wait_until_drained(&server).await;

    let events = server.get_json("/events?topic=payment.gateway").await;
    assert_eq!(events.as_array().unwrap().len(), 1);

    let stats = server.stats().await;
    assert_eq!(stats["received"], 10);
    assert_eq!(stats["unique_processed"], 1);
    assert_eq!(stats["duplicate_dropped"], 9);

    server.stop().await.unwrap();
}

#[tokio::test]
async fn batch_with_a_duplicate_pair() {
    let server = ServerHandle::ephemeral().await;
    let batch = json!([
        event("order.processing", "o-1", "2024-01-01T00:00:00Z"),
        event("order.processing", "o-1", "2024-01-01T00:00:00Z"),
        event("order.processing", "o-2", "2024-01-01T00:00:01Z"),
    ]);

    let response = server.publish(&batch).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body, json!({"status": "queued", "count": 3}));
    wait_until_drained(&server).await;

    let events = server.get_json("/events").await;
    assert_eq!(events.as_array().unwrap().len(), 2);
    let stats = server.stats().await;
    assert_eq!(stats["received"], 3);
    assert_eq!(stats["unique_processed"], 2);
    assert_eq!(stats["duplicate_dropped"], 1);

    server.stop().await.unwrap();
}

#[tokio::test]
async fn same_event_id_under_two_topics_is_two_events() {
    let server = ServerHandle::ephemeral().await;

    server
        .publish(&event("user.auth", "shared", "2024-01-01T00:00:00Z"))
        .await;
    server
        .publish(&event("system.logs", "shared", "2024-01-01T00:00:00Z"))
        .await;
    wait_until_drained(&server).await;

    let stats = server.stats().await;
    assert_eq!(stats["unique_processed"], 2);
    assert_eq!(stats["duplicate_dropped"], 0);
    assert_eq!(stats["topics"], json!(["system.logs", "user.auth"]));

    server.stop().await.unwrap();
}

#[tokio::test]
async fn rejected_publish_leaves_counters_alone() {
    let server = ServerHandle::ephemeral().await;

    let response = server.publish(&json!({})).await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body: Value = response.json().await.unwrap();
    assert!(body["error"].is_string());

    let mut missing_source = event("user.auth", "e-1", "2024-01-01T00:00:00Z");
    missing_source.as_object_mut().unwrap().remove("source");
    let response = server.publish(&missing_source).await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let stats = server.stats().await;
    assert_eq!(stats["received"], 0);

    server.stop().await.unwrap();
}

#[tokio::test]
async fn counters_stay_consistent_while_consuming() {
    let server = ServerHandle::ephemeral().await;

    let batch: Vec<Value> = (0..200)
        .map(|i| {
            event(
                "system.logs",
                &format!("log-{}", i % 120),
                "2024-01-01T00:00:00Z",
            )
        })
        .collect();
    let batch = Value::Array(batch);
    let publishing = server.publish(&batch);

    let (response, observations) = tokio::join!(publishing, async {
        let mut observations = Vec::new();
        for _ in 0..20 {
            observations.push(server.stats().await);
        }
        observations
    });
    assert_eq!(response.status(), StatusCode::OK);

    for stats in observations {
        let received = stats["received"].as_u64().unwrap();
        let processed = stats["unique_processed"].as_u64().unwrap();
        let duplicates = stats["duplicate_dropped"].as_u64().unwrap();
        assert!(received >= processed + duplicates, "inconsistent stats: {stats}");
    }

    wait_until_drained(&server).await;
    let stats = server.stats().await;
    assert_eq!(stats["unique_processed"], 120);
    assert_eq!(stats["duplicate_dropped"], 80);

    server.stop().await.unwrap();
}

#[tokio::test]
async fn events_are_newest_first_and_capped() {
    let server = ServerHandle::ephemeral().await;

    let batch: Vec<Value> = (0..60)
        .map(|i| {
            event(
                "user.auth",
                &format!("e-{i}"),
                &format!("2024-01-01T00:{i:02}:00Z"),
            )
        })
        .chain(std::iter::once(event(
            "payment.gateway",
            "p-1",
            "2023-12-31T23:00:00Z",
        )))
        .collect();
    server.publish(&Value::Array(batch)).await;
    wait_until_drained(&server).await;

    let events = server.get_json("/events").await;
    let events = events.as_array().unwrap();
    assert_eq!(events.len(), 50);
    assert_eq!(events[0]["event_id"], "e-59");
    assert_eq!(events[0]["timestamp"], "2024-01-01T00:59:00");
    assert_eq!(events[49]["event_id"], "e-10");

    let filtered = server.get_json("/events?topic=payment.gateway").await;
    assert_eq!(
        filtered,
        json!([{
            "topic": "payment.gateway",
            "event_id": "p-1",
            "timestamp": "2023-12-31T23:00:00",
            "source": "service-a",
            "payload": {"cpu_usage": 50, "memory": 512, "status": "active"}
        }])
    );

    server.stop().await.unwrap();
}

#[tokio::test]
async fn probes_and_methods() {
    let server = ServerHandle::ephemeral().await;
    let client = reqwest::Client::new();

    let response = client.get(server.url("/publish")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);

    let response = client.get(server.url("/_readiness")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    assert_or_retry(|| async {
        let response = client.get(server.url("/_liveness")).send().await.unwrap();
        response.status() == StatusCode::OK
    })
    .await;

    server.stop().await.unwrap();
}
