//! # Batch Integration Tests
//!
//! Ordering, failure isolation and window sizing for `batch` and
//! `request_with_concurrency`.

mod common;

use common::{client, Reply};
use resilient_client::{BatchRequest, ClientError, Method, RequestConfig, RequestOptions};
use serde_json::{json, Value};
use std::time::Duration;

fn script_letters(transport: &common::ScriptedTransport) {
    for (name, delay) in [("A", 40), ("B", 10), ("C", 30), ("D", 5), ("E", 20)] {
        let endpoint = format!("/{}", name);
        transport.respond(&endpoint, Reply::Json(200, json!(name)));
        transport.delay(&endpoint, Duration::from_millis(delay));
    }
}

fn letters() -> Vec<BatchRequest> {
    ["/A", "/B", "/C", "/D", "/E"]
        .into_iter()
        .map(BatchRequest::get)
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_windowed_results_keep_input_order() {
    let (client, transport) = client();
    script_letters(&transport);

    let results = client.request_with_concurrency::<Value>(letters(), 2).await;

    let values: Vec<Value> = results.into_iter().map(Result::unwrap).collect();
    assert_eq!(values, vec![json!("A"), json!("B"), json!("C"), json!("D"), json!("E")]);
    assert_eq!(transport.peak_concurrency(), 2);

    // windows run back to back: [A,B] 40ms, [C,D] 30ms, [E] 20ms
    let order: Vec<String> = transport.requests().into_iter().map(|r| r.endpoint).collect();
    assert_eq!(order, vec!["/A", "/B", "/C", "/D", "/E"]);
}

#[tokio::test(start_paused = true)]
async fn test_window_waits_for_slowest_member() {
    let (client, transport) = client();
    script_letters(&transport);

    let started = tokio::time::Instant::now();
    let results = client.request_with_concurrency::<Value>(letters(), 2).await;
    assert_eq!(results.len(), 5);

    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(90), "elapsed {:?}", elapsed);
}

#[tokio::test(start_paused = true)]
async fn test_zero_limit_is_sequential() {
    let (client, transport) = client();
    script_letters(&transport);

    let results = client.request_with_concurrency::<Value>(letters(), 0).await;
    assert!(results.iter().all(Result::is_ok));
    assert_eq!(transport.peak_concurrency(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_unbounded_batch_runs_everything_at_once() {
    let (client, transport) = client();
    script_letters(&transport);

    let results = client.batch::<Value>(letters()).await;
    let values: Vec<Value> = results.into_iter().map(Result::unwrap).collect();
    assert_eq!(values[0], json!("A"));
    assert_eq!(values[4], json!("E"));
    assert_eq!(transport.peak_concurrency(), 5);
}

#[tokio::test(start_paused = true)]
async fn test_failures_stay_in_their_slot() {
    let (client, transport) = client();
    transport.respond("/ok", Reply::Json(200, json!({"ok": true})));
    transport.respond("/gone", Reply::Status(410));
    transport.respond("/orders", Reply::Json(201, json!({"id": 1})));

    let requests = vec![
        BatchRequest::get("/ok"),
        BatchRequest::get("/gone"),
        BatchRequest::new(
            "/orders",
            RequestOptions::new(Method::Post).with_body(json!({"sku": "lamp"})),
            RequestConfig::new(),
        ),
    ];

    let results = client.request_with_concurrency::<Value>(requests, 2).await;
    assert_eq!(results[0], Ok(json!({"ok": true})));
    assert!(matches!(results[1], Err(ClientError::Http { status: 410, .. })));
    assert_eq!(results[2], Ok(json!({"id": 1})));
}

#[tokio::test]
async fn test_empty_batch() {
    let (client, transport) = client();
    assert!(client.batch::<Value>(Vec::new()).await.is_empty());
    assert!(client
        .request_with_concurrency::<Value>(Vec::new(), 3)
        .await
        .is_empty());
    assert!(transport.requests().is_empty());
}
