//! # HTTP Transport Integration Tests
//!
//! The full client stack over the reqwest transport against a local mock
//! server.

use resilient_client::{
    Client, ClientConfig, ClientError, ReqwestTransport, RequestConfig, RetryConfig,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Product {
    id: u32,
    name: String,
}

fn config(server: &MockServer) -> ClientConfig {
    ClientConfig {
        base_url: Some(format!("{}/api/", server.uri())),
        retry: RetryConfig {
            max_retries: 2,
            retry_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(50),
            jitter: false,
        },
        ..Default::default()
    }
}

#[tokio::test]
async fn test_typed_get_is_cached() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/products/1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 1, "name": "lamp"})))
        .expect(1)
        .mount(&server)
        .await;

    let client = Client::with_reqwest(config(&server)).unwrap();
    for _ in 0..3 {
        let product: Product = client.get("products/1", RequestConfig::new()).await.unwrap();
        assert_eq!(product.name, "lamp");
    }
    client.close();
}

#[tokio::test]
async fn test_post_sends_json_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/products"))
        .and(header("content-type", "application/json"))
        .and(body_json(json!({"id": 2, "name": "desk"})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": 2, "name": "desk"})))
        .expect(1)
        .mount(&server)
        .await;

    let client = Client::with_reqwest(config(&server)).unwrap();
    let product = Product {
        id: 2,
        name: "desk".to_string(),
    };
    let created: Product = client
        .post("products", &product, RequestConfig::new())
        .await
        .unwrap();
    assert_eq!(created, product);
}

#[tokio::test]
async fn test_server_error_retried_then_surfaced() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/unstable"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .expect(3)
        .mount(&server)
        .await;

    let client = Client::with_reqwest(config(&server)).unwrap();
    let error = client
        .get::<serde_json::Value>("unstable", RequestConfig::new())
        .await
        .unwrap_err();
    assert_eq!(error, ClientError::http(503, "maintenance"));
}

#[tokio::test]
async fn test_slow_server_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/slow"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
        .mount(&server)
        .await;

    let client = Client::with_reqwest(config(&server)).unwrap();
    let config = RequestConfig::new()
        .timeout(Duration::from_millis(100))
        .max_retries(0);
    let error = client
        .get::<serde_json::Value>("slow", config)
        .await
        .unwrap_err();
    assert_eq!(error, ClientError::Timeout { timeout_ms: 100 });
}

#[tokio::test]
async fn test_reqwest_timeout_reported_as_transport_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/slow"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
        .mount(&server)
        .await;

    let http = reqwest::Client::builder()
        .timeout(Duration::from_millis(50))
        .build()
        .unwrap();
    let client = Client::new(
        config(&server),
        Arc::new(ReqwestTransport::with_client(http)),
    )
    .unwrap();
    let config = RequestConfig::new()
        .timeout(Duration::from_secs(5))
        .max_retries(0);
    let error = client
        .get::<serde_json::Value>("slow", config)
        .await
        .unwrap_err();

    assert!(matches!(
        &error,
        ClientError::Transport { message } if message.starts_with("transport timed out")
    ));
    assert!(error.is_retryable());
}

#[tokio::test]
async fn test_empty_body_decodes_as_null() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/api/products/3"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let client = Client::with_reqwest(config(&server)).unwrap();
    let value: serde_json::Value = client
        .delete("products/3", RequestConfig::new())
        .await
        .unwrap();
    assert!(value.is_null());
}
