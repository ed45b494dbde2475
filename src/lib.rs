//! # resilient-client
//!
//! A resilient data-fetching layer for JSON-over-HTTP services. Every request
//! goes through the same stack:
//!
//! - a local **cache** with per-entry TTL and tag-based invalidation
//! - **deduplication** of identical concurrent requests into one execution
//! - an ordered **interceptor** pipeline around every attempt
//! - a **retry** policy with exponential backoff and bounded jitter
//! - a per-attempt **timeout** and caller-driven **cancellation**
//! - per-endpoint **performance** metrics
//!
//! ## Example
//! ```no_run
//! use resilient_client::{Client, ClientConfig, RequestConfig};
//! use serde_json::Value;
//! use std::time::Duration;
//!
//! # async fn run() -> resilient_client::ClientResult<()> {
//! let config = ClientConfig {
//!     base_url: Some("https://shop.example.com/api/".to_string()),
//!     ..Default::default()
//! };
//! let client = Client::with_reqwest(config)?;
//!
//! let products: Value = client
//!     .get("products", RequestConfig::new().cache_ttl(Duration::from_secs(30)).cache_tags(["products"]))
//!     .await?;
//!
//! client.cache().clear_by_tag("products");
//! # let _ = products;
//! # Ok(())
//! # }
//! ```

/// Error type, configuration and request/response types
pub mod core;

/// Response cache, key generation and request deduplication
pub mod caching;

/// Request/response/error hooks around each attempt
pub mod interceptors;

/// Retry policy and batch coordination
pub mod traffic;

/// Per-endpoint metrics and logging setup
pub mod observability;

/// The HTTP capability the client is built on
pub mod transport;

/// Client facade and request executor
pub mod client;

pub use client::{Client, RequestExecutor};
pub use core::config::{ClientConfig, RequestConfig, RetryCondition, RetryOptions};
pub use core::error::{ClientError, ClientResult};
pub use core::types::{Method, OutgoingRequest, RequestOptions, TransportResponse};
pub use caching::{CacheConfig, CacheStats};
pub use interceptors::{
    BearerAuthInterceptor, HookInterceptor, Interceptor, InterceptorId, LoggingInterceptor,
    RequestIdInterceptor, TokenStore,
};
pub use observability::{EndpointMetrics, PerformanceMonitor};
pub use traffic::{BatchRequest, RetryConfig};
pub use transport::{ReqwestTransport, Transport};
