//! # Request Executor
//!
//! Turns one logical request into at most `max_retries + 1` transport
//! exchanges:
//!
//! ```text
//! cache check ─hit──────────────────────────────────────────────▶ caller
//!      │miss
//!      ▼
//! deduplicator ─▶ on_request ─▶ transport (timeout) ─▶ on_response ─▶ cache write ─▶ metrics
//!                     ▲                │failure
//!                     │                ▼
//!                     └── backoff ◀─ on_error ─▶ retry policy ─give up─▶ metrics
//! ```
//!
//! Every suspension point (transport call, backoff delay) is raced against a
//! single `CancellationToken` per execution, so cancellation stops the
//! in-flight call and any further retries immediately.

use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

use crate::caching::{CacheStore, KeyGenerator, RequestDeduplicator};
use crate::core::config::{ClientConfig, RequestConfig};
use crate::core::error::{ClientError, ClientResult};
use crate::core::types::{Method, OutgoingRequest, RequestOptions};
use crate::interceptors::{InterceptorChain, InterceptorPipeline};
use crate::observability::PerformanceMonitor;
use crate::traffic::retry::{RetryContext, RetryDecision, RetryPolicy};
use crate::transport::Transport;

/// Cache write performed after a successful execution
#[derive(Debug, Clone)]
struct CacheWrite {
    ttl: Duration,
    tags: Vec<String>,
}

/// Everything one execution needs, resolved up front
struct RequestPlan {
    endpoint: String,
    method: Method,
    url: String,
    headers: HashMap<String, String>,
    body: Option<Bytes>,
    key: String,
    timeout: Duration,
    retry: RetryPolicy,
    cache_write: Option<CacheWrite>,
    /// Tags invalidated after a successful write
    invalidate_tags: Vec<String>,
    interceptors: InterceptorChain,
}

impl RequestPlan {
    fn outgoing(&self, attempt: u32) -> OutgoingRequest {
        OutgoingRequest {
            endpoint: self.endpoint.clone(),
            method: self.method,
            url: self.url.clone(),
            headers: self.headers.clone(),
            body: self.body.clone(),
            attempt,
        }
    }
}

/// Orchestrates cache, deduplication, interceptors, retries and metrics
pub struct RequestExecutor {
    config: ClientConfig,
    base_url: Option<Url>,
    transport: Arc<dyn Transport>,
    cache: Arc<CacheStore>,
    keys: KeyGenerator,
    deduplicator: RequestDeduplicator<serde_json::Value>,
    interceptors: InterceptorPipeline,
    monitor: PerformanceMonitor,
    shutdown: CancellationToken,
}

impl RequestExecutor {
    pub fn new(config: ClientConfig, transport: Arc<dyn Transport>) -> ClientResult<Self> {
        config.validate()?;
        let base_url = config.base_url.as_deref().map(Url::parse).transpose()?;
        let shutdown = CancellationToken::new();

        Ok(Self {
            base_url,
            transport,
            cache: Arc::new(CacheStore::new(&config.cache)),
            keys: KeyGenerator::new(config.cache.max_key_length),
            deduplicator: RequestDeduplicator::new(shutdown.clone()),
            interceptors: InterceptorPipeline::new(),
            monitor: PerformanceMonitor::new(),
            shutdown,
            config,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<CacheStore> {
        &self.cache
    }

    pub fn interceptors(&self) -> &InterceptorPipeline {
        &self.interceptors
    }

    pub fn monitor(&self) -> &PerformanceMonitor {
        &self.monitor
    }

    pub fn deduplicator(&self) -> &RequestDeduplicator<serde_json::Value> {
        &self.deduplicator
    }

    /// Cancel every in-flight execution; later requests fail with `Cancelled`
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Execute one logical request and return the decoded JSON body
    pub async fn execute(
        self: &Arc<Self>,
        endpoint: &str,
        options: RequestOptions,
        config: RequestConfig,
    ) -> ClientResult<serde_json::Value> {
        if self.shutdown.is_cancelled() {
            return Err(ClientError::Cancelled);
        }

        let plan = self.plan(endpoint, options, &config)?;

        if plan.cache_write.is_some() {
            if let Some(value) = self.cache.get(&plan.key) {
                debug!(key = %plan.key, "Cache hit");
                return Ok(value);
            }
            debug!(key = %plan.key, "Cache miss");
        }

        let caller_cancel = config.cancel_token.unwrap_or_default();
        let deduplicate = config.deduplicate.unwrap_or(self.config.deduplicate);

        if deduplicate {
            let key = plan.key.clone();
            let executor = Arc::clone(self);
            self.deduplicator
                .dedupe(&key, &caller_cancel, move |token| async move {
                    executor.run(plan, token).await
                })
                .await
        } else {
            let token = self.shutdown.child_token();
            let run = self.run(plan, token.clone());
            tokio::pin!(run);
            tokio::select! {
                result = &mut run => result,
                _ = caller_cancel.cancelled() => {
                    token.cancel();
                    run.await
                }
            }
        }
    }

    fn plan(
        &self,
        endpoint: &str,
        options: RequestOptions,
        config: &RequestConfig,
    ) -> ClientResult<RequestPlan> {
        let method = options.method;
        let key = self.keys.generate(method, endpoint, options.body.as_ref());

        let mut headers = self.config.default_headers.clone();
        headers.extend(options.headers);
        headers.extend(config.headers.clone());

        let body = match &options.body {
            Some(value) => {
                if !headers.keys().any(|name| name.eq_ignore_ascii_case("content-type")) {
                    headers.insert("Content-Type".to_string(), "application/json".to_string());
                }
                Some(Bytes::from(serde_json::to_vec(value)?))
            }
            None => None,
        };

        let use_cache = config.cache.unwrap_or_else(|| method.caches_by_default());
        let cache_write = use_cache.then(|| CacheWrite {
            ttl: config.cache_ttl.unwrap_or(self.config.cache.default_ttl),
            tags: config.cache_tags.clone(),
        });
        let invalidate_tags = if use_cache || method.caches_by_default() {
            Vec::new()
        } else {
            config.cache_tags.clone()
        };

        Ok(RequestPlan {
            endpoint: endpoint.to_string(),
            method,
            url: self.resolve_url(endpoint)?,
            headers,
            body,
            key,
            timeout: config.timeout.unwrap_or(self.config.timeout),
            retry: RetryPolicy::resolve(&self.config.retry, &config.retry),
            cache_write,
            invalidate_tags,
            interceptors: self.interceptors.snapshot(),
        })
    }

    /// Absolute endpoints are used as-is; others are joined onto `base_url`
    fn resolve_url(&self, endpoint: &str) -> ClientResult<String> {
        if let Ok(url) = Url::parse(endpoint) {
            return Ok(url.to_string());
        }
        match &self.base_url {
            Some(base) => Ok(base.join(endpoint)?.to_string()),
            None => Ok(endpoint.to_string()),
        }
    }

    /// Retry loop, cache write and metrics for one execution
    async fn run(&self, plan: RequestPlan, token: CancellationToken) -> ClientResult<serde_json::Value> {
        let started = Instant::now();
        let mut context = RetryContext::new(&plan.retry);

        let result = loop {
            let error = match self.attempt(&plan, context.exchanges(), &token).await {
                Ok(value) => break Ok(value),
                Err(error) => error,
            };

            match plan.retry.decide(&error, &context) {
                RetryDecision::GiveUp => break Err(error),
                RetryDecision::Retry { delay } => {
                    warn!(
                        endpoint = %plan.endpoint,
                        attempt = context.exchanges(),
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Request attempt failed, retrying"
                    );
                    context.last_error = Some(error);
                    tokio::select! {
                        biased;
                        _ = token.cancelled() => break Err(ClientError::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                    context.attempt += 1;
                }
            }
        };

        if let Ok(value) = &result {
            if let Some(write) = &plan.cache_write {
                self.cache.set(&plan.key, value.clone(), write.ttl, write.tags.iter().cloned());
            }
            for tag in &plan.invalidate_tags {
                self.cache.clear_by_tag(tag);
            }
        }

        self.monitor
            .record_request(&plan.endpoint, started.elapsed(), result.is_ok());
        result
    }

    /// One exchange: request hooks, bounded transport call, response/error hooks
    async fn attempt(
        &self,
        plan: &RequestPlan,
        attempt: u32,
        token: &CancellationToken,
    ) -> ClientResult<serde_json::Value> {
        if token.is_cancelled() {
            return Err(ClientError::Cancelled);
        }

        let original = plan.outgoing(attempt);
        let request = match plan.interceptors.apply_request(original.clone()).await {
            Ok(request) => request,
            Err(error) => return Err(plan.interceptors.apply_error(error, &original).await),
        };

        let exchange = tokio::time::timeout(plan.timeout, self.transport.call(request.clone()));
        let response = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(ClientError::Cancelled),
            outcome = exchange => match outcome {
                Ok(result) => result,
                Err(_) => Err(ClientError::Timeout {
                    timeout_ms: plan.timeout.as_millis() as u64,
                }),
            },
        };

        let processed = match response {
            Ok(response) if response.is_success() => {
                match plan.interceptors.apply_response(response, &request).await {
                    Ok(response) => response.json_value(),
                    Err(error) => Err(error),
                }
            }
            Ok(response) => Err(ClientError::http(response.status, response.text())),
            Err(error) => Err(error),
        };

        match processed {
            Ok(value) => Ok(value),
            Err(error) => Err(plan.interceptors.apply_error(error, &request).await),
        }
    }
}
