//! # Client Facade
//!
//! The public entry point: verb helpers, batch execution, cache and
//! performance namespaces, and interceptor registration. `Client` is a cheap
//! handle; clones share the same cache, metrics, interceptors and in-flight
//! request table.

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::caching::{CacheStats, CacheSweeper};
use crate::client::executor::RequestExecutor;
use crate::core::config::{ClientConfig, RequestConfig};
use crate::core::error::ClientResult;
use crate::core::types::{Method, RequestOptions};
use crate::interceptors::{Interceptor, InterceptorId};
use crate::observability::EndpointMetrics;
use crate::traffic::batch::{run_all, run_windowed, BatchRequest};
use crate::transport::{ReqwestTransport, Transport};

#[derive(Clone)]
pub struct Client {
    executor: Arc<RequestExecutor>,
    sweeper: Arc<Mutex<Option<CacheSweeper>>>,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("base_url", &self.executor.config().base_url)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Client {
    /// Build a client over any transport
    ///
    /// When called inside a tokio runtime and `cache.sweep_interval` is set,
    /// a background task periodically removes expired cache entries.
    pub fn new(config: ClientConfig, transport: Arc<dyn Transport>) -> ClientResult<Self> {
        let sweep_interval = config.cache.sweep_interval;
        let executor = Arc::new(RequestExecutor::new(config, transport)?);

        let sweeper = match sweep_interval {
            Some(interval) if tokio::runtime::Handle::try_current().is_ok() => {
                Some(CacheSweeper::start(executor.cache().clone(), interval))
            }
            _ => None,
        };

        info!(
            base_url = ?executor.config().base_url,
            sweeper = sweeper.is_some(),
            "Client initialized"
        );

        Ok(Self {
            executor,
            sweeper: Arc::new(Mutex::new(sweeper)),
        })
    }

    /// Build a client over the default reqwest transport
    pub fn with_reqwest(config: ClientConfig) -> ClientResult<Self> {
        Self::new(config, Arc::new(ReqwestTransport::new()?))
    }

    pub fn config(&self) -> &ClientConfig {
        self.executor.config()
    }

    /// Execute a request and decode the JSON body into `T`
    pub async fn request<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        options: RequestOptions,
        config: RequestConfig,
    ) -> ClientResult<T> {
        let value = self.executor.execute(endpoint, options, config).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Execute a request with the method given as a string, e.g. from user input
    pub async fn send(
        &self,
        method: &str,
        endpoint: &str,
        body: Option<serde_json::Value>,
        config: RequestConfig,
    ) -> ClientResult<serde_json::Value> {
        let method: Method = method.parse()?;
        let mut options = RequestOptions::new(method);
        options.body = body;
        self.request(endpoint, options, config).await
    }

    /// GET; cached by default
    pub async fn get<T: DeserializeOwned>(&self, endpoint: &str, config: RequestConfig) -> ClientResult<T> {
        self.request(endpoint, RequestOptions::new(Method::Get), config)
            .await
    }

    /// POST with a JSON body; not cached by default
    pub async fn post<T, B>(&self, endpoint: &str, body: &B, config: RequestConfig) -> ClientResult<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.write(Method::Post, endpoint, body, config).await
    }

    pub async fn put<T, B>(&self, endpoint: &str, body: &B, config: RequestConfig) -> ClientResult<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.write(Method::Put, endpoint, body, config).await
    }

    pub async fn patch<T, B>(&self, endpoint: &str, body: &B, config: RequestConfig) -> ClientResult<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.write(Method::Patch, endpoint, body, config).await
    }

    pub async fn delete<T: DeserializeOwned>(&self, endpoint: &str, config: RequestConfig) -> ClientResult<T> {
        self.request(endpoint, RequestOptions::new(Method::Delete), config)
            .await
    }

    async fn write<T, B>(
        &self,
        method: Method,
        endpoint: &str,
        body: &B,
        config: RequestConfig,
    ) -> ClientResult<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let body = serde_json::to_value(body)?;
        let options = RequestOptions::new(method).with_body(body);
        self.request(endpoint, options, config).await
    }

    /// Run every request concurrently; one result per request, in input order
    pub async fn batch<T: DeserializeOwned>(&self, requests: Vec<BatchRequest>) -> Vec<ClientResult<T>> {
        debug!(size = requests.len(), "Executing batch");
        run_all(requests, |request| self.request_entry(request)).await
    }

    /// Run requests in sequential windows of at most `limit`
    ///
    /// Each window starts only when the previous one has fully settled, so a
    /// single slow request holds back the next window. `limit == 0` is
    /// treated as 1.
    pub async fn request_with_concurrency<T: DeserializeOwned>(
        &self,
        requests: Vec<BatchRequest>,
        limit: usize,
    ) -> Vec<ClientResult<T>> {
        debug!(size = requests.len(), limit = limit, "Executing windowed batch");
        run_windowed(requests, limit, |request| self.request_entry(request)).await
    }

    async fn request_entry<T: DeserializeOwned>(&self, request: BatchRequest) -> ClientResult<T> {
        self.request(&request.endpoint, request.options, request.config)
            .await
    }

    pub fn cache(&self) -> CacheHandle<'_> {
        CacheHandle { client: self }
    }

    pub fn performance(&self) -> PerformanceHandle<'_> {
        PerformanceHandle { client: self }
    }

    /// Register an interceptor; it applies to requests started afterwards
    pub fn add_interceptor<I: Interceptor + 'static>(&self, interceptor: I) -> InterceptorId {
        self.executor.interceptors().add(Arc::new(interceptor))
    }

    pub fn remove_interceptor(&self, id: InterceptorId) -> bool {
        self.executor.interceptors().remove(id)
    }

    /// Stop the cache sweeper and cancel every in-flight request
    ///
    /// Requests issued after `close` fail with `ClientError::Cancelled`.
    pub fn close(&self) {
        if let Some(sweeper) = self.sweeper.lock().take() {
            sweeper.stop();
        }
        self.executor.shutdown();
        info!("Client closed");
    }

    pub fn is_closed(&self) -> bool {
        self.executor.is_shut_down()
    }

    /// Number of distinct requests currently in flight through deduplication
    pub fn pending_requests(&self) -> usize {
        self.executor.deduplicator().pending_count()
    }
}

/// `client.cache()` namespace
#[derive(Debug, Clone, Copy)]
pub struct CacheHandle<'a> {
    client: &'a Client,
}

impl CacheHandle<'_> {
    pub fn clear(&self) {
        self.client.executor.cache().clear();
    }

    /// Remove every entry carrying `tag`, returning how many were removed
    pub fn clear_by_tag(&self, tag: &str) -> usize {
        self.client.executor.cache().clear_by_tag(tag)
    }

    pub fn clear_expired(&self) -> usize {
        self.client.executor.cache().clear_expired()
    }

    pub fn get_stats(&self) -> CacheStats {
        self.client.executor.cache().stats()
    }
}

/// `client.performance()` namespace
#[derive(Debug, Clone, Copy)]
pub struct PerformanceHandle<'a> {
    client: &'a Client,
}

impl PerformanceHandle<'_> {
    pub fn get_metrics(&self) -> HashMap<String, EndpointMetrics> {
        self.client.executor.monitor().get_metrics()
    }

    pub fn endpoint(&self, endpoint: &str) -> Option<EndpointMetrics> {
        self.client.executor.monitor().endpoint(endpoint)
    }

    pub fn clear_metrics(&self) {
        self.client.executor.monitor().clear_metrics();
    }
}
