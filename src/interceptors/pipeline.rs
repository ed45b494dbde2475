//! # Interceptor Pipeline
//!
//! Ordered request/response/error hooks applied around every transport
//! attempt.
//!
//! ## Ordering
//! Registration order is the only ordering: there is no priority field. Each
//! logical request takes a snapshot of the registered interceptors when it
//! starts, so an interceptor added while a request is in flight only affects
//! requests started afterwards.
//!
//! ## Error hooks
//! `on_error` receives the error by value and must return an error. It can
//! replace or enrich the failure, or trigger side effects, but it can never
//! turn a failure into a success.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

use crate::core::error::{ClientError, ClientResult};
use crate::core::types::{OutgoingRequest, TransportResponse};

/// Hooks around one transport attempt; every hook is optional
#[async_trait]
pub trait Interceptor: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &str {
        "interceptor"
    }

    /// Runs before every attempt, retries included
    async fn on_request(&self, request: OutgoingRequest) -> ClientResult<OutgoingRequest> {
        Ok(request)
    }

    /// Runs after a successful transport call
    async fn on_response(
        &self,
        response: TransportResponse,
        _request: &OutgoingRequest,
    ) -> ClientResult<TransportResponse> {
        Ok(response)
    }

    /// Runs on every failed attempt
    async fn on_error(&self, error: ClientError, _request: &OutgoingRequest) -> ClientError {
        error
    }
}

/// Handle returned by registration, used to remove the interceptor again
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InterceptorId(u64);

/// Registered interceptors, shared by all requests of a client
#[derive(Default)]
pub struct InterceptorPipeline {
    interceptors: RwLock<Vec<(InterceptorId, Arc<dyn Interceptor>)>>,
    next_id: AtomicU64,
}

impl fmt::Debug for InterceptorPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterceptorPipeline")
            .field("interceptors", &self.len())
            .finish()
    }
}

impl InterceptorPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an interceptor; it runs after every interceptor registered before it
    pub fn add(&self, interceptor: Arc<dyn Interceptor>) -> InterceptorId {
        let id = InterceptorId(self.next_id.fetch_add(1, Ordering::Relaxed));
        debug!(interceptor = interceptor.name(), "Registered interceptor");
        self.interceptors.write().push((id, interceptor));
        id
    }

    /// Remove a previously registered interceptor; false if it was not registered
    pub fn remove(&self, id: InterceptorId) -> bool {
        let mut interceptors = self.interceptors.write();
        let before = interceptors.len();
        interceptors.retain(|(existing, _)| *existing != id);
        before != interceptors.len()
    }

    pub fn len(&self) -> usize {
        self.interceptors.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.interceptors.read().is_empty()
    }

    /// Freeze the current registration list for one logical request
    pub fn snapshot(&self) -> InterceptorChain {
        InterceptorChain {
            interceptors: self
                .interceptors
                .read()
                .iter()
                .map(|(_, interceptor)| interceptor.clone())
                .collect(),
        }
    }
}

/// Immutable, ordered list of interceptors applied by explicit folds
#[derive(Clone, Default)]
pub struct InterceptorChain {
    interceptors: Vec<Arc<dyn Interceptor>>,
}

impl InterceptorChain {
    pub fn len(&self) -> usize {
        self.interceptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interceptors.is_empty()
    }

    pub async fn apply_request(&self, mut request: OutgoingRequest) -> ClientResult<OutgoingRequest> {
        for interceptor in &self.interceptors {
            request = interceptor.on_request(request).await?;
        }
        Ok(request)
    }

    pub async fn apply_response(
        &self,
        mut response: TransportResponse,
        request: &OutgoingRequest,
    ) -> ClientResult<TransportResponse> {
        for interceptor in &self.interceptors {
            response = interceptor.on_response(response, request).await?;
        }
        Ok(response)
    }

    pub async fn apply_error(&self, mut error: ClientError, request: &OutgoingRequest) -> ClientError {
        for interceptor in &self.interceptors {
            error = interceptor.on_error(error, request).await;
        }
        error
    }
}

type RequestHook = Box<dyn Fn(OutgoingRequest) -> ClientResult<OutgoingRequest> + Send + Sync>;
type ResponseHook =
    Box<dyn Fn(TransportResponse, &OutgoingRequest) -> ClientResult<TransportResponse> + Send + Sync>;
type ErrorHook = Box<dyn Fn(ClientError, &OutgoingRequest) -> ClientError + Send + Sync>;

/// Interceptor assembled from plain closures
///
/// ```rust
/// use resilient_client::interceptors::HookInterceptor;
///
/// let interceptor = HookInterceptor::new("tenant")
///     .on_request(|mut request| {
///         request.headers.insert("x-tenant".into(), "acme".into());
///         Ok(request)
///     });
/// ```
pub struct HookInterceptor {
    name: String,
    request: Option<RequestHook>,
    response: Option<ResponseHook>,
    error: Option<ErrorHook>,
}

impl HookInterceptor {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            request: None,
            response: None,
            error: None,
        }
    }

    pub fn on_request<F>(mut self, hook: F) -> Self
    where
        F: Fn(OutgoingRequest) -> ClientResult<OutgoingRequest> + Send + Sync + 'static,
    {
        self.request = Some(Box::new(hook));
        self
    }

    pub fn on_response<F>(mut self, hook: F) -> Self
    where
        F: Fn(TransportResponse, &OutgoingRequest) -> ClientResult<TransportResponse>
            + Send
            + Sync
            + 'static,
    {
        self.response = Some(Box::new(hook));
        self
    }

    pub fn on_error<F>(mut self, hook: F) -> Self
    where
        F: Fn(ClientError, &OutgoingRequest) -> ClientError + Send + Sync + 'static,
    {
        self.error = Some(Box::new(hook));
        self
    }
}

#[async_trait]
impl Interceptor for HookInterceptor {
    fn name(&self) -> &str {
        &self.name
    }

    async fn on_request(&self, request: OutgoingRequest) -> ClientResult<OutgoingRequest> {
        match &self.request {
            Some(hook) => hook(request),
            None => Ok(request),
        }
    }

    async fn on_response(
        &self,
        response: TransportResponse,
        request: &OutgoingRequest,
    ) -> ClientResult<TransportResponse> {
        match &self.response {
            Some(hook) => hook(response, request),
            None => Ok(response),
        }
    }

    async fn on_error(&self, error: ClientError, request: &OutgoingRequest) -> ClientError {
        match &self.error {
            Some(hook) => hook(error, request),
            None => error,
        }
    }
}
