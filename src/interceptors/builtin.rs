//! # Built-in Interceptors
//!
//! Interceptors for common client concerns: bearer authentication with
//! credential clearing on 401, request IDs, and request logging.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::core::error::{ClientError, ClientResult};
use crate::core::types::{OutgoingRequest, TransportResponse};
use crate::interceptors::pipeline::Interceptor;

/// Shared storage for the current access token
#[derive(Debug, Clone, Default)]
pub struct TokenStore {
    token: Arc<RwLock<Option<String>>>,
}

impl TokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set<S: Into<String>>(&self, token: S) {
        *self.token.write() = Some(token.into());
    }

    pub fn get(&self) -> Option<String> {
        self.token.read().clone()
    }

    pub fn clear(&self) {
        *self.token.write() = None;
    }
}

/// Adds `Authorization: Bearer <token>` and forgets the token on a 401
///
/// Because request hooks run before every attempt, a token refreshed in the
/// store between retries is picked up by the next attempt.
#[derive(Debug, Clone)]
pub struct BearerAuthInterceptor {
    store: TokenStore,
}

impl BearerAuthInterceptor {
    pub fn new(store: TokenStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Interceptor for BearerAuthInterceptor {
    fn name(&self) -> &str {
        "bearer_auth"
    }

    async fn on_request(&self, mut request: OutgoingRequest) -> ClientResult<OutgoingRequest> {
        if let Some(token) = self.store.get() {
            request
                .headers
                .retain(|name, _| !name.eq_ignore_ascii_case("authorization"));
            request
                .headers
                .insert("Authorization".to_string(), format!("Bearer {}", token));
        }
        Ok(request)
    }

    async fn on_error(&self, error: ClientError, request: &OutgoingRequest) -> ClientError {
        if error.status() == Some(401) {
            warn!(endpoint = %request.endpoint, "Received 401, clearing stored credentials");
            self.store.clear();
        }
        error
    }
}

pub const REQUEST_ID_HEADER: &str = "X-Request-Id";

/// Stamps every attempt with a fresh `X-Request-Id` unless the caller set one
#[derive(Debug, Clone, Default)]
pub struct RequestIdInterceptor;

#[async_trait]
impl Interceptor for RequestIdInterceptor {
    fn name(&self) -> &str {
        "request_id"
    }

    async fn on_request(&self, mut request: OutgoingRequest) -> ClientResult<OutgoingRequest> {
        if request.header(REQUEST_ID_HEADER).is_none() {
            request
                .headers
                .insert(REQUEST_ID_HEADER.to_string(), Uuid::new_v4().to_string());
        }
        Ok(request)
    }

    async fn on_error(&self, error: ClientError, request: &OutgoingRequest) -> ClientError {
        if let Some(request_id) = request.header(REQUEST_ID_HEADER) {
            warn!(
                request_id = request_id,
                endpoint = %request.endpoint,
                error_type = error.error_type(),
                "Request attempt failed"
            );
        }
        error
    }
}

/// Logs each attempt and its outcome
#[derive(Debug, Clone)]
pub struct LoggingInterceptor {
    log_headers: bool,
}

impl LoggingInterceptor {
    pub fn new(log_headers: bool) -> Self {
        Self { log_headers }
    }
}

impl Default for LoggingInterceptor {
    fn default() -> Self {
        Self::new(false)
    }
}

#[async_trait]
impl Interceptor for LoggingInterceptor {
    fn name(&self) -> &str {
        "logging"
    }

    async fn on_request(&self, request: OutgoingRequest) -> ClientResult<OutgoingRequest> {
        if self.log_headers {
            // never log credentials
            let headers: Vec<&str> = request
                .headers
                .keys()
                .map(String::as_str)
                .filter(|name| !name.eq_ignore_ascii_case("authorization"))
                .collect();
            debug!(method = %request.method, url = %request.url, attempt = request.attempt, headers = ?headers, "Sending request");
        } else {
            debug!(method = %request.method, url = %request.url, attempt = request.attempt, "Sending request");
        }
        Ok(request)
    }

    async fn on_response(
        &self,
        response: TransportResponse,
        request: &OutgoingRequest,
    ) -> ClientResult<TransportResponse> {
        info!(
            method = %request.method,
            endpoint = %request.endpoint,
            status = response.status,
            bytes = response.body.len(),
            "Request completed"
        );
        Ok(response)
    }

    async fn on_error(&self, error: ClientError, request: &OutgoingRequest) -> ClientError {
        warn!(
            method = %request.method,
            endpoint = %request.endpoint,
            attempt = request.attempt,
            error = %error,
            "Request failed"
        );
        error
    }
}
