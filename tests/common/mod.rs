//! Shared fixtures for the integration tests: a scripted in-memory transport
//! and client builders.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use resilient_client::{
    Client, ClientConfig, ClientError, ClientResult, OutgoingRequest, RetryConfig, Transport,
    TransportResponse,
};

/// What the scripted transport does for one exchange
#[derive(Debug, Clone)]
pub enum Reply {
    Json(u16, Value),
    Status(u16),
    Fail(ClientError),
    /// Never answers; only a timeout or cancellation ends the exchange
    Hang,
}

/// In-memory transport answering from per-endpoint scripts
///
/// Queued replies are consumed first, then the endpoint's default reply is
/// repeated. Unknown endpoints answer 404.
#[derive(Default)]
pub struct ScriptedTransport {
    queued: Mutex<HashMap<String, VecDeque<Reply>>>,
    defaults: Mutex<HashMap<String, Reply>>,
    delays: Mutex<HashMap<String, Duration>>,
    requests: Mutex<Vec<OutgoingRequest>>,
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn respond(&self, endpoint: &str, reply: Reply) {
        self.defaults.lock().insert(endpoint.to_string(), reply);
    }

    pub fn respond_sequence(&self, endpoint: &str, replies: Vec<Reply>) {
        self.queued
            .lock()
            .entry(endpoint.to_string())
            .or_default()
            .extend(replies);
    }

    pub fn delay(&self, endpoint: &str, delay: Duration) {
        self.delays.lock().insert(endpoint.to_string(), delay);
    }

    /// Exchanges started for `endpoint`
    pub fn calls(&self, endpoint: &str) -> usize {
        self.requests
            .lock()
            .iter()
            .filter(|request| request.endpoint == endpoint)
            .count()
    }

    pub fn requests(&self) -> Vec<OutgoingRequest> {
        self.requests.lock().clone()
    }

    /// Highest number of exchanges that were in flight at the same time
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn next_reply(&self, endpoint: &str) -> Reply {
        if let Some(reply) = self
            .queued
            .lock()
            .get_mut(endpoint)
            .and_then(VecDeque::pop_front)
        {
            return reply;
        }
        self.defaults
            .lock()
            .get(endpoint)
            .cloned()
            .unwrap_or(Reply::Status(404))
    }
}

struct ActiveGuard<'a>(&'a AtomicUsize);

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn call(&self, request: OutgoingRequest) -> ClientResult<TransportResponse> {
        let endpoint = request.endpoint.clone();
        self.requests.lock().push(request);

        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        let _active = ActiveGuard(&self.active);

        let delay = self.delays.lock().get(&endpoint).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        match self.next_reply(&endpoint) {
            Reply::Json(status, body) => Ok(TransportResponse::json(status, &body)),
            Reply::Status(status) => Ok(TransportResponse::new(status, "")),
            Reply::Fail(error) => Err(error),
            Reply::Hang => std::future::pending().await,
        }
    }
}

/// Config with fast, deterministic retries
pub fn test_config() -> ClientConfig {
    ClientConfig {
        retry: RetryConfig {
            max_retries: 3,
            retry_delay: Duration::from_millis(10),
            max_delay: Duration::from_secs(1),
            jitter: false,
        },
        ..Default::default()
    }
}

pub fn client_with(config: ClientConfig) -> (Client, Arc<ScriptedTransport>) {
    let transport = ScriptedTransport::new();
    let client = Client::new(config, transport.clone()).expect("valid test config");
    (client, transport)
}

pub fn client() -> (Client, Arc<ScriptedTransport>) {
    client_with(test_config())
}
