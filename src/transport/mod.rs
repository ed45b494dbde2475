//! # Transport Abstraction
//!
//! The single capability the client consumes: perform one HTTP exchange. A
//! response with any status is a successful exchange; status handling is the
//! executor's job. `Err` means no response was received.

pub mod http;

use async_trait::async_trait;

use crate::core::error::ClientResult;
use crate::core::types::{OutgoingRequest, TransportResponse};

pub use http::ReqwestTransport;

/// Performs one HTTP exchange
///
/// Implementations must be cancel-safe: the executor drops the returned
/// future when a timeout or cancellation fires, and dropping it must abort
/// the underlying call.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn call(&self, request: OutgoingRequest) -> ClientResult<TransportResponse>;
}
