//! # Traffic Module
//!
//! Controls how exchanges are spread over time:
//! - `retry`: exponential backoff with jitter and pluggable retry conditions
//! - `batch`: unbounded and windowed execution of request groups

pub mod batch;
pub mod retry;

pub use batch::{run_all, run_windowed, BatchRequest};
pub use retry::{RetryConfig, RetryContext, RetryDecision, RetryPolicy};
