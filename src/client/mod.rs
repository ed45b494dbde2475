//! # Client
//!
//! `Client` is the facade applications use; `RequestExecutor` holds the
//! per-request orchestration behind it.

pub mod api;
pub mod executor;

pub use api::{CacheHandle, Client, PerformanceHandle};
pub use executor::RequestExecutor;
