//! # Core Module
//!
//! Building blocks shared by every other module: the error type, client and
//! per-request configuration, and the request/response types that flow
//! through interceptors and transports.

pub mod config;
pub mod error;
pub mod types;
