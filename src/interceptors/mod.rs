//! # Interceptors
//!
//! Hooks that observe or transform a request, response or error around each
//! transport attempt.

pub mod builtin;
pub mod pipeline;

pub use builtin::{BearerAuthInterceptor, LoggingInterceptor, RequestIdInterceptor, TokenStore};
pub use pipeline::{HookInterceptor, Interceptor, InterceptorChain, InterceptorId, InterceptorPipeline};
