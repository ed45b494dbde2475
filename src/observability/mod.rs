// Logging configuration
pub mod config;

// Per-endpoint request metrics
pub mod metrics;

// Structured logging setup
pub mod logging;

pub use config::{LogConfig, LogFormat};
pub use logging::init_logging;
pub use metrics::{EndpointMetrics, PerformanceMonitor};
