//! # Request Metrics
//!
//! Per-endpoint latency and error counters. Samples are folded into running
//! sums as they arrive, so memory stays bounded by the number of distinct
//! endpoints no matter how many requests are made.
//!
//! Every sample is also forwarded to the `metrics` facade, so an application
//! that installs a recorder (e.g. a Prometheus exporter) sees the same data.

use dashmap::DashMap;
use metrics::{counter, histogram};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Running aggregate for one endpoint
#[derive(Debug, Clone, Copy, Default)]
struct MetricSample {
    count: u64,
    total_time: Duration,
    error_count: u64,
}

/// Reported view of one endpoint's aggregate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointMetrics {
    pub count: u64,
    #[serde(with = "humantime_serde")]
    pub total_time: Duration,
    #[serde(with = "humantime_serde")]
    pub avg_time: Duration,
    pub errors: u64,
}

impl EndpointMetrics {
    /// Fraction of requests that failed, 0.0 when nothing was recorded
    pub fn error_rate(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.errors as f64 / self.count as f64
        }
    }
}

/// Aggregates request outcomes per endpoint
#[derive(Debug, Default)]
pub struct PerformanceMonitor {
    samples: DashMap<String, MetricSample>,
}

impl PerformanceMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one terminal request outcome into the endpoint's aggregate
    pub fn record_request(&self, endpoint: &str, duration: Duration, success: bool) {
        {
            let mut sample = self.samples.entry(endpoint.to_string()).or_default();
            sample.count += 1;
            sample.total_time += duration;
            if !success {
                sample.error_count += 1;
            }
        }

        let outcome = if success { "success" } else { "error" };
        counter!("client_requests_total", "endpoint" => endpoint.to_string(), "outcome" => outcome)
            .increment(1);
        if !success {
            counter!("client_request_errors_total", "endpoint" => endpoint.to_string()).increment(1);
        }
        histogram!("client_request_duration_seconds", "endpoint" => endpoint.to_string())
            .record(duration.as_secs_f64());
    }

    pub fn get_metrics(&self) -> HashMap<String, EndpointMetrics> {
        self.samples
            .iter()
            .map(|entry| {
                let sample = *entry.value();
                let avg_time = if sample.count == 0 {
                    Duration::ZERO
                } else {
                    sample.total_time / u32::try_from(sample.count).unwrap_or(u32::MAX)
                };
                (
                    entry.key().clone(),
                    EndpointMetrics {
                        count: sample.count,
                        total_time: sample.total_time,
                        avg_time,
                        errors: sample.error_count,
                    },
                )
            })
            .collect()
    }

    pub fn endpoint(&self, endpoint: &str) -> Option<EndpointMetrics> {
        self.get_metrics().remove(endpoint)
    }

    pub fn clear_metrics(&self) {
        self.samples.clear();
    }
}
