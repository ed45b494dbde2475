//! # Retry Policy
//!
//! Decides whether a failed exchange is attempted again and how long to wait
//! first. Backoff is exponential (`retry_delay * 2^attempt`), capped at
//! `max_delay`, with up to 25% random jitter added so that clients failing
//! together do not retry in lockstep.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::core::config::{RetryCondition, RetryOptions};
use crate::core::error::ClientError;

/// Client-wide retry defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the first attempt; `max_retries + 1` exchanges at most
    pub max_retries: u32,

    /// Base delay before the first retry
    #[serde(with = "humantime_serde")]
    pub retry_delay: Duration,

    /// Upper bound for a single backoff delay (before jitter)
    #[serde(with = "humantime_serde")]
    pub max_delay: Duration,

    /// Add bounded random jitter to each delay
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay: Duration::from_millis(1000),
            max_delay: Duration::from_secs(30),
            jitter: true,
        }
    }
}

/// Retry state of one logical request
#[derive(Debug, Clone)]
pub struct RetryContext {
    /// Retries already performed (0 while the first attempt is in flight)
    pub attempt: u32,
    pub max_retries: u32,
    pub base_delay: Duration,
    pub last_error: Option<ClientError>,
}

impl RetryContext {
    pub fn new(policy: &RetryPolicy) -> Self {
        Self {
            attempt: 0,
            max_retries: policy.max_retries,
            base_delay: policy.base_delay,
            last_error: None,
        }
    }

    /// Exchanges issued so far, counting the one in flight
    pub fn exchanges(&self) -> u32 {
        self.attempt + 1
    }
}

/// Outcome of consulting the policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry { delay: Duration },
    GiveUp,
}

/// Retry policy resolved for one request
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter: bool,
    condition: Option<RetryCondition>,
}

impl RetryPolicy {
    /// Merge per-request overrides over the client defaults
    pub fn resolve(config: &RetryConfig, options: &RetryOptions) -> Self {
        Self {
            max_retries: options.max_retries.unwrap_or(config.max_retries),
            base_delay: options.retry_delay.unwrap_or(config.retry_delay),
            max_delay: config.max_delay.max(options.retry_delay.unwrap_or_default()),
            jitter: config.jitter,
            condition: options.retry_condition.clone(),
        }
    }

    /// Policy that never retries
    pub fn none() -> Self {
        Self::resolve(
            &RetryConfig {
                max_retries: 0,
                ..Default::default()
            },
            &RetryOptions::default(),
        )
    }

    /// Whether `error` is worth another attempt, ignoring the budget
    pub fn is_retryable(&self, error: &ClientError) -> bool {
        // cancellation is never overridable by a custom predicate
        if matches!(error, ClientError::Cancelled) {
            return false;
        }
        match &self.condition {
            Some(condition) => condition.should_retry(error),
            None => error.is_retryable(),
        }
    }

    pub fn decide(&self, error: &ClientError, context: &RetryContext) -> RetryDecision {
        if context.attempt >= self.max_retries || !self.is_retryable(error) {
            return RetryDecision::GiveUp;
        }
        RetryDecision::Retry {
            delay: self.delay_for_attempt(context.attempt),
        }
    }

    /// Backoff before retry number `attempt + 1`
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.backoff(attempt);
        if !self.jitter || base.is_zero() {
            return base;
        }
        let bound = base.as_millis() as u64 / 4;
        base + Duration::from_millis(fastrand::u64(0..=bound))
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}
