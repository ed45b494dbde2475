//! # Batch Coordinator
//!
//! Runs groups of logical requests either all at once or in sequential
//! windows of bounded size. Results always come back in input order, and a
//! failure in one slot never affects another.

use futures::future::join_all;
use std::future::Future;
use tracing::debug;

use crate::core::config::RequestConfig;
use crate::core::types::RequestOptions;

/// One entry of a batch
#[derive(Debug, Clone, Default)]
pub struct BatchRequest {
    pub endpoint: String,
    pub options: RequestOptions,
    pub config: RequestConfig,
}

impl BatchRequest {
    /// A plain GET with default configuration
    pub fn get<S: Into<String>>(endpoint: S) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Default::default()
        }
    }

    pub fn new<S: Into<String>>(endpoint: S, options: RequestOptions, config: RequestConfig) -> Self {
        Self {
            endpoint: endpoint.into(),
            options,
            config,
        }
    }
}

/// Start every item at once and wait for all of them
pub async fn run_all<I, F, Fut>(items: Vec<I>, run: F) -> Vec<Fut::Output>
where
    F: FnMut(I) -> Fut,
    Fut: Future,
{
    join_all(items.into_iter().map(run)).await
}

/// Run items in consecutive windows of at most `limit`; a window starts only
/// after the previous one has fully settled. A `limit` of 0 behaves as 1.
pub async fn run_windowed<I, F, Fut>(items: Vec<I>, limit: usize, mut run: F) -> Vec<Fut::Output>
where
    F: FnMut(I) -> Fut,
    Fut: Future,
{
    let limit = limit.max(1);
    let mut results = Vec::with_capacity(items.len());
    let mut remaining = items.into_iter();

    loop {
        let window: Vec<Fut> = remaining.by_ref().take(limit).map(&mut run).collect();
        if window.is_empty() {
            break;
        }
        debug!(size = window.len(), completed = results.len(), "Starting batch window");
        results.extend(join_all(window).await);
    }

    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_run_all_preserves_order() {
        let results = run_all(vec![30u64, 10, 20], |ms| async move {
            tokio::time::sleep(Duration::from_millis(ms)).await;
            ms
        })
        .await;
        assert_eq!(results, vec![30, 10, 20]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_windows_never_overlap() {
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let started = Arc::new(Mutex::new(Vec::new()));

        let results = run_windowed(vec!["A", "B", "C", "D", "E"], 2, |name| {
            let active = active.clone();
            let peak = peak.clone();
            let started = started.clone();
            async move {
                started.lock().push((name, tokio::time::Instant::now()));
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                // later items finish sooner, order must still hold
                let delay = if name == "A" { 50 } else { 10 };
                tokio::time::sleep(Duration::from_millis(delay)).await;
                active.fetch_sub(1, Ordering::SeqCst);
                if name == "C" {
                    Err(format!("{} failed", name))
                } else {
                    Ok(name.to_lowercase())
                }
            }
        })
        .await;

        assert_eq!(peak.load(Ordering::SeqCst), 2);
        assert_eq!(results[0], Ok("a".to_string()));
        assert_eq!(results[1], Ok("b".to_string()));
        assert_eq!(results[2], Err("C failed".to_string()));
        assert_eq!(results[3], Ok("d".to_string()));
        assert_eq!(results[4], Ok("e".to_string()));

        let started = started.lock();
        let names: Vec<&str> = started.iter().map(|(name, _)| *name).collect();
        assert_eq!(names, vec!["A", "B", "C", "D", "E"]);
        // C waits for the slow A of the first window
        assert!(started[2].1 - started[0].1 >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_zero_limit_runs_one_at_a_time() {
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let results = run_windowed(vec![1, 2, 3], 0, |n| {
            let active = active.clone();
            let peak = peak.clone();
            async move {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::task::yield_now().await;
                active.fetch_sub(1, Ordering::SeqCst);
                n * 10
            }
        })
        .await;

        assert_eq!(results, vec![10, 20, 30]);
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_empty_input() {
        let results: Vec<u32> = run_windowed(Vec::<u32>::new(), 3, |n| async move { n }).await;
        assert!(results.is_empty());
    }
}
