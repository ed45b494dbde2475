//! # Request Deduplication Module
//!
//! Collapses concurrent identical requests into one shared execution. The
//! first caller for a key spawns the execution; every caller that arrives
//! while it is pending subscribes to the same outcome instead of issuing a
//! second exchange.
//!
//! The pending entry is removed *before* the outcome is published, so a call
//! made after completion always starts a fresh execution.
//!
//! ## Cancellation
//! A waiter whose cancellation token fires detaches with `Cancelled`; a
//! waiter whose future is dropped before the outcome arrives detaches the
//! same way. The shared execution keeps running for the remaining waiters
//! and is only cancelled once the last waiter has detached.

use futures::FutureExt;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::core::error::{ClientError, ClientResult};

type Outcome<T> = Option<ClientResult<T>>;

/// In-flight request tracking
struct InFlightRequest<T> {
    id: u64,
    outcome: watch::Receiver<Outcome<T>>,
    waiters: usize,
    execution: CancellationToken,
}

type InFlightMap<T> = Arc<Mutex<HashMap<String, InFlightRequest<T>>>>;

/// Removes the pending entry when the execution finishes, even by panic or abort
struct PendingGuard<T> {
    in_flight: InFlightMap<T>,
    key: String,
    id: u64,
}

impl<T> Drop for PendingGuard<T> {
    fn drop(&mut self) {
        let mut in_flight = self.in_flight.lock();
        if in_flight.get(&self.key).map(|entry| entry.id) == Some(self.id) {
            in_flight.remove(&self.key);
        }
    }
}

/// Detaches a waiter whose future is dropped while still waiting
struct WaiterGuard<T> {
    in_flight: InFlightMap<T>,
    key: String,
    id: u64,
    armed: bool,
}

impl<T> WaiterGuard<T> {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl<T> Drop for WaiterGuard<T> {
    fn drop(&mut self) {
        if self.armed {
            detach_waiter(&self.in_flight, &self.key, self.id);
        }
    }
}

/// Drop one waiter; the last waiter out cancels the execution
fn detach_waiter<T>(in_flight: &InFlightMap<T>, key: &str, id: u64) {
    let mut in_flight = in_flight.lock();
    let Some(entry) = in_flight.get_mut(key) else {
        return;
    };
    if entry.id != id {
        return;
    }

    entry.waiters = entry.waiters.saturating_sub(1);
    if entry.waiters == 0 {
        entry.execution.cancel();
        in_flight.remove(key);
        debug!(key = key, "Cancelled in-flight request with no remaining waiters");
    }
}

/// Single-flight executor keyed by request identity
pub struct RequestDeduplicator<T> {
    in_flight: InFlightMap<T>,
    next_id: AtomicU64,
    /// Parent of every execution token; cancelling it aborts all executions
    root: CancellationToken,
}

impl<T> RequestDeduplicator<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(root: CancellationToken) -> Self {
        Self {
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(1),
            root,
        }
    }

    /// Run `producer` once per key among concurrent callers and share its outcome
    ///
    /// `producer` receives the execution's cancellation token and is only
    /// invoked by the first caller. Must be called inside a tokio runtime.
    pub async fn dedupe<F, Fut>(
        &self,
        key: &str,
        cancel: &CancellationToken,
        producer: F,
    ) -> ClientResult<T>
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = ClientResult<T>> + Send + 'static,
    {
        let (mut outcome, id, execution) = {
            let mut in_flight = self.in_flight.lock();
            match in_flight.get_mut(key) {
                Some(entry) => {
                    entry.waiters += 1;
                    debug!(key = key, waiters = entry.waiters, "Joined in-flight request");
                    (entry.outcome.clone(), entry.id, None)
                }
                None => {
                    let (sender, receiver) = watch::channel(None);
                    let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                    let execution = self.root.child_token();
                    in_flight.insert(
                        key.to_string(),
                        InFlightRequest {
                            id,
                            outcome: receiver.clone(),
                            waiters: 1,
                            execution: execution.clone(),
                        },
                    );
                    (receiver, id, Some((sender, execution)))
                }
            }
        };

        if let Some((sender, execution)) = execution {
            let guard = PendingGuard {
                in_flight: self.in_flight.clone(),
                key: key.to_string(),
                id,
            };
            tokio::spawn(async move {
                let result = AssertUnwindSafe(async move { producer(execution).await })
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|_| {
                        warn!(key = %guard.key, "Request execution panicked");
                        Err(ClientError::internal("request execution panicked"))
                    });
                drop(guard);
                let _ = sender.send(Some(result));
            });
        }

        let mut waiter = WaiterGuard {
            in_flight: self.in_flight.clone(),
            key: key.to_string(),
            id,
            armed: true,
        };

        tokio::select! {
            biased;
            changed = outcome.wait_for(Option::is_some) => {
                waiter.disarm();
                match changed {
                    Ok(value) => match &*value {
                        Some(result) => result.clone(),
                        None => Err(ClientError::internal("in-flight request resolved without outcome")),
                    },
                    Err(_) => Err(ClientError::internal("in-flight request dropped")),
                }
            }
            _ = cancel.cancelled() => {
                drop(waiter);
                Err(ClientError::Cancelled)
            }
        }
    }

    /// Number of keys with a pending execution
    pub fn pending_count(&self) -> usize {
        self.in_flight.lock().len()
    }

    pub fn is_pending(&self, key: &str) -> bool {
        self.in_flight.lock().contains_key(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn dedup() -> Arc<RequestDeduplicator<u32>> {
        Arc::new(RequestDeduplicator::new(CancellationToken::new()))
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_execution() {
        let dedup = dedup();
        let calls = Arc::new(AtomicUsize::new(0));
        let never = CancellationToken::new();

        let run = |calls: Arc<AtomicUsize>| {
            move |_token: CancellationToken| async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok(42)
            }
        };

        let (a, b, c) = tokio::join!(
            dedup.dedupe("k", &never, run(calls.clone())),
            dedup.dedupe("k", &never, run(calls.clone())),
            dedup.dedupe("k", &never, run(calls.clone())),
        );

        assert_eq!((a.unwrap(), b.unwrap(), c.unwrap()), (42, 42, 42));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(dedup.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_failure_is_shared_and_key_cleared() {
        let dedup = dedup();
        let never = CancellationToken::new();

        let failing = |_token: CancellationToken| async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            Err::<u32, _>(ClientError::http(503, "down"))
        };
        let (a, b) = tokio::join!(
            dedup.dedupe("k", &never, failing),
            dedup.dedupe("k", &never, failing),
        );
        assert_eq!(a.unwrap_err(), ClientError::http(503, "down"));
        assert_eq!(b.unwrap_err(), ClientError::http(503, "down"));
        assert!(!dedup.is_pending("k"));

        // a later call starts a fresh execution
        let fresh = dedup.dedupe("k", &never, |_| async { Ok(1) }).await;
        assert_eq!(fresh.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_distinct_keys_run_separately() {
        let dedup = dedup();
        let calls = Arc::new(AtomicUsize::new(0));
        let never = CancellationToken::new();

        let counted = |calls: Arc<AtomicUsize>, value: u32| {
            move |_token: CancellationToken| async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(value)
            }
        };
        let (a, b) = tokio::join!(
            dedup.dedupe("GET:/a:", &never, counted(calls.clone(), 1)),
            dedup.dedupe("GET:/b:", &never, counted(calls.clone(), 2)),
        );
        assert_eq!((a.unwrap(), b.unwrap()), (1, 2));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_panicking_producer_clears_key() {
        let dedup = dedup();
        let never = CancellationToken::new();

        let result = dedup
            .dedupe("k", &never, |_token| async {
                if true {
                    panic!("boom");
                }
                Ok(0)
            })
            .await;
        assert!(matches!(result, Err(ClientError::Internal { .. })));
        assert!(!dedup.is_pending("k"));
    }

    #[tokio::test]
    async fn test_cancelled_waiter_does_not_cancel_shared_execution() {
        let dedup = dedup();
        let originator = CancellationToken::new();
        let follower = CancellationToken::new();

        let slow = |_token: CancellationToken| async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(7)
        };

        let cancel_originator = async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            originator.cancel();
        };
        let (a, b, _) = tokio::join!(
            dedup.dedupe("k", &originator, slow),
            dedup.dedupe("k", &follower, slow),
            cancel_originator,
        );

        assert_eq!(a.unwrap_err(), ClientError::Cancelled);
        assert_eq!(b.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_last_waiter_cancels_execution() {
        let dedup = dedup();
        let caller = CancellationToken::new();
        let observed = Arc::new(AtomicUsize::new(0));

        let flag = observed.clone();
        let producer = move |token: CancellationToken| async move {
            token.cancelled().await;
            flag.fetch_add(1, Ordering::SeqCst);
            Err::<u32, _>(ClientError::Cancelled)
        };

        let canceller = caller.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            canceller.cancel();
        });

        let result = dedup.dedupe("k", &caller, producer).await;
        assert_eq!(result.unwrap_err(), ClientError::Cancelled);
        assert!(!dedup.is_pending("k"));

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(observed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_dropped_waiter_detaches() {
        let dedup = dedup();
        let never = CancellationToken::new();
        let observed = Arc::new(AtomicUsize::new(0));

        let flag = observed.clone();
        let producer = move |token: CancellationToken| async move {
            token.cancelled().await;
            flag.fetch_add(1, Ordering::SeqCst);
            Err::<u32, _>(ClientError::Cancelled)
        };

        let waited = tokio::time::timeout(
            Duration::from_millis(10),
            dedup.dedupe("k", &never, producer),
        )
        .await;
        assert!(waited.is_err());
        assert!(!dedup.is_pending("k"));

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(observed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_dropped_follower_keeps_shared_execution() {
        let dedup = dedup();
        let never = CancellationToken::new();

        let slow = |_token: CancellationToken| async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(9)
        };

        let (kept, dropped) = tokio::join!(
            dedup.dedupe("k", &never, slow),
            tokio::time::timeout(Duration::from_millis(10), dedup.dedupe("k", &never, slow)),
        );
        assert!(dropped.is_err());
        assert_eq!(kept.unwrap(), 9);
        assert!(!dedup.is_pending("k"));
    }
}
