//! Single-flight request queue
//!
//! Every call to the remote API goes through `RequestQueue::enqueue`. A single
//! worker task runs queued operations one at a time in submission order,
//! waiting the inter-request delay before each one. A failing (or panicking)
//! operation only fails its own caller; the worker moves on to the next.

use crate::error::ProviderError;
use futures::future::{BoxFuture, FutureExt};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::sleep;

const UNLABELED: &str = "Unknown request";

/// How a queued operation ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationOutcome {
    /// Ran to completion and the result was handed back
    Completed,
    /// Skipped or cut short because nobody was waiting for the result anymore
    Abandoned,
}

/// A deferred unit of work waiting for its turn on the queue
pub struct QueuedOperation {
    /// Assigned at enqueue time; used for log labels only
    pub seq: u64,
    pub description: String,
    job: BoxFuture<'static, OperationOutcome>,
}

impl std::fmt::Debug for QueuedOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueuedOperation")
            .field("seq", &self.seq)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

/// Serializes all outbound API calls onto one worker
///
/// Must be created inside a tokio runtime; the worker stops once the queue
/// is dropped and the remaining operations have drained.
pub struct RequestQueue {
    tx: mpsc::UnboundedSender<QueuedOperation>,
    delay: Duration,
    next_seq: AtomicU64,
    pending: Arc<AtomicUsize>,
    completed: Arc<AtomicU64>,
}

impl RequestQueue {
    /// Creates the queue and spawns its worker
    pub fn new(delay: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let pending = Arc::new(AtomicUsize::new(0));
        let completed = Arc::new(AtomicU64::new(0));

        tokio::spawn(Self::run_worker(rx, pending.clone(), completed.clone()));

        Self {
            tx,
            delay,
            next_seq: AtomicU64::new(0),
            pending,
            completed,
        }
    }

    /// Appends `operation` to the queue.
    ///
    /// The operation is queued when this is called, not when the returned
    /// future is first polled. Dropping the returned future skips the
    /// operation if it has not started, and drops it mid-flight otherwise.
    pub fn enqueue<T, F, Fut>(
        &self,
        operation: F,
        description: Option<&str>,
    ) -> impl Future<Output = Result<T, ProviderError>> + Send + 'static
    where
        T: Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, ProviderError>> + Send + 'static,
    {
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let description = description.unwrap_or(UNLABELED).to_string();
        let (result_tx, result_rx) = oneshot::channel();

        tracing::debug!(request_id = seq, description = %description, "Queuing");

        let job = Self::make_job(seq, description.clone(), self.delay, operation, result_tx);
        self.pending.fetch_add(1, Ordering::SeqCst);
        let queued = self
            .tx
            .send(QueuedOperation {
                seq,
                description,
                job,
            })
            .is_ok();
        if !queued {
            self.pending.fetch_sub(1, Ordering::SeqCst);
        }

        async move {
            if !queued {
                return Err(ProviderError::internal("request queue worker has stopped"));
            }
            result_rx.await.unwrap_or_else(|_| {
                Err(ProviderError::internal(format!(
                    "request {} was dropped before completing",
                    seq
                )))
            })
        }
    }

    /// Operations queued or running
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Operations the worker has finished (including skipped ones)
    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::SeqCst)
    }

    /// Delay applied before each operation
    pub fn delay(&self) -> Duration {
        self.delay
    }

    fn make_job<T, F, Fut>(
        seq: u64,
        description: String,
        delay: Duration,
        operation: F,
        result_tx: oneshot::Sender<Result<T, ProviderError>>,
    ) -> BoxFuture<'static, OperationOutcome>
    where
        T: Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, ProviderError>> + Send + 'static,
    {
        async move {
            let mut result_tx = result_tx;
            if result_tx.is_closed() {
                return OperationOutcome::Abandoned;
            }

            tracing::debug!(request_id = seq, description = %description, "Starting");
            tokio::select! {
                _ = sleep(delay) => {}
                _ = result_tx.closed() => return OperationOutcome::Abandoned,
            }

            // the operation is dropped (retries and backoff included) once the
            // caller stops waiting for it
            let operation = AssertUnwindSafe(async move { operation().await }).catch_unwind();
            let outcome = tokio::select! {
                outcome = operation => Some(outcome),
                _ = result_tx.closed() => None,
            };

            let result = match outcome {
                Some(Ok(result)) => result,
                Some(Err(_)) => {
                    tracing::error!(
                        request_id = seq,
                        description = %description,
                        "Operation panicked"
                    );
                    Err(ProviderError::internal(format!(
                        "request {} panicked: {}",
                        seq, description
                    )))
                }
                None => return OperationOutcome::Abandoned,
            };

            if result_tx.send(result).is_err() {
                tracing::debug!(request_id = seq, "Caller went away before the result arrived");
            }
            OperationOutcome::Completed
        }
        .boxed()
    }

    async fn run_worker(
        mut rx: mpsc::UnboundedReceiver<QueuedOperation>,
        pending: Arc<AtomicUsize>,
        completed: Arc<AtomicU64>,
    ) {
        while let Some(op) = rx.recv().await {
            let QueuedOperation {
                seq,
                description,
                job,
            } = op;

            match job.await {
                OperationOutcome::Completed => {
                    tracing::debug!(request_id = seq, description = %description, "Completed");
                }
                OperationOutcome::Abandoned => {
                    tracing::debug!(
                        request_id = seq,
                        description = %description,
                        "Skipped abandoned request"
                    );
                }
            }

            pending.fetch_sub(1, Ordering::SeqCst);
            completed.fetch_add(1, Ordering::SeqCst);
        }

        tracing::debug!("Request queue worker stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn test_operations_run_in_order_without_overlap() {
        let queue = RequestQueue::new(Duration::from_secs(1));
        let active = Arc::new(AtomicUsize::new(0));
        let log: Arc<Mutex<Vec<(usize, Instant, Instant)>>> = Arc::new(Mutex::new(Vec::new()));

        let mut calls = Vec::new();
        for i in 0..5usize {
            let active = active.clone();
            let log = log.clone();
            calls.push(queue.enqueue(
                move || async move {
                    assert_eq!(active.fetch_add(1, Ordering::SeqCst), 0, "overlapping operations");
                    let started = Instant::now();
                    // later operations finish faster, so reordering would show
                    sleep(Duration::from_millis(500 - 100 * i as u64)).await;
                    active.fetch_sub(1, Ordering::SeqCst);
                    log.lock().unwrap().push((i, started, Instant::now()));
                    Ok(i)
                },
                Some("ordered"),
            ));
        }

        let results = futures::future::join_all(calls).await;
        let results: Vec<usize> = results.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(results, vec![0, 1, 2, 3, 4]);

        let log = log.lock().unwrap();
        let order: Vec<usize> = log.iter().map(|(i, _, _)| *i).collect();
        assert_eq!(order, vec![0, 1, 2, 3, 4]);
        for pair in log.windows(2) {
            let (_, _, prev_end) = pair[0];
            let (_, next_start, _) = pair[1];
            assert!(next_start >= prev_end + Duration::from_secs(1));
        }
        assert_eq!(queue.completed(), 5);
        assert_eq!(queue.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_does_not_break_the_chain() {
        let queue = RequestQueue::new(Duration::from_secs(1));

        let first = queue.enqueue(
            || async { Err::<u32, _>(ProviderError::HttpStatus { status: 503 }) },
            Some("fails"),
        );
        let second = queue.enqueue(|| async { Ok(7u32) }, Some("succeeds"));

        assert!(matches!(
            first.await,
            Err(ProviderError::HttpStatus { status: 503 })
        ));
        assert_eq!(second.await.unwrap(), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_operation_is_contained() {
        let queue = RequestQueue::new(Duration::from_secs(1));

        let boom = queue.enqueue(
            || async {
                if true {
                    panic!("boom");
                }
                Ok(0u32)
            },
            None,
        );
        let after = queue.enqueue(|| async { Ok(1u32) }, None);

        assert!(matches!(boom.await, Err(ProviderError::Internal(_))));
        assert_eq!(after.await.unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_caller_is_skipped() {
        let queue = RequestQueue::new(Duration::from_secs(1));
        let ran = Arc::new(AtomicUsize::new(0));

        let blocker = queue.enqueue(
            || async {
                sleep(Duration::from_secs(5)).await;
                Ok(())
            },
            Some("blocker"),
        );
        let ran_clone = ran.clone();
        let abandoned = queue.enqueue(
            move || async move {
                ran_clone.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
            Some("abandoned"),
        );
        drop(abandoned);

        blocker.await.unwrap();
        queue.enqueue(|| async { Ok(()) }, Some("tail")).await.unwrap();

        assert_eq!(ran.load(Ordering::SeqCst), 0);
        assert_eq!(queue.completed(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_applies_before_every_request() {
        let queue = RequestQueue::new(Duration::from_secs(1));
        let start = Instant::now();

        queue.enqueue(|| async { Ok(()) }, None).await.unwrap();
        queue.enqueue(|| async { Ok(()) }, None).await.unwrap();

        assert!(start.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_caller_dropped_during_delay_never_runs() {
        let queue = RequestQueue::new(Duration::from_secs(1));
        let ran = Arc::new(AtomicUsize::new(0));

        let ran_clone = ran.clone();
        let call = queue.enqueue(
            move || async move {
                ran_clone.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
            Some("dropped while waiting"),
        );
        sleep(Duration::from_millis(500)).await;
        drop(call);
        sleep(Duration::from_secs(5)).await;

        assert_eq!(ran.load(Ordering::SeqCst), 0);
        assert_eq!(queue.completed(), 1);
        assert_eq!(queue.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_caller_dropped_mid_operation_frees_the_worker() {
        let queue = RequestQueue::new(Duration::from_secs(1));
        let finished = Arc::new(AtomicUsize::new(0));

        let finished_clone = finished.clone();
        let slow = queue.enqueue(
            move || async move {
                sleep(Duration::from_secs(120)).await;
                finished_clone.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
            Some("slow"),
        );
        let start = Instant::now();
        sleep(Duration::from_secs(3)).await;
        drop(slow);

        queue.enqueue(|| async { Ok(()) }, Some("next")).await.unwrap();

        assert!(start.elapsed() < Duration::from_secs(10));
        assert_eq!(finished.load(Ordering::SeqCst), 0);
    }
}
