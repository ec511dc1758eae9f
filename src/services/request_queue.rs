//! Sequential, rate-limited request queue.
//!
//! Any number of callers may enqueue operations concurrently. A single drain
//! task runs them one at a time in enqueue order, keeping at least
//! `rate_limit_delay` between one operation finishing and the next starting.
//! A failing, panicking or timed-out operation only affects its own caller.

use std::collections::VecDeque;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use std::time::Duration;

use anyhow::{anyhow, Result};
use colored::Colorize;
use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::common::logger::Logger;

/// How a dispatched operation ended, as seen by the drain loop.
enum DispatchOutcome {
    Succeeded,
    Failed(String),
    TimedOut(Duration),
}

struct QueuedRequest {
    id: u64,
    label: &'static str,
    job: BoxFuture<'static, DispatchOutcome>,
}

struct QueueState {
    pending: VecDeque<QueuedRequest>,
    draining: bool,
    last_completion: Option<Instant>,
}

#[derive(Default)]
struct Counters {
    enqueued: AtomicU64,
    dispatched: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    timed_out: AtomicU64,
    drain_runs: AtomicU64,
    active_drains: AtomicUsize,
    peak_concurrent_drains: AtomicUsize,
}

/// Point-in-time copy of the queue counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub enqueued: u64,
    pub dispatched: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub timed_out: u64,
    pub drain_runs: u64,
    pub peak_concurrent_drains: usize,
}

struct Inner {
    state: Mutex<QueueState>,
    delay: Duration,
    dispatch_timeout: Option<Duration>,
    next_id: AtomicU64,
    counters: Counters,
    logger: Logger,
}

/// Cloneable handle; clones share the same queue and drain loop.
#[derive(Clone)]
pub struct RequestQueue {
    inner: Arc<Inner>,
}

/// Future returned by [`RequestQueue::enqueue`]. Resolves once the operation has run.
pub struct QueuedResponse<T> {
    rx: oneshot::Receiver<Result<T>>,
}

impl<T> Future for QueuedResponse<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_)) => Poll::Ready(Err(anyhow!(
                "queued request was dropped before it completed"
            ))),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl RequestQueue {
    pub fn new(delay: Duration, dispatch_timeout: Option<Duration>) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(QueueState {
                    pending: VecDeque::new(),
                    draining: false,
                    last_completion: None,
                }),
                delay,
                dispatch_timeout,
                next_id: AtomicU64::new(1),
                counters: Counters::default(),
                logger: Logger::new("[QUEUE] => ".blue().to_string()),
            }),
        }
    }

    pub fn delay(&self) -> Duration {
        self.inner.delay
    }

    /// Number of requests waiting to be dispatched.
    pub fn pending(&self) -> usize {
        self.inner.lock_state().pending.len()
    }

    pub(crate) fn is_draining(&self) -> bool {
        self.inner.lock_state().draining
    }

    pub fn stats(&self) -> QueueStats {
        let c = &self.inner.counters;
        QueueStats {
            enqueued: c.enqueued.load(Ordering::Acquire),
            dispatched: c.dispatched.load(Ordering::Acquire),
            succeeded: c.succeeded.load(Ordering::Acquire),
            failed: c.failed.load(Ordering::Acquire),
            timed_out: c.timed_out.load(Ordering::Acquire),
            drain_runs: c.drain_runs.load(Ordering::Acquire),
            peak_concurrent_drains: c.peak_concurrent_drains.load(Ordering::Acquire),
        }
    }

    /// Append `operation` to the queue. Never fails; the outcome of the
    /// operation is delivered through the returned future.
    ///
    /// The operation is not invoked until it reaches the head of the queue.
    /// Must be called from within a tokio runtime.
    pub fn enqueue<F, Fut, T>(&self, operation: F) -> QueuedResponse<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        self.enqueue_labeled("request", operation)
    }

    /// Same as [`enqueue`](Self::enqueue), with a label used in failure logs.
    pub fn enqueue_labeled<F, Fut, T>(&self, label: &'static str, operation: F) -> QueuedResponse<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let dispatch_timeout = self.inner.dispatch_timeout;

        let job = async move {
            // Panics inside the operation (including while building its future)
            // are turned into an error for this caller only.
            let guarded = AssertUnwindSafe(async move { operation().await }).catch_unwind();
            let settled = match dispatch_timeout {
                Some(limit) => match tokio::time::timeout(limit, guarded).await {
                    Ok(settled) => Some(settled),
                    Err(_) => None,
                },
                None => Some(guarded.await),
            };

            let (result, outcome) = match settled {
                Some(Ok(Ok(value))) => (Ok(value), DispatchOutcome::Succeeded),
                Some(Ok(Err(err))) => {
                    let message = format!("{:#}", err);
                    (Err(err), DispatchOutcome::Failed(message))
                }
                Some(Err(panic)) => {
                    let message = format!("operation panicked: {}", panic_message(&*panic));
                    (Err(anyhow!(message.clone())), DispatchOutcome::Failed(message))
                }
                None => {
                    let limit = dispatch_timeout.unwrap_or_default();
                    (
                        Err(anyhow!("operation timed out after {}ms", limit.as_millis())),
                        DispatchOutcome::TimedOut(limit),
                    )
                }
            };
            // Caller may have stopped waiting; the result is simply discarded.
            let _ = tx.send(result);
            outcome
        }
        .boxed();

        let request = QueuedRequest {
            id: self.inner.next_id.fetch_add(1, Ordering::AcqRel),
            label,
            job,
        };

        let should_spawn = {
            let mut state = self.inner.lock_state();
            state.pending.push_back(request);
            if state.draining {
                false
            } else {
                state.draining = true;
                true
            }
        };
        self.inner.counters.enqueued.fetch_add(1, Ordering::AcqRel);

        if should_spawn {
            let inner = self.inner.clone();
            tokio::spawn(async move { inner.drain().await });
        }

        QueuedResponse { rx }
    }
}

impl Inner {
    fn lock_state(&self) -> MutexGuard<'_, QueueState> {
        // The lock is never held across user code, so a poisoned guard is still consistent.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn drain(self: Arc<Self>) {
        let active = self.counters.active_drains.fetch_add(1, Ordering::AcqRel) + 1;
        self.counters
            .peak_concurrent_drains
            .fetch_max(active, Ordering::AcqRel);
        self.counters.drain_runs.fetch_add(1, Ordering::AcqRel);

        loop {
            let (request, not_before) = {
                let mut state = self.lock_state();
                match state.pending.pop_front() {
                    Some(request) => (request, state.last_completion.map(|t| t + self.delay)),
                    None => {
                        // Cleared under the same lock `enqueue` uses, so a concurrent
                        // push either lands before this pop or spawns a fresh loop.
                        self.counters.active_drains.fetch_sub(1, Ordering::AcqRel);
                        state.draining = false;
                        return;
                    }
                }
            };

            if let Some(not_before) = not_before {
                if Instant::now() < not_before {
                    tokio::time::sleep_until(not_before).await;
                }
            }

            self.counters.dispatched.fetch_add(1, Ordering::AcqRel);
            self.logger
                .debug(format!("Dispatching {} #{}", request.label, request.id));
            let outcome = request.job.await;

            self.lock_state().last_completion = Some(Instant::now());

            match outcome {
                DispatchOutcome::Succeeded => {
                    self.counters.succeeded.fetch_add(1, Ordering::AcqRel);
                }
                DispatchOutcome::Failed(message) => {
                    self.counters.failed.fetch_add(1, Ordering::AcqRel);
                    self.logger.error(format!(
                        "Queued {} #{} failed: {}",
                        request.label, request.id, message
                    ));
                }
                DispatchOutcome::TimedOut(limit) => {
                    self.counters.timed_out.fetch_add(1, Ordering::AcqRel);
                    self.logger.warn(format!(
                        "Queued {} #{} timed out after {}ms, moving on",
                        request.label,
                        request.id,
                        limit.as_millis()
                    ));
                }
            }
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
