//! Priority admission queue
//!
//! Calls are ordered by priority (high first) and then by submission order.
//! A single drain task dispatches the head of the queue whenever the rate
//! windows allow it, sleeping for exactly the reported wait otherwise.
//! Throttled calls are retried with exponential backoff.

use super::backoff::BackoffConfig;
use super::window::{RateLimitStatus, RateWindowConfig, RequestHistory, HISTORY_RETENTION};
use crate::error::{GatewayError, Result};
use crate::metrics::METRICS;
use crate::providers::ProviderError;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::{oneshot, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// How often stale history is pruned
const PRUNE_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Dispatch priority
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => Err(format!("unknown priority: {}", other)),
        }
    }
}

/// A submitted call with its result channel, type-erased for the queue
trait Job: Send {
    /// Run the call once; on success the value has been delivered
    fn attempt(&mut self) -> BoxFuture<'_, std::result::Result<(), ProviderError>>;

    /// Deliver a terminal error
    fn reject(self: Box<Self>, error: GatewayError);

    /// The submitter stopped waiting for the result
    fn is_abandoned(&self) -> bool;
}

struct CallJob<F, T> {
    call: F,
    tx: Option<oneshot::Sender<Result<T>>>,
}

impl<F, Fut, T> Job for CallJob<F, T>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = std::result::Result<T, ProviderError>> + Send + 'static,
    T: Send + 'static,
{
    fn attempt(&mut self) -> BoxFuture<'_, std::result::Result<(), ProviderError>> {
        Box::pin(async move {
            let value = (self.call)().await?;
            if let Some(tx) = self.tx.take() {
                let _ = tx.send(Ok(value));
            }
            Ok(())
        })
    }

    fn reject(mut self: Box<Self>, error: GatewayError) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(Err(error));
        }
    }

    fn is_abandoned(&self) -> bool {
        self.tx.as_ref().map_or(true, |tx| tx.is_closed())
    }
}

struct QueuedCall {
    id: Uuid,
    seq: u64,
    submitted_at: Instant,
    estimated_tokens: u64,
    priority: Priority,
    attempts: u32,
    job: Box<dyn Job>,
}

#[derive(Default)]
struct QueueState {
    queue: Vec<QueuedCall>,
    history: RequestHistory,
    consecutive_errors: u32,
    draining: bool,
    closed: bool,
    next_seq: u64,
}

impl QueueState {
    /// Insert keeping priority-descending, submission-ascending order
    fn insert(&mut self, call: QueuedCall) {
        let key = (Reverse(call.priority), call.seq);
        let position = self
            .queue
            .partition_point(|queued| (Reverse(queued.priority), queued.seq) < key);
        self.queue.insert(position, call);
        METRICS.admission_queue_depth.set(self.queue.len() as f64);
    }
}

/// Snapshot of the queue for diagnostics
#[derive(Debug, Clone, Serialize)]
pub struct QueueStats {
    pub queued: usize,
    pub history_len: usize,
    pub consecutive_errors: u32,
    pub draining: bool,
    pub closed: bool,
}

struct Inner {
    rate_limits: RateWindowConfig,
    backoff: BackoffConfig,
    state: Mutex<QueueState>,
    wake: Notify,
}

enum Step {
    Idle,
    Wait(RateLimitStatus),
    Dispatch(QueuedCall),
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sleep for `duration` unless the queue is shut down first
    async fn pause(&self, duration: Duration) {
        tokio::select! {
            _ = tokio::time::sleep(duration) => {}
            _ = self.wake.notified() => {}
        }
    }

    fn next_step(&self) -> Step {
        let mut state = self.lock();
        if state.closed {
            state.draining = false;
            return Step::Idle;
        }

        state.queue.retain(|call| {
            let keep = !call.job.is_abandoned();
            if !keep {
                debug!(call_id = %call.id, "Dropping call abandoned by its submitter");
            }
            keep
        });

        let Some(head) = state.queue.first() else {
            state.draining = false;
            METRICS.admission_queue_depth.set(0.0);
            return Step::Idle;
        };

        let status = state
            .history
            .check(&self.rate_limits, Instant::now(), head.estimated_tokens);
        if !status.can_proceed {
            return Step::Wait(status);
        }

        let call = state.queue.remove(0);
        METRICS.admission_queue_depth.set(state.queue.len() as f64);
        Step::Dispatch(call)
    }

    async fn drain(self: Arc<Self>) {
        loop {
            match self.next_step() {
                Step::Idle => return,
                Step::Wait(status) => {
                    let dimension = status.dimension.map(|d| d.as_str()).unwrap_or("unknown");
                    METRICS.record_rate_limit_wait(dimension);
                    debug!(
                        dimension,
                        wait_ms = status.wait_time.as_millis() as u64,
                        "Queue head rate limited, waiting"
                    );
                    self.pause(status.wait_time).await;
                }
                Step::Dispatch(call) => self.dispatch(call).await,
            }
        }
    }

    async fn dispatch(&self, mut call: QueuedCall) {
        call.attempts += 1;
        debug!(
            call_id = %call.id,
            priority = %call.priority,
            attempt = call.attempts,
            queued_ms = call.submitted_at.elapsed().as_millis() as u64,
            "Dispatching call"
        );

        let started = Instant::now();
        let outcome = AssertUnwindSafe(call.job.attempt()).catch_unwind().await;
        METRICS.call_duration.observe(started.elapsed().as_secs_f64());

        let Ok(result) = outcome else {
            error!(call_id = %call.id, "Provider call panicked");
            METRICS.record_admission(false);
            call.job.reject(GatewayError::Provider(ProviderError::Other(
                "provider call panicked".to_string(),
            )));
            return;
        };

        let err = match result {
            Ok(()) => {
                let mut state = self.lock();
                state.history.record(Instant::now(), call.estimated_tokens);
                state.consecutive_errors = 0;
                METRICS.record_admission(true);
                return;
            }
            Err(err) => err,
        };

        if !err.is_rate_limit() {
            warn!(call_id = %call.id, error = %err, "Provider call failed");
            METRICS.record_admission(false);
            call.job.reject(GatewayError::Provider(err));
            return;
        }

        let consecutive_errors = {
            let mut state = self.lock();
            state.consecutive_errors += 1;
            state.consecutive_errors
        };

        if call.attempts > self.backoff.max_retries {
            warn!(call_id = %call.id, attempts = call.attempts, "Giving up on throttled call");
            METRICS.record_admission(false);
            call.job.reject(GatewayError::RateLimited {
                attempts: call.attempts,
                source: err,
            });
            return;
        }

        let delay = self.backoff.delay_for(consecutive_errors, err.retry_after());
        warn!(
            call_id = %call.id,
            attempt = call.attempts,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "Provider throttled call, retrying after backoff"
        );
        METRICS.retries.inc();
        self.pause(delay).await;

        let mut state = self.lock();
        if state.closed {
            drop(state);
            call.job.reject(GatewayError::QueueShutdown);
        } else {
            state.insert(call);
        }
    }
}

/// Rate-limited priority queue in front of provider calls
pub struct AdmissionQueue {
    inner: Arc<Inner>,
    pruner: Mutex<Option<JoinHandle<()>>>,
}

impl AdmissionQueue {
    /// Create the queue and start history pruning
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(rate_limits: RateWindowConfig, backoff: BackoffConfig) -> Self {
        let inner = Arc::new(Inner {
            rate_limits,
            backoff,
            state: Mutex::new(QueueState::default()),
            wake: Notify::new(),
        });
        let pruner = tokio::spawn(prune_periodically(Arc::downgrade(&inner)));

        Self {
            inner,
            pruner: Mutex::new(Some(pruner)),
        }
    }

    /// Check the rate windows for a call of `estimated_tokens` right now
    pub fn check_rate_limit(&self, estimated_tokens: u64) -> RateLimitStatus {
        self.inner
            .lock()
            .history
            .check(&self.inner.rate_limits, Instant::now(), estimated_tokens)
    }

    /// Enqueue a call and return the channel its result arrives on
    ///
    /// `call` may be invoked more than once when the provider throttles it.
    pub fn submit<F, Fut, T>(
        &self,
        call: F,
        estimated_tokens: u64,
        priority: Priority,
    ) -> oneshot::Receiver<Result<T>>
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = std::result::Result<T, ProviderError>> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let job = Box::new(CallJob { call, tx: Some(tx) });

        let start_drain = {
            let mut state = self.inner.lock();
            if state.closed {
                drop(state);
                job.reject(GatewayError::QueueShutdown);
                return rx;
            }

            let seq = state.next_seq;
            state.next_seq += 1;
            let call = QueuedCall {
                id: Uuid::new_v4(),
                seq,
                submitted_at: Instant::now(),
                estimated_tokens,
                priority,
                attempts: 0,
                job,
            };
            debug!(call_id = %call.id, %priority, estimated_tokens, "Call submitted");
            state.insert(call);

            let idle = !state.draining;
            state.draining = true;
            idle
        };

        if start_drain {
            tokio::spawn(Arc::clone(&self.inner).drain());
        }
        rx
    }

    /// Submit a call and wait for its result
    pub async fn execute_with_rate_limit<F, Fut, T>(
        &self,
        call: F,
        estimated_tokens: u64,
        priority: Priority,
    ) -> Result<T>
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = std::result::Result<T, ProviderError>> + Send + 'static,
        T: Send + 'static,
    {
        self.submit(call, estimated_tokens, priority)
            .await
            .map_err(|_| GatewayError::QueueShutdown)?
    }

    pub fn stats(&self) -> QueueStats {
        let state = self.inner.lock();
        QueueStats {
            queued: state.queue.len(),
            history_len: state.history.len(),
            consecutive_errors: state.consecutive_errors,
            draining: state.draining,
            closed: state.closed,
        }
    }

    /// Reject every queued call and stop background work
    ///
    /// Calls already dispatched run to completion. Later submissions are
    /// rejected immediately.
    pub fn destroy(&self) {
        let pending = {
            let mut state = self.inner.lock();
            state.closed = true;
            std::mem::take(&mut state.queue)
        };
        METRICS.admission_queue_depth.set(0.0);

        let rejected = pending.len();
        for call in pending {
            call.job.reject(GatewayError::QueueShutdown);
        }
        self.inner.wake.notify_one();

        if let Some(handle) = self
            .pruner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }

        info!(rejected, "Admission queue destroyed");
    }
}

impl Drop for AdmissionQueue {
    fn drop(&mut self) {
        if let Some(handle) = self
            .pruner
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }
    }
}

async fn prune_periodically(inner: Weak<Inner>) {
    let mut interval = tokio::time::interval(PRUNE_INTERVAL);
    interval.tick().await;
    loop {
        interval.tick().await;
        let Some(inner) = inner.upgrade() else {
            return;
        };
        let removed = inner.lock().history.prune(Instant::now(), HISTORY_RETENTION);
        if removed > 0 {
            debug!(removed, "Pruned request history");
        }
    }
}
