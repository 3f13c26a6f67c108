//! # Poll Loop
//!
//! A self-scheduling fetch loop for sources that can only be polled. One loop
//! drives one live-state service: it awaits the external fetch, hands the
//! result to the service's [`PollHandler`], then sleeps before the next cycle.
//!
//! ## Scheduling
//! - After a success the consecutive error count is reset and the next fetch
//!   runs after the base interval.
//! - After a failure the count is incremented. Once it reaches the error
//!   threshold the delay becomes `max(base + errors * base / 4, floor)`. This
//!   is linear, not exponential, and the floor dominates for typical settings.
//!   Below the threshold the base interval is used unchanged.
//!
//! ## Guarantees
//! - At most one fetch is in flight per loop; the loop is a single task.
//! - [`PollLoop::poll_now`] skips the pending delay and fetches right away.
//! - Once the loop is cancelled, a fetch that is still in flight is abandoned
//!   and its result never reaches the handler.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tokio_util::sync::CancellationToken;

use crate::error::FetchError;
use crate::utils::now_millis;

/// # Poll Config
///
/// Timing parameters of a [`PollLoop`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    /// Delay between cycles while the source is healthy.
    pub base_interval: Duration,
    /// Lower bound on the delay once the error threshold is reached.
    pub floor_delay: Duration,
    /// Consecutive failures needed before the delay is stretched.
    pub error_threshold: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            base_interval: Duration::from_millis(2000),
            floor_delay: Duration::from_millis(60_000),
            error_threshold: 3,
        }
    }
}

impl PollConfig {
    /// Delay to wait after a cycle that left `consecutive_errors` failures in a
    /// row (`0` after a success).
    pub fn backoff_delay(&self, consecutive_errors: u32) -> Duration {
        if consecutive_errors == 0 || consecutive_errors < self.error_threshold {
            return self.base_interval;
        }
        let stretched = self
            .base_interval
            .checked_mul(consecutive_errors)
            .and_then(|scaled| self.base_interval.checked_add(scaled / 4))
            .unwrap_or(Duration::MAX);
        stretched.max(self.floor_delay)
    }
}

/// # Poll State
///
/// The loop's only mutable bookkeeping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollState {
    /// Failures since the last success.
    pub consecutive_errors: u32,
}

impl PollState {
    /// Resets the error count. Returns the count it had before the reset.
    pub fn record_success(&mut self) -> u32 {
        std::mem::take(&mut self.consecutive_errors)
    }

    /// Increments the error count and returns the new value.
    pub fn record_failure(&mut self) -> u32 {
        self.consecutive_errors = self.consecutive_errors.saturating_add(1);
        self.consecutive_errors
    }
}

/// Where a loop currently is in its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollPhase {
    /// Not started yet, or stopped.
    Idle,
    /// Awaiting the external fetch.
    Fetching,
    /// Sleeping until the next fetch.
    Scheduled,
}

impl PollPhase {
    /// Lower-case name, for status reports.
    pub fn as_str(self) -> &'static str {
        match self {
            PollPhase::Idle => "idle",
            PollPhase::Fetching => "fetching",
            PollPhase::Scheduled => "scheduled",
        }
    }
}

/// Observable state of a [`PollLoop`], published on every transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollStatus {
    /// Current phase.
    pub phase: PollPhase,
    /// Failures since the last success.
    pub consecutive_errors: u32,
    /// Delay chosen after the most recent cycle.
    pub next_delay: Duration,
    /// Wall-clock millis of the most recent success.
    pub last_success_ms: Option<u64>,
    /// Message of the most recent failure, cleared on success.
    pub last_error: Option<String>,
}

impl Default for PollStatus {
    fn default() -> Self {
        Self {
            phase: PollPhase::Idle,
            consecutive_errors: 0,
            next_delay: Duration::ZERO,
            last_success_ms: None,
            last_error: None,
        }
    }
}

/// # Poll Handler
///
/// Receives the outcome of every cycle. Both methods run on the loop's task
/// between the fetch and the next sleep and must not block.
pub trait PollHandler<T>: Send + Sync + 'static {
    /// A fetch succeeded. The error count has already been reset.
    fn on_success(&self, value: T);

    /// A fetch failed; `consecutive_errors` already includes this failure.
    fn on_failure(&self, error: &FetchError, consecutive_errors: u32);
}

/// # Poll Loop
///
/// Handle to a running loop. Dropping it stops the loop.
pub struct PollLoop {
    name: String,
    token: CancellationToken,
    trigger: Arc<Notify>,
    status: watch::Receiver<PollStatus>,
}

impl PollLoop {
    /// # Spawn
    ///
    /// Starts a loop on the current tokio runtime. The first fetch happens
    /// immediately. The loop stops when `parent` is cancelled or the handle is
    /// dropped.
    pub fn spawn<T, F, Fut, H>(
        name: &str,
        config: PollConfig,
        fetch: F,
        handler: Arc<H>,
        parent: &CancellationToken,
    ) -> Self
    where
        T: Send + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, FetchError>> + Send + 'static,
        H: PollHandler<T>,
    {
        let token = parent.child_token();
        let trigger = Arc::new(Notify::new());
        let (status_tx, status_rx) = watch::channel(PollStatus::default());

        tokio::spawn(run(
            name.to_string(),
            config,
            fetch,
            handler,
            token.clone(),
            Arc::clone(&trigger),
            status_tx,
        ));

        Self {
            name: name.to_string(),
            token,
            trigger,
            status: status_rx,
        }
    }

    /// Name given at spawn time.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Cancels the pending delay and fetches right away. If a fetch is already
    /// in flight, the next one starts as soon as it completes.
    pub fn poll_now(&self) {
        self.trigger.notify_one();
    }

    /// Snapshot of the current status.
    pub fn status(&self) -> PollStatus {
        self.status.borrow().clone()
    }

    /// A receiver that observes every status change.
    pub fn subscribe_status(&self) -> watch::Receiver<PollStatus> {
        self.status.clone()
    }

    /// Stops the loop. Any in-flight fetch result is discarded.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Whether the loop has been told to stop.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Drop for PollLoop {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

async fn run<T, F, Fut, H>(
    name: String,
    config: PollConfig,
    fetch: F,
    handler: Arc<H>,
    token: CancellationToken,
    trigger: Arc<Notify>,
    status: watch::Sender<PollStatus>,
) where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
    H: PollHandler<T>,
{
    let mut state = PollState::default();
    tracing::debug!(service = %name, "poll loop started");

    loop {
        status.send_modify(|s| s.phase = PollPhase::Fetching);

        let outcome = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            outcome = fetch() => outcome,
        };

        // The result of a fetch that straddled cancellation is dropped here.
        if token.is_cancelled() {
            break;
        }

        let delay = match outcome {
            Ok(value) => {
                let previous_errors = state.record_success();
                if previous_errors > 0 {
                    tracing::info!(service = %name, errors = previous_errors, "poll recovered");
                }
                handler.on_success(value);
                status.send_modify(|s| {
                    s.consecutive_errors = 0;
                    s.last_success_ms = Some(now_millis());
                    s.last_error = None;
                });
                config.base_interval
            }
            Err(error) => {
                let errors = state.record_failure();
                tracing::warn!(service = %name, errors, %error, "poll failed");
                handler.on_failure(&error, errors);
                status.send_modify(|s| {
                    s.consecutive_errors = errors;
                    s.last_error = Some(error.to_string());
                });
                config.backoff_delay(errors)
            }
        };

        status.send_modify(|s| {
            s.phase = PollPhase::Scheduled;
            s.next_delay = delay;
        });

        tokio::select! {
            _ = token.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
            _ = trigger.notified() => {
                tracing::debug!(service = %name, "manual poll requested");
            }
        }
    }

    status.send_modify(|s| s.phase = PollPhase::Idle);
    tracing::debug!(service = %name, "poll loop stopped");
}
