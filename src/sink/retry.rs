//! Retry and timeout wrappers for bulk-sink calls.

use crate::sink::{SinkError, SinkErrorKind, SinkResult};
use serde::{Deserialize, Serialize};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::Duration;
use tracing::{debug, warn};

/// Configuration for retry behavior
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 100,
            max_delay_ms: 5000,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Delay to wait after `delay_ms`, capped at `max_delay_ms`.
    fn next_delay(&self, delay_ms: u64) -> u64 {
        let grown = (delay_ms as f64 * self.backoff_multiplier.max(1.0)).round();
        if grown >= self.max_delay_ms as f64 {
            self.max_delay_ms
        } else {
            grown as u64
        }
    }
}

/// Retry `operation` with exponential backoff while it fails with a retryable error.
///
/// # Errors
///
/// Returns the last error if it is not retryable or `max_attempts` is reached.
pub fn retry_with_backoff<F, T>(config: &RetryConfig, mut operation: F) -> SinkResult<T>
where
    F: FnMut() -> SinkResult<T>,
{
    let mut attempt = 0;
    let mut delay_ms = config.initial_delay_ms.min(config.max_delay_ms);

    loop {
        attempt += 1;
        match operation() {
            Ok(result) => return Ok(result),
            Err(err) => {
                if !err.is_retryable() || attempt >= config.max_attempts {
                    return Err(err);
                }
                warn!(attempt, max_attempts = config.max_attempts, delay_ms, error = %err, "retrying sink call");
                std::thread::sleep(Duration::from_millis(delay_ms));
                delay_ms = config.next_delay(delay_ms);
            }
        }
    }
}

/// A sink call running on a helper thread.
///
/// The call cannot be cancelled. Waiting on it again after a timeout picks up
/// its result if it has finished since.
pub struct PendingCall<T> {
    rx: mpsc::Receiver<SinkResult<T>>,
}

impl<T: Send + 'static> PendingCall<T> {
    /// Start `operation` on a new thread.
    ///
    /// # Errors
    /// Returns [`SinkErrorKind::Other`] if the thread cannot be spawned.
    pub fn spawn<F>(operation: F) -> SinkResult<Self>
    where
        F: FnOnce() -> SinkResult<T> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel();
        std::thread::Builder::new()
            .name("ironshard-sink".to_string())
            .spawn(move || {
                let _ = tx.send(operation());
            })
            .map_err(|e| SinkError::new(SinkErrorKind::Other, format!("spawn sink thread: {e}")))?;
        Ok(Self { rx })
    }

    /// Wait up to `timeout` for the result. `None` means it is still running.
    pub fn wait(&self, timeout: Duration) -> Option<SinkResult<T>> {
        match self.rx.recv_timeout(timeout) {
            Ok(result) => Some(result),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => {
                Some(Err(SinkError::new(SinkErrorKind::Other, "sink call panicked")))
            }
        }
    }
}

fn timed_out(timeout: Duration) -> SinkError {
    SinkError::new(
        SinkErrorKind::Timeout,
        format!("sink call exceeded timeout of {timeout:?}"),
    )
}

/// Run `operation` on a helper thread and give up after `timeout`.
///
/// A timed-out call is abandoned, not cancelled: it keeps running in the
/// background and its result is discarded.
///
/// # Errors
///
/// Returns a [`SinkErrorKind::Timeout`] error when the deadline passes, the
/// operation's own error otherwise.
pub fn with_timeout<F, T>(timeout: Duration, operation: F) -> SinkResult<T>
where
    F: FnOnce() -> SinkResult<T> + Send + 'static,
    T: Send + 'static,
{
    PendingCall::spawn(operation)?
        .wait(timeout)
        .unwrap_or_else(|| Err(timed_out(timeout)))
}

/// Retry with backoff where each attempt is bounded by `timeout`.
///
/// `make_call` builds one sink call per attempt. When an attempt times out,
/// the call keeps running and the next attempt waits on that same call
/// instead of starting another one, so at most one call is in flight and a
/// slow call that eventually commits is never repeated. A new call is made
/// only after the previous one has returned a retryable error.
///
/// # Errors
///
/// Returns the last error once it is not retryable or `max_attempts` is
/// reached. A call still running at that point is abandoned.
pub fn retry_with_timeout<T, F, G>(
    config: &RetryConfig,
    timeout: Duration,
    mut make_call: F,
) -> SinkResult<T>
where
    F: FnMut() -> G,
    G: FnOnce() -> SinkResult<T> + Send + 'static,
    T: Send + 'static,
{
    let mut in_flight: Option<PendingCall<T>> = None;
    retry_with_backoff(config, || {
        let call = match in_flight.take() {
            Some(call) => {
                debug!("previous sink call still running; waiting on it");
                call
            }
            None => PendingCall::spawn(make_call())?,
        };
        match call.wait(timeout) {
            Some(result) => result,
            None => {
                in_flight = Some(call);
                Err(timed_out(timeout))
            }
        }
    })
}
