//! Bounded exponential backoff for retrying plugin operations.
//!
//! The engine never retries on its own; tasks and targets that talk to
//! flaky peers wrap their call in [`Backoff::execute`].
//!
//! ```
//! use std::time::Duration;
//! use hubwork_core::{Backoff, BackoffConfig};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let backoff = Backoff::new(BackoffConfig {
//!     initial_delay: Duration::from_millis(1),
//!     max_delay: Duration::from_millis(4),
//!     multiplier: 2.0,
//!     max_retries: 3,
//! });
//!
//! let value = backoff.execute(|| async { Ok::<_, String>(42) }).await.unwrap();
//! assert_eq!(value, 42);
//! # }
//! ```

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors whose message contains this marker are never retried.
pub const UNRECOVERABLE_MARKER: &str = "error is unrecoverable - backoff cancelled";

/// Prefixes `message` with [`UNRECOVERABLE_MARKER`].
///
/// ```
/// use hubwork_core::{is_unrecoverable, mark_unrecoverable};
///
/// let msg = mark_unrecoverable("malformed reply");
/// assert!(is_unrecoverable(&msg));
/// ```
pub fn mark_unrecoverable(message: impl Display) -> String {
    format!("{UNRECOVERABLE_MARKER}: {message}")
}

/// Whether an error's message carries [`UNRECOVERABLE_MARKER`].
pub fn is_unrecoverable<E: Display + ?Sized>(err: &E) -> bool {
    err.to_string().contains(UNRECOVERABLE_MARKER)
}

/// Retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BackoffConfig {
    /// Delay before the second attempt.
    pub initial_delay: Duration,
    /// Upper bound for the delay between attempts.
    pub max_delay: Duration,
    /// Growth factor applied after every failed attempt.
    pub multiplier: f64,
    /// Total number of attempts; zero is treated as one.
    pub max_retries: u32,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
            max_retries: 3,
        }
    }
}

/// Outcome of an operation that never succeeded.
#[derive(Debug, Error)]
pub enum BackoffError<E> {
    /// The operation reported an unrecoverable error; no retry happened.
    #[error("{0}")]
    Unrecoverable(E),

    /// Every attempt failed.
    #[error("all retry attempts failed after {attempts} attempts: {last}")]
    Exhausted {
        /// Number of attempts made.
        attempts: u32,
        /// Error of the final attempt.
        last: E,
    },
}

impl<E> BackoffError<E> {
    /// The operation's own error.
    pub fn into_inner(self) -> E {
        match self {
            Self::Unrecoverable(err) | Self::Exhausted { last: err, .. } => err,
        }
    }

    /// Whether retries ran out.
    pub fn is_exhausted(&self) -> bool {
        matches!(self, Self::Exhausted { .. })
    }
}

/// Executes operations under a [`BackoffConfig`].
#[derive(Debug, Clone, Default)]
pub struct Backoff {
    config: BackoffConfig,
}

impl Backoff {
    /// Creates an executor for `config`.
    #[must_use]
    pub fn new(config: BackoffConfig) -> Self {
        Self { config }
    }

    /// The policy in use.
    pub fn config(&self) -> &BackoffConfig {
        &self.config
    }

    /// Runs `op`, retrying errors that do not carry [`UNRECOVERABLE_MARKER`].
    pub async fn execute<T, E, F, Fut>(&self, op: F) -> Result<T, BackoffError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        self.execute_classified(op, |err: &E| is_unrecoverable(err))
            .await
    }

    /// Runs `op`, asking `unrecoverable` whether each error may be retried.
    pub async fn execute_classified<T, E, F, Fut, C>(
        &self,
        mut op: F,
        unrecoverable: C,
    ) -> Result<T, BackoffError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
        C: Fn(&E) -> bool,
    {
        let max_attempts = self.config.max_retries.max(1);
        let mut delay = self.config.initial_delay;
        let mut attempt = 0;

        loop {
            attempt += 1;
            let err = match op().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if unrecoverable(&err) {
                tracing::debug!(attempt, error = %err, "unrecoverable error, not retrying");
                return Err(BackoffError::Unrecoverable(err));
            }
            if attempt >= max_attempts {
                tracing::warn!(attempts = attempt, error = %err, "all retry attempts failed");
                return Err(BackoffError::Exhausted {
                    attempts: attempt,
                    last: err,
                });
            }

            let wait = delay + jitter(delay);
            tracing::debug!(attempt, wait_ms = wait.as_millis() as u64, error = %err, "retrying after failure");
            tokio::time::sleep(wait).await;
            delay = self.next_delay(delay);
        }
    }

    fn next_delay(&self, current: Duration) -> Duration {
        let grown = Duration::try_from_secs_f64(current.as_secs_f64() * self.config.multiplier)
            .unwrap_or(self.config.max_delay);
        grown.min(self.config.max_delay)
    }
}

// Uniform in [0, delay / 2].
fn jitter(delay: Duration) -> Duration {
    let half = u64::try_from((delay / 2).as_nanos()).unwrap_or(u64::MAX);
    if half == 0 {
        return Duration::ZERO;
    }
    Duration::from_nanos(fastrand::u64(0..=half))
}
