//! Retry configuration, the backoff state machine, and the shared
//! [`with_backoff`] helper.
//!
//! One logical call moves through `Attempting → {Success, RetryWait,
//! Exhausted}`; `RetryWait` returns to `Attempting` once the delay has
//! elapsed. The decision half of that machine ([`RetryState::on_failure`])
//! is pure and does no I/O. [`with_backoff`] drives it: it runs the
//! operation, rotates the [`CredentialPool`] and sleeps as told.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::credentials::{Credential, CredentialPool};
use crate::error::ErrorClass;
use crate::telemetry;
use crate::{Result, SanadError};

/// Configuration for retry behaviour on transient errors.
///
/// ```rust
/// # use sanad::RetryConfig;
/// # use std::time::Duration;
/// let config = RetryConfig::new()
///     .max_attempts(5)
///     .base_delay(Duration::from_millis(200))
///     .backoff_multiplier(2.0);
/// ```
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of upstream calls (including the first).
    /// 1 = no retry. Default: 3.
    pub max_attempts: u32,
    /// Delay before the first retry. Default: 2s.
    pub base_delay: Duration,
    /// Factor applied to the delay after each retry. Default: 1.5.
    pub backoff_multiplier: f64,
    /// Upper bound on any single wait. Default: 30s.
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(2000),
            backoff_multiplier: 1.5,
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryConfig {
    /// Create a new config with the default schedule.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a config that disables retries (single attempt).
    pub fn disabled() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Set maximum attempts (including the initial request).
    pub fn max_attempts(mut self, n: u32) -> Self {
        self.max_attempts = n;
        self
    }

    /// Set the delay before the first retry.
    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Set the growth factor between retries.
    pub fn backoff_multiplier(mut self, factor: f64) -> Self {
        self.backoff_multiplier = factor;
        self
    }

    /// Set the maximum delay between retries.
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Delay before retry number `retry` (0-indexed), without hints.
    ///
    /// `base_delay * multiplier^retry`, capped at `max_delay`.
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        let factor = self.backoff_multiplier.max(1.0).powi(retry as i32);
        scale(self.base_delay, factor).min(self.max_delay)
    }
}

fn scale(delay: Duration, factor: f64) -> Duration {
    Duration::try_from_secs_f64(delay.as_secs_f64() * factor).unwrap_or(Duration::MAX)
}

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Rotate the credential, wait `delay`, then attempt again.
    Retry { delay: Duration },
    /// The error is not retryable; propagate it now.
    Fatal,
    /// The attempt budget is spent; propagate the last error.
    Exhausted,
}

/// Per-call retry bookkeeping. Created fresh for every logical call.
#[derive(Debug, Clone)]
pub struct RetryState {
    attempts_remaining: u32,
    next_delay: Duration,
    multiplier: f64,
    max_delay: Duration,
}

impl RetryState {
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            attempts_remaining: config.max_attempts.max(1),
            next_delay: config.base_delay.min(config.max_delay),
            multiplier: config.backoff_multiplier.max(1.0),
            max_delay: config.max_delay,
        }
    }

    /// Attempts left, counting the one about to be made.
    pub fn attempts_remaining(&self) -> u32 {
        self.attempts_remaining
    }

    /// Delay the next retry will wait, before any server hint.
    pub fn next_delay(&self) -> Duration {
        self.next_delay
    }

    /// Record a failed attempt and decide the next transition.
    ///
    /// A `retry_after` hint can lengthen this round's wait but does not
    /// change how the schedule grows.
    pub fn on_failure(&mut self, class: ErrorClass, retry_after: Option<Duration>) -> RetryDecision {
        self.attempts_remaining = self.attempts_remaining.saturating_sub(1);
        if class == ErrorClass::Fatal {
            return RetryDecision::Fatal;
        }
        if self.attempts_remaining == 0 {
            return RetryDecision::Exhausted;
        }
        let delay = retry_after
            .map_or(self.next_delay, |hint| hint.max(self.next_delay))
            .min(self.max_delay);
        self.next_delay = scale(self.next_delay, self.multiplier).min(self.max_delay);
        RetryDecision::Retry { delay }
    }
}

/// Execute `op` against the pool's current credential, retrying transient
/// failures with credential rotation and exponential backoff.
///
/// `op` is called between 1 and `config.max_attempts` times; the pool is
/// rotated at most `max_attempts - 1` times. Fatal errors return
/// immediately. Cancelling `cancel` aborts both the in-flight call and any
/// pending wait with [`SanadError::Cancelled`].
pub async fn with_backoff<F, Fut, T>(
    config: &RetryConfig,
    pool: &CredentialPool,
    cancel: &CancellationToken,
    operation: &str,
    op: F,
) -> Result<T>
where
    F: Fn(Credential) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut state = RetryState::new(config);
    loop {
        let credential = pool.current();
        let credential_index = credential.index();

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(SanadError::Cancelled),
            outcome = op(credential) => outcome,
        };

        let err = match outcome {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        match state.on_failure(err.class(), err.retry_after()) {
            RetryDecision::Retry { delay } => {
                metrics::counter!(telemetry::RETRIES_TOTAL, "operation" => operation.to_owned())
                    .increment(1);
                metrics::counter!(telemetry::CREDENTIAL_ROTATIONS_TOTAL).increment(1);
                warn!(
                    operation,
                    credential = credential_index,
                    attempts_remaining = state.attempts_remaining(),
                    max_attempts = config.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "transient upstream error, rotating credential and retrying"
                );
                pool.rotate();
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(SanadError::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            RetryDecision::Exhausted => {
                warn!(operation, max_attempts = config.max_attempts, error = %err, "retry budget exhausted");
                return Err(err);
            }
            RetryDecision::Fatal => return Err(err),
        }
    }
}
