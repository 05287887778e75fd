//! Shared reliability fabric for AstraGuard.
//!
//! Three composable primitives, always layered outer to inner:
//! retry → circuit breaker → timeout. The breaker then observes the final
//! outcome of a retry burst rather than each internal attempt.

#![forbid(unsafe_code)]

use parking_lot::Mutex;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{info, warn};

// ─── Timeout ─────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
#[error("operation '{operation}' timed out after {timeout:?}")]
pub struct TimeoutError {
    pub operation: String,
    pub timeout: Duration,
}

/// Wrap a future with a deadline. On expiry the future is dropped
/// (cooperative cancellation) and a [`TimeoutError`] surfaces to the caller.
pub async fn with_timeout<T, F>(
    operation: &str,
    timeout: Duration,
    fut: F,
) -> Result<T, TimeoutError>
where
    F: Future<Output = T>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(value) => Ok(value),
        Err(_) => {
            warn!(operation, ?timeout, "operation timed out");
            Err(TimeoutError {
                operation: operation.to_string(),
                timeout,
            })
        }
    }
}

// ─── Retry ───────────────────────────────────────────────────────────────────

/// Exponential backoff with full jitter.
///
/// Attempt `i` (1-based) sleeps a uniform duration in
/// `[0, min(max_delay, base_delay · 2^(i-1))]` before attempt `i+1`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    /// Upper bound of the backoff window after the given 1-based attempt.
    pub fn backoff_ceiling(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(32);
        let unclamped = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(exp));
        unclamped.min(self.max_delay)
    }

    fn jittered_delay(&self, attempt: u32) -> Duration {
        let ceiling = self.backoff_ceiling(attempt);
        if ceiling.is_zero() {
            return ceiling;
        }
        let nanos = rand::thread_rng().gen_range(0..=ceiling.as_nanos() as u64);
        Duration::from_nanos(nanos)
    }

    /// Run `op`, retrying while `retryable` matches the error. Errors that do
    /// not match propagate immediately; on exhaustion the last error is
    /// returned.
    pub async fn run<T, E, F, Fut, P>(&self, operation: &str, mut op: F, retryable: P) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
        E: std::fmt::Display,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < attempts && retryable(&e) => {
                    let delay = self.jittered_delay(attempt);
                    warn!(
                        operation,
                        attempt,
                        max_attempts = attempts,
                        error = %e,
                        delay_ms = delay.as_millis() as u64,
                        "retryable failure, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

// ─── Circuit breaker ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Closed => "CLOSED",
            Self::Open => "OPEN",
            Self::HalfOpen => "HALF_OPEN",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Consecutive counted failures before the breaker opens.
    pub failure_threshold: u32,
    /// Consecutive successes in HALF_OPEN before the breaker closes.
    pub success_threshold: u32,
    /// Idle time in OPEN before the next call probes in HALF_OPEN.
    pub recovery_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            recovery_timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Error)]
pub enum CircuitError<E> {
    #[error("circuit '{name}' is open")]
    Open { name: String },
    #[error(transparent)]
    Inner(E),
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    consecutive_failures: u32,
    consecutive_successes: u32,
    opened_at: Option<Instant>,
}

/// One breaker guards one operation for the process lifetime.
///
/// Counters reset on every state entry. Only errors matched by the caller's
/// `counted` predicate affect the failure count; everything else propagates
/// untouched.
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                consecutive_successes: 0,
                opened_at: None,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current state, promoting OPEN → HALF_OPEN once the recovery timeout
    /// has elapsed.
    pub fn state(&self) -> CircuitState {
        let mut inner = self.inner.lock();
        self.maybe_promote(&mut inner);
        inner.state
    }

    fn maybe_promote(&self, inner: &mut BreakerInner) {
        if inner.state == CircuitState::Open
            && let Some(opened_at) = inner.opened_at
            && opened_at.elapsed() >= self.config.recovery_timeout
        {
            info!(breaker = %self.name, "recovery timeout elapsed, entering HALF_OPEN");
            inner.state = CircuitState::HalfOpen;
            inner.consecutive_failures = 0;
            inner.consecutive_successes = 0;
        }
    }

    fn record_success(&self) {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures = 0;
            }
            CircuitState::HalfOpen => {
                inner.consecutive_successes += 1;
                if inner.consecutive_successes >= self.config.success_threshold {
                    info!(breaker = %self.name, "probe successes reached threshold, closing");
                    inner.state = CircuitState::Closed;
                    inner.consecutive_failures = 0;
                    inner.consecutive_successes = 0;
                    inner.opened_at = None;
                }
            }
            CircuitState::Open => {}
        }
    }

    fn record_failure(&self) {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.config.failure_threshold {
                    warn!(
                        breaker = %self.name,
                        failures = inner.consecutive_failures,
                        "failure threshold reached, opening"
                    );
                    inner.state = CircuitState::Open;
                    inner.opened_at = Some(Instant::now());
                    inner.consecutive_failures = 0;
                    inner.consecutive_successes = 0;
                }
            }
            CircuitState::HalfOpen => {
                warn!(breaker = %self.name, "probe failed, re-opening");
                inner.state = CircuitState::Open;
                inner.opened_at = Some(Instant::now());
                inner.consecutive_failures = 0;
                inner.consecutive_successes = 0;
            }
            CircuitState::Open => {}
        }
    }

    /// Run `op` through the breaker. While OPEN, returns
    /// [`CircuitError::Open`] without invoking `op`.
    ///
    /// `counted` classifies which errors trip the breaker; unmatched errors
    /// propagate without touching the counters.
    pub async fn call<T, E, F, Fut, P>(&self, op: F, counted: P) -> Result<T, CircuitError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
    {
        if self.state() == CircuitState::Open {
            return Err(CircuitError::Open {
                name: self.name.clone(),
            });
        }

        match op().await {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(e) => {
                if counted(&e) {
                    self.record_failure();
                }
                Err(CircuitError::Inner(e))
            }
        }
    }

    /// Like [`CircuitBreaker::call`], but while OPEN the provided fallback
    /// runs instead of surfacing an error.
    pub async fn call_with_fallback<T, E, F, Fut, FB, FutB, P>(
        &self,
        op: F,
        fallback: FB,
        counted: P,
    ) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        FB: FnOnce() -> FutB,
        FutB: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
    {
        match self.call(op, counted).await {
            Ok(value) => Ok(value),
            Err(CircuitError::Open { name }) => {
                warn!(breaker = %name, "open, running fallback");
                fallback().await
            }
            Err(CircuitError::Inner(e)) => Err(e),
        }
    }

    /// Force the breaker back to CLOSED (operator action).
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.state = CircuitState::Closed;
        inner.consecutive_failures = 0;
        inner.consecutive_successes = 0;
        inner.opened_at = None;
        info!(breaker = %self.name, "reset to CLOSED");
    }
}
