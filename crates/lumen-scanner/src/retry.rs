//! Bounded retry with a fixed delay.
//!
//! Every retryable path in this crate goes through [`RetryOrchestrator`] so the
//! policy (attempts, delay, which errors are worth repeating) is set in one
//! place per call site and every failed attempt is reported to a callback.

use crate::error::ScanError;
use lumen_core::RetryPolicyConfig;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::{error, warn};

/// Errors that know whether repeating the operation can help.
pub trait Retryable {
    /// `false` stops the retry loop immediately.
    fn is_retryable(&self) -> bool;
}

impl Retryable for ScanError {
    fn is_retryable(&self) -> bool {
        ScanError::is_retryable(self)
    }
}

/// Attempts and fixed delay for one call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Pause between attempts
    pub delay: Duration,
}

impl RetryPolicy {
    /// Create a policy.
    #[must_use]
    pub const fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }

    /// Run once, never retry.
    #[must_use]
    pub const fn once() -> Self {
        Self::new(1, Duration::ZERO)
    }
}

impl From<RetryPolicyConfig> for RetryPolicy {
    fn from(config: RetryPolicyConfig) -> Self {
        Self::new(config.max_attempts, config.delay())
    }
}

/// Runs an operation until it succeeds, fails permanently, or the budget is spent.
#[derive(Debug, Clone)]
pub struct RetryOrchestrator {
    name: &'static str,
    policy: RetryPolicy,
}

impl RetryOrchestrator {
    /// Create an orchestrator; `name` identifies the call site in logs.
    #[must_use]
    pub fn new(name: &'static str, policy: RetryPolicy) -> Self {
        Self { name, policy }
    }

    /// The policy in effect.
    #[must_use]
    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Run `task_fn` with retries.
    ///
    /// `task_fn` receives the 1-based attempt number. `on_error` sees every
    /// failed attempt, including the last one, before the retry decision is
    /// made. Returns the last error once the budget is exhausted or a
    /// non-retryable error occurs.
    pub async fn execute<F, Fut, T, E, C>(&self, mut task_fn: F, mut on_error: C) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + Display,
        C: FnMut(&E, u32),
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match task_fn(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    on_error(&e, attempt);

                    if !e.is_retryable() {
                        warn!(
                            operation = self.name,
                            attempt,
                            error = %e,
                            "Non-retryable failure, giving up"
                        );
                        return Err(e);
                    }

                    if attempt >= max_attempts {
                        error!(
                            operation = self.name,
                            attempts = attempt,
                            error = %e,
                            "Retry budget exhausted"
                        );
                        return Err(e);
                    }

                    warn!(
                        operation = self.name,
                        "Attempt {}/{} failed: {}. Retrying in {:?}...",
                        attempt,
                        max_attempts,
                        e,
                        self.policy.delay
                    );

                    if !self.policy.delay.is_zero() {
                        tokio::time::sleep(self.policy.delay).await;
                    }
                    attempt += 1;
                }
            }
        }
    }

    /// [`execute`](Self::execute) without an error callback.
    pub async fn run<F, Fut, T, E>(&self, task_fn: F) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + Display,
    {
        self.execute(task_fn, |_, _| {}).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn conflict() -> ScanError {
        ScanError::conflict("website scan group-1")
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_on_second_attempt() {
        let attempt_count = Arc::new(AtomicU32::new(0));
        let orchestrator =
            RetryOrchestrator::new("test", RetryPolicy::new(3, Duration::from_millis(500)));

        let count = attempt_count.clone();
        let result = orchestrator
            .run(|attempt| {
                let count = count.clone();
                async move {
                    count.fetch_add(1, Ordering::SeqCst);
                    if attempt < 2 {
                        Err(conflict())
                    } else {
                        Ok("merged")
                    }
                }
            })
            .await;

        assert_eq!(result.expect("second attempt succeeds"), "merged");
        assert_eq!(attempt_count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausts_attempts_and_reports_each_failure() {
        let orchestrator =
            RetryOrchestrator::new("test", RetryPolicy::new(3, Duration::from_millis(1000)));
        let mut reported = Vec::new();

        let result: Result<(), ScanError> = orchestrator
            .execute(
                |_| async { Err(conflict()) },
                |e, attempt| reported.push((attempt, e.to_string())),
            )
            .await;

        assert!(matches!(result, Err(ScanError::ConcurrentModification { .. })));
        assert_eq!(reported.len(), 3);
        assert_eq!(reported[2].0, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_error_stops_immediately() {
        let attempt_count = Arc::new(AtomicU32::new(0));
        let orchestrator =
            RetryOrchestrator::new("test", RetryPolicy::new(5, Duration::from_millis(500)));

        let count = attempt_count.clone();
        let result: Result<(), ScanError> = orchestrator
            .run(|_| {
                let count = count.clone();
                async move {
                    count.fetch_add(1, Ordering::SeqCst);
                    Err(ScanError::corrupt("blob b", "unexpected end of input"))
                }
            })
            .await;

        assert!(matches!(result, Err(ScanError::CorruptState { .. })));
        assert_eq!(attempt_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fixed_delay_between_attempts() {
        let orchestrator =
            RetryOrchestrator::new("test", RetryPolicy::new(3, Duration::from_millis(500)));
        let started = tokio::time::Instant::now();

        let _: Result<(), ScanError> = orchestrator.run(|_| async { Err(conflict()) }).await;

        // Two pauses of 500ms, not an exponential series.
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(1000));
        assert!(elapsed < Duration::from_millis(1500));
    }

    #[tokio::test]
    async fn test_zero_attempts_still_runs_once() {
        let orchestrator = RetryOrchestrator::new("test", RetryPolicy::new(0, Duration::ZERO));
        let result: Result<u32, ScanError> = orchestrator.run(|attempt| async move { Ok(attempt) }).await;
        assert_eq!(result.expect("runs once"), 1);
    }

    #[test]
    fn test_policy_from_config() {
        let policy = RetryPolicy::from(RetryPolicyConfig::new(2, 1000));
        assert_eq!(policy, RetryPolicy::new(2, Duration::from_secs(1)));
        assert_eq!(RetryPolicy::once().max_attempts, 1);
    }
}
