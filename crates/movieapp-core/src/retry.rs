//! Bounded retry for transient failures
//!
//! Attempts run back to back with no delay. Whether a failure is retried
//! depends only on its [`Code`].

use std::future::Future;

use metrics::counter;
use tracing::warn;

use movieapp_common::{CancelSignal, Code, MovieAppError, Result, run_until_cancelled};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub retryable: Vec<Code>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            retryable: Code::TRANSIENT.to_vec(),
        }
    }
}

impl RetryPolicy {
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    pub fn is_retryable(&self, code: Code) -> bool {
        self.retryable.contains(&code)
    }

    /// Run `operation` until it succeeds, fails with a non-retryable code,
    /// exhausts `max_attempts` or `signal` fires.
    ///
    /// The closure receives the 1-based attempt number. On exhaustion the last
    /// failure is returned unchanged. Cancellation drops the in-flight attempt
    /// and yields `Cancelled`.
    pub async fn run<T, F, Fut>(
        &self,
        target: &str,
        signal: &CancelSignal,
        mut operation: F,
    ) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;

            let Some(outcome) = run_until_cancelled(operation(attempt), signal).await else {
                return Err(MovieAppError::Cancelled(format!(
                    "call to {} cancelled before attempt {} completed",
                    target, attempt
                )));
            };

            match outcome {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.max_attempts && self.is_retryable(e.code()) => {
                    warn!(
                        "Call to {} failed (attempt {}/{}): {}",
                        target, attempt, self.max_attempts, e
                    );
                    counter!("gateway_retries_total", "service" => target.to_string())
                        .increment(1);
                }
                Err(e) => return Err(e),
            }
        }
    }
}
