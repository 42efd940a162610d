//! Bounded retry-with-delay policy for flaky external operations
//!
//! Every script used to carry its own catch-and-sleep loop; this is the one
//! policy object they all share now. An operation runs up to
//! `max_attempts + 1` times with a fixed delay between attempts. Terminal
//! states are `Success` and `ExhaustedFailure`; nothing in between is
//! observable from outside.

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{error, info, warn};

/// Terminal outcome of a retried operation. The failure reason is captured
/// and handed back to the caller, never re-raised silently.
#[derive(Debug)]
pub enum RetryOutcome<T, E> {
    Success { value: T, attempts: u32 },
    ExhaustedFailure { attempts: u32, last_error: E },
}

impl<T, E> RetryOutcome<T, E> {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn into_result(self) -> Result<T, E> {
        match self {
            Self::Success { value, .. } => Ok(value),
            Self::ExhaustedFailure { last_error, .. } => Err(last_error),
        }
    }
}

/// Fixed-delay retry policy, parameterized by attempt count and delay.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Retries after the initial attempt, so the operation runs at most
    /// `max_attempts + 1` times.
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }

    /// Runs `op` under this policy. `label` names the operation in logs.
    pub async fn run<T, E, F, Fut>(&self, label: &str, mut op: F) -> RetryOutcome<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let total = self.max_attempts + 1;
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            match op().await {
                Ok(value) => {
                    if attempt > 1 {
                        info!(label, attempt, "operation recovered after retry");
                    }
                    return RetryOutcome::Success {
                        value,
                        attempts: attempt,
                    };
                }
                Err(err) if attempt >= total => {
                    error!(label, attempts = attempt, %err, "retries exhausted");
                    return RetryOutcome::ExhaustedFailure {
                        attempts: attempt,
                        last_error: err,
                    };
                }
                Err(err) => {
                    warn!(
                        label,
                        attempt,
                        total,
                        %err,
                        delay_ms = self.delay.as_millis() as u64,
                        "attempt failed, retrying"
                    );
                    sleep(self.delay).await;
                }
            }
        }
    }

    /// Like [`run`](Self::run), but invokes `capture` once before giving up,
    /// so UI-automation callers can grab a diagnostic artifact (screenshot
    /// equivalent) alongside the terminal failure.
    pub async fn run_with_diagnostic<T, E, F, Fut, C, CFut>(
        &self,
        label: &str,
        op: F,
        capture: C,
    ) -> RetryOutcome<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
        C: FnOnce(&E) -> CFut,
        CFut: Future<Output = ()>,
    {
        let outcome = self.run(label, op).await;
        if let RetryOutcome::ExhaustedFailure { last_error, .. } = &outcome {
            capture(last_error).await;
        }
        outcome
    }
}
