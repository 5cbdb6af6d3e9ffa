//! Retry controller for individual HTTP exchanges.
//!
//! Every exchange the engine issues (slot PUTs, range GETs, control-plane
//! calls) goes through [`RetryController::execute`]. HTTP 500, HTTP 503 and
//! transport failures are retried with jittered exponential backoff; every
//! other non-2xx status fails immediately.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::TransferError;
use crate::http::{HttpResponse, TransportError};

/// Longest response body carried inside a [`TransferError::ClientRequest`].
const MAX_ERROR_BODY_CHARS: usize = 512;

/// Exponential backoff parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, first try included.
    pub max_attempts: u32,
    /// Base delay before the first retry.
    pub initial_delay: Duration,
    /// Multiplier for each subsequent retry.
    pub backoff_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: crate::DEFAULT_MAX_RETRY_ATTEMPTS,
            initial_delay: Duration::from_secs(1),
            backoff_factor: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based).
    ///
    /// The base delay `initial * factor^(retry-1)` is stretched by a random
    /// factor in `[1, 2)`, so with the defaults retry `i` waits between
    /// `2^(i-1)` and `2^i` seconds.
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        let unit = rand::thread_rng().gen_range(0.0..1.0);
        self.delay_with_jitter(retry, unit)
    }

    fn delay_with_jitter(&self, retry: u32, unit: f64) -> Duration {
        let exp = retry.saturating_sub(1).min(63) as i32;
        let base = self.initial_delay.as_secs_f64() * self.backoff_factor.powi(exp);
        let secs = base * (1.0 + unit.clamp(0.0, 1.0));
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    }
}

/// Whether an exchange may be repeated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetrySafety {
    SafeToRetry,
    /// Exactly one attempt; failures are classified but never repeated.
    NoRetry,
}

/// Runs exchanges under a [`RetryPolicy`], observing a cancellation token.
#[derive(Debug, Clone)]
pub struct RetryController {
    policy: RetryPolicy,
    cancel: CancellationToken,
}

impl RetryController {
    pub fn new(policy: RetryPolicy, cancel: CancellationToken) -> Self {
        Self { policy, cancel }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Runs `exchange` until it yields a 2xx response or a non-retryable failure.
    ///
    /// `exchange` is called once per attempt and must build a fresh request
    /// each time. A 503 carrying `Retry-After` (delta-seconds) waits exactly
    /// that long instead of the computed backoff. Cancellation is observed
    /// before each attempt, during the exchange and during the backoff sleep.
    pub async fn execute<F, Fut>(
        &self,
        operation: &str,
        safety: RetrySafety,
        mut exchange: F,
    ) -> Result<HttpResponse, TransferError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<HttpResponse, TransportError>>,
    {
        let max_attempts = match safety {
            RetrySafety::SafeToRetry => self.policy.max_attempts.max(1),
            RetrySafety::NoRetry => 1,
        };
        let mut attempt: u32 = 0;

        loop {
            if self.cancel.is_cancelled() {
                return Err(TransferError::Cancelled);
            }
            attempt += 1;

            let outcome = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(TransferError::Cancelled),
                r = exchange() => r,
            };

            let err = match classify(operation, outcome) {
                Ok(resp) => {
                    if attempt > 1 {
                        debug!(operation, attempt, "exchange succeeded after retry");
                    }
                    return Ok(resp);
                }
                Err(e) => e,
            };

            if safety == RetrySafety::NoRetry || !err.is_retryable() {
                return Err(err);
            }
            if attempt >= max_attempts {
                return Err(TransferError::RetriesExhausted {
                    operation: operation.to_string(),
                    attempts: attempt,
                    last: Box::new(err),
                });
            }

            let delay = match &err {
                TransferError::ServerBusy {
                    retry_after: Some(after),
                    ..
                } => *after,
                _ => self.policy.delay_for_retry(attempt),
            };
            let delay_secs = delay.as_secs_f64();
            warn!(
                operation,
                attempt,
                max_attempts,
                delay_secs = format_args!("{delay_secs:.1}"),
                error = %err,
                "retrying exchange"
            );

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(TransferError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}

/// Parses a `Retry-After` value given in delta-seconds.
///
/// HTTP-date values are not supported and yield `None`.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

/// Maps one exchange outcome onto the error taxonomy.
fn classify(
    operation: &str,
    outcome: Result<HttpResponse, TransportError>,
) -> Result<HttpResponse, TransferError> {
    let resp = outcome.map_err(|e| TransferError::Transport {
        operation: operation.to_string(),
        message: e.to_string(),
    })?;

    let status = resp.status;
    match status {
        _ if resp.is_success() => Ok(resp),
        503 => Err(TransferError::ServerBusy {
            operation: operation.to_string(),
            retry_after: resp.header("retry-after").and_then(parse_retry_after),
        }),
        500 => Err(TransferError::ServerInternal {
            operation: operation.to_string(),
        }),
        _ => Err(TransferError::ClientRequest {
            operation: operation.to_string(),
            status,
            body: String::from_utf8_lossy(&resp.body)
                .chars()
                .take(MAX_ERROR_BODY_CHARS)
                .collect(),
        }),
    }
}
