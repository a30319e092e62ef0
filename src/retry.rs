//! Client-side retry orchestration.
//!
//! Wraps a fallible operation with bounded retry and a coarse keyword
//! classification of the failure message, and tracks a "safe mode" flag:
//! after repeated service-outage failures the caller is expected to keep
//! offering only the functionality that does not depend on the degraded
//! path (name search stays up, GPS-origin search goes dark).

use crate::notify::ProgressSink;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Automatic retries after the first attempt (3 attempts total).
pub const MAX_AUTO_RETRIES: u32 = 2;

/// Base backoff; attempt N waits N * this before running.
pub const RETRY_DELAY_MS: u64 = 2000;

/// Coarse failure classes derived from the lower-cased error message.
/// Intentionally a keyword table, not a parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Caller must re-authenticate; retrying cannot help.
    AuthPermission,
    /// Transient service/runtime instability; worth retrying.
    ServiceRecovering,
    /// Transient replication/consistency lag; worth retrying.
    Replication,
    /// Network/fetch failure; retried, but surfaced to the user at once.
    Network,
    /// Timed out; worth retrying.
    Timeout,
    /// Upstream said to slow down; user must wait.
    RateLimited,
    /// Nothing matched; treated as retryable.
    Unknown,
}

impl ErrorClass {
    /// Terminal classes end the retry loop immediately.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::AuthPermission | Self::RateLimited)
    }

    /// Classes that indicate the backing service itself is degraded.
    pub fn is_service_outage(self) -> bool {
        matches!(self, Self::ServiceRecovering | Self::Network | Self::Timeout)
    }
}

/// Classify an error message by keyword, checked in priority order.
pub fn classify(message: &str) -> ErrorClass {
    let m = message.to_lowercase();

    if m.contains("unauthorized")
        || m.contains("permission")
        || m.contains("forbidden")
        || m.contains("403")
        || m.contains("401")
    {
        return ErrorClass::AuthPermission;
    }
    if m.contains("429") || m.contains("rate limit") || m.contains("too many requests") {
        return ErrorClass::RateLimited;
    }
    if m.contains("timeout") || m.contains("timed out") {
        return ErrorClass::Timeout;
    }
    if m.contains("service unavailable") || m.contains("503") || m.contains("recovering") {
        return ErrorClass::ServiceRecovering;
    }
    if m.contains("replication") || m.contains("certified state") || m.contains("consistency") {
        return ErrorClass::Replication;
    }
    if m.contains("network")
        || m.contains("fetch")
        || m.contains("connection")
        || m.contains("dns")
    {
        return ErrorClass::Network;
    }
    ErrorClass::Unknown
}

/// Outcome of an exhausted or terminally-failed operation.
#[derive(Debug, Clone)]
pub struct RetryError {
    pub class: ErrorClass,
    pub message: String,
    pub attempts: u32,
}

/// Bounded-retry wrapper around any fallible operation.
pub struct RetryOrchestrator {
    delay_ms: u64,
    sink: Arc<dyn ProgressSink>,
    safe_mode: AtomicBool,
}

impl RetryOrchestrator {
    pub fn new(sink: Arc<dyn ProgressSink>) -> Self {
        Self {
            delay_ms: RETRY_DELAY_MS,
            sink,
            safe_mode: AtomicBool::new(false),
        }
    }

    /// Override the base backoff (for tests).
    pub fn with_delay_ms(mut self, delay_ms: u64) -> Self {
        self.delay_ms = delay_ms;
        self
    }

    /// Whether repeated outages have put the client in degraded mode.
    pub fn safe_mode(&self) -> bool {
        self.safe_mode.load(Ordering::SeqCst)
    }

    /// Run `operation` with up to `MAX_AUTO_RETRIES` automatic retries and
    /// linearly increasing backoff. Terminal classifications stop the loop
    /// early. Never panics past this boundary; failure comes back as data.
    pub fn execute<T, F>(&self, label: &str, mut operation: F) -> Result<T, RetryError>
    where
        F: FnMut() -> Result<T, String>,
    {
        let total = MAX_AUTO_RETRIES + 1;
        let mut last = RetryError {
            class: ErrorClass::Unknown,
            message: String::new(),
            attempts: 0,
        };

        for attempt in 1..=total {
            if attempt > 1 {
                // Backoff grows with the retry index: 1*delay, 2*delay.
                let wait = self.delay_ms * u64::from(attempt - 1);
                self.sink.notify(&format!(
                    "{}: retrying (attempt {}/{}, waiting {}ms)",
                    label, attempt, total, wait
                ));
                std::thread::sleep(Duration::from_millis(wait));
            }

            match operation() {
                Ok(value) => {
                    self.safe_mode.store(false, Ordering::SeqCst);
                    if attempt > 1 {
                        self.sink
                            .notify(&format!("{}: recovered on attempt {}", label, attempt));
                    }
                    return Ok(value);
                }
                Err(message) => {
                    let class = classify(&message);
                    last = RetryError {
                        class,
                        message,
                        attempts: attempt,
                    };
                    if class == ErrorClass::Network {
                        // Surfaced immediately, still retried.
                        self.sink
                            .notify(&format!("{}: network problem, retrying", label));
                    }
                    if class.is_terminal() {
                        break;
                    }
                }
            }
        }

        if last.class.is_service_outage() {
            self.safe_mode.store(true, Ordering::SeqCst);
        }
        self.sink.notify(&format!(
            "{}: failed after {} attempt(s): {}",
            label, last.attempts, last.message
        ));
        Err(last)
    }
}
