//! Wall-clock rate limiter.
//!
//! One instance per independent throttled stream (e.g. one per active
//! location watch). Single-threaded cooperative use only — callers that
//! need cross-thread throttling must add their own synchronization.

/// Millisecond clock, injectable so tests can drive time by hand.
pub type Clock = Box<dyn Fn() -> i64 + Send>;

fn wall_clock() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// "Has enough time elapsed since the last execution" gate.
pub struct RateLimiter {
    min_interval_ms: i64,
    last_execution_at: Option<i64>,
    clock: Clock,
}

impl RateLimiter {
    pub fn new(min_interval_ms: i64) -> Self {
        Self {
            min_interval_ms,
            last_execution_at: None,
            clock: Box::new(wall_clock),
        }
    }

    /// Build with a custom clock (for testing).
    pub fn with_clock(min_interval_ms: i64, clock: Clock) -> Self {
        Self {
            min_interval_ms,
            last_execution_at: None,
            clock,
        }
    }

    /// True iff the interval has elapsed. An unset timestamp counts as
    /// infinitely long ago.
    pub fn can_execute(&self) -> bool {
        match self.last_execution_at {
            None => true,
            Some(last) => (self.clock)() - last >= self.min_interval_ms,
        }
    }

    /// Record an execution at the current time.
    pub fn mark_executed(&mut self) {
        self.last_execution_at = Some((self.clock)());
    }

    /// Check-and-mark, then run `action` if allowed. Returns whether it ran.
    pub fn try_execute<F: FnOnce()>(&mut self, action: F) -> bool {
        if !self.can_execute() {
            return false;
        }
        self.mark_executed();
        action();
        true
    }

    /// Forget the last execution so the next call is allowed immediately.
    pub fn reset(&mut self) {
        self.last_execution_at = None;
    }
}
