/// Provides a point of time since start of the application
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Instant(pub u64);

impl Instant {
    /// Milliseconds since start of the application
    pub fn ms(&self) -> u64 {
        self.0
    }
}

/// Provides the monotonic clock the stack samples all timing decisions against
pub trait TimerDriver {
    /// Get current time
    fn now(&self) -> Instant;
}

/// A single shot expiry tracker, re-armed with [Timer::start]
///
/// The timer holds no thread or callback affinity, it only compares
/// a start point against a caller supplied [Instant].
#[derive(Debug, Clone)]
pub struct Timer {
    timeout_ms: u64,
    started_at: Option<Instant>,
}

impl Timer {
    /// Creates a stopped timer with the given timeout
    pub fn new(timeout_ms: u64) -> Self {
        Self {
            timeout_ms,
            started_at: None,
        }
    }
    /// (Re-)arms the timer at the given point of time
    pub fn start(&mut self, now: Instant) {
        self.started_at = Some(now);
    }
    /// Disarms the timer, [Timer::is_expired] returns false until the next start
    pub fn stop(&mut self) {
        self.started_at = None;
    }
    /// Changes the timeout, takes effect on the current period as well
    pub fn set_timeout(&mut self, timeout_ms: u64) {
        self.timeout_ms = timeout_ms;
    }
    /// Checks if the timeout elapsed since the last start
    pub fn is_expired(&self, now: Instant) -> bool {
        match self.started_at {
            Some(start) => now.0.saturating_sub(start.0) >= self.timeout_ms,
            None => false,
        }
    }
    /// True if the timer is armed
    pub fn is_running(&self) -> bool {
        self.started_at.is_some()
    }
}
