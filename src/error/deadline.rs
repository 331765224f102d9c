/// Overall operation deadline derived from a directive timeout.
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    started: Instant,
    expires_at: Option<Instant>,
}

impl Deadline {
    /// Deadline `timeout` from now. A timeout too large to represent never expires.
    pub fn after(timeout: Duration) -> Self {
        let started = Instant::now();
        Self {
            started,
            expires_at: started.checked_add(timeout),
        }
    }

    pub fn unbounded() -> Self {
        Self {
            started: Instant::now(),
            expires_at: None,
        }
    }

    /// Time left, `None` when unbounded. Saturates at zero.
    pub fn remaining(&self) -> Option<Duration> {
        self.expires_at
            .map(|at| at.saturating_duration_since(Instant::now()))
    }

    pub fn is_expired(&self) -> bool {
        matches!(self.remaining(), Some(left) if left.is_zero())
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Shorten `wait` to the remaining time. The flag is true when the wait
    /// had to be cut, meaning the deadline will have passed once it elapses.
    pub fn clamp(&self, wait: Duration) -> (Duration, bool) {
        match self.remaining() {
            Some(left) if left < wait => (left, true),
            _ => (wait, false),
        }
    }
}
