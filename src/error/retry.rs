/// Bounded retry with exponential backoff
///
/// An operation is attempted up to `max_attempts` times. After failed attempt
/// `k` (0-based) the policy waits `base_delay * 2^k`, so `max_attempts`
/// attempts produce exactly `max_attempts - 1` waits. Non-retriable errors
/// propagate at once, and every wait is cut short by the operation deadline.
use super::classification::Classify;
use super::deadline::Deadline;
use std::fmt;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use thiserror::Error;

/// Default attempts for ledger writes
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default base delay (one time unit)
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Blocking wait used between attempts. Injected so tests can observe delays
/// without actually sleeping.
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            thread::sleep(duration);
        }
    }
}

/// Per-call retry bookkeeping, handed to the operation on each attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryState {
    /// 0-based attempt counter
    pub attempt: u32,
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryState {
    pub fn is_last(&self) -> bool {
        self.attempt + 1 >= self.max_attempts
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RetryError<E> {
    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: E },

    #[error("non-retriable failure on attempt {}: {error}", .attempt + 1)]
    NonRetriable { attempt: u32, error: E },

    #[error("deadline reached after {attempts} attempts")]
    TimedOut { attempts: u32, last: Option<E> },
}

impl<E> RetryError<E> {
    /// The underlying error of the final attempt, if one ran.
    pub fn last_error(&self) -> Option<&E> {
        match self {
            RetryError::Exhausted { last, .. } => Some(last),
            RetryError::NonRetriable { error, .. } => Some(error),
            RetryError::TimedOut { last, .. } => last.as_ref(),
        }
    }
}

/// Exponential backoff retry policy
#[derive(Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Option<Duration>,
    sleeper: Arc<dyn Sleeper>,
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .finish()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS, DEFAULT_BASE_DELAY)
    }
}

impl RetryPolicy {
    /// At least one attempt is always made.
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay: None,
            sleeper: Arc::new(ThreadSleeper),
        }
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Cap individual delays
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = Some(max_delay);
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    /// Wait that follows failed attempt `attempt`: base * 2^attempt
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponential = 2_u32
            .checked_pow(attempt)
            .and_then(|factor| self.base_delay.checked_mul(factor))
            .unwrap_or(Duration::MAX);

        match self.max_delay {
            Some(cap) => exponential.min(cap),
            None => exponential,
        }
    }

    /// All waits for a run that fails every attempt.
    pub fn schedule(&self) -> Vec<Duration> {
        (0..self.max_attempts - 1)
            .map(|attempt| self.delay_after(attempt))
            .collect()
    }

    pub fn total_delay(&self) -> Duration {
        self.schedule()
            .into_iter()
            .fold(Duration::ZERO, |acc, d| acc.saturating_add(d))
    }

    /// Run `operation` under this policy.
    ///
    /// The deadline is checked before each attempt and after each failure; a
    /// wait that would outlive it sleeps only the remaining time and then
    /// reports `TimedOut` without trying again.
    pub fn execute<T, E, F>(&self, deadline: &Deadline, mut operation: F) -> Result<T, RetryError<E>>
    where
        E: Classify + fmt::Display,
        F: FnMut(RetryState) -> Result<T, E>,
    {
        let mut last: Option<E> = None;
        let mut attempt = 0;

        loop {
            if deadline.is_expired() {
                return Err(RetryError::TimedOut {
                    attempts: attempt,
                    last,
                });
            }

            let state = RetryState {
                attempt,
                max_attempts: self.max_attempts,
                base_delay: self.base_delay,
            };

            let error = match operation(state) {
                Ok(value) => {
                    if attempt > 0 {
                        tracing::info!(attempts = attempt + 1, "Operation succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(error) => error,
            };

            let class = error.class();
            if !class.allows_retry() {
                tracing::warn!(
                    attempt = attempt + 1,
                    class = %class,
                    reason = class.description(),
                    error = %error,
                    "Non-retriable failure, not retrying"
                );
                return Err(RetryError::NonRetriable { attempt, error });
            }

            if deadline.is_expired() {
                return Err(RetryError::TimedOut {
                    attempts: attempt + 1,
                    last: Some(error),
                });
            }

            if state.is_last() {
                tracing::warn!(
                    attempts = self.max_attempts,
                    error = %error,
                    "Retry attempts exhausted"
                );
                return Err(RetryError::Exhausted {
                    attempts: self.max_attempts,
                    last: error,
                });
            }

            let delay = self.delay_after(attempt);
            tracing::warn!(
                attempt = attempt + 1,
                max_attempts = self.max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Attempt failed, backing off"
            );

            let (wait, cut_short) = deadline.clamp(delay);
            self.sleeper.sleep(wait);
            if cut_short {
                return Err(RetryError::TimedOut {
                    attempts: attempt + 1,
                    last: Some(error),
                });
            }

            last = Some(error);
            attempt += 1;
        }
    }
}
