//! Bounded retry with a fixed delay between attempts.

#[cfg(any(test, feature = "test-util"))]
use std::cell::RefCell;
use std::time::Duration;

/// Source of waiting, swapped out in tests so retries run instantly
pub trait Sleeper {
    fn sleep(&self, delay: Duration);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, delay: Duration) {
        std::thread::sleep(delay);
    }
}

/// Records requested delays instead of sleeping
#[cfg(any(test, feature = "test-util"))]
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    slept: RefCell<Vec<Duration>>,
}

#[cfg(any(test, feature = "test-util"))]
impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delays(&self) -> Vec<Duration> {
        self.slept.borrow().clone()
    }
}

#[cfg(any(test, feature = "test-util"))]
impl Sleeper for RecordingSleeper {
    fn sleep(&self, delay: Duration) {
        self.slept.borrow_mut().push(delay);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(1),
        }
    }
}

/// Why [`retry`] gave up
#[derive(Debug, PartialEq, Eq)]
pub enum RetryError<E> {
    /// `is_retryable` rejected the error; returned untouched
    Fatal(E),
    /// Every attempt failed; carries the last error
    Exhausted { attempts: u32, last: E },
}

/// Run `op` up to `policy.max_attempts` times (at least once).
///
/// `delay_for(attempt)` gives the wait after the 1-based failed `attempt`;
/// no wait follows the final attempt. Errors for which `is_retryable`
/// returns false end the loop immediately.
pub fn retry<T, E>(
    policy: RetryPolicy,
    sleeper: &dyn Sleeper,
    delay_for: impl Fn(u32) -> Duration,
    is_retryable: impl Fn(&E) -> bool,
    mut op: impl FnMut(u32) -> Result<T, E>,
) -> Result<T, RetryError<E>> {
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match op(attempt) {
            Ok(value) => return Ok(value),
            Err(err) if !is_retryable(&err) => return Err(RetryError::Fatal(err)),
            Err(err) if attempt >= attempts => {
                return Err(RetryError::Exhausted {
                    attempts: attempt,
                    last: err,
                })
            }
            Err(_) => {
                sleeper.sleep(delay_for(attempt));
                attempt += 1;
            }
        }
    }
}

/// [`retry`] with the policy's fixed delay
pub fn retry_fixed<T, E>(
    policy: RetryPolicy,
    sleeper: &dyn Sleeper,
    is_retryable: impl Fn(&E) -> bool,
    op: impl FnMut(u32) -> Result<T, E>,
) -> Result<T, RetryError<E>> {
    retry(policy, sleeper, |_| policy.delay, is_retryable, op)
}
