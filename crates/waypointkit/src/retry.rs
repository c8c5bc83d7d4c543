//! Retry logic with exponential backoff for transient errors, and the
//! polling schedule used to wait for the API to catch up.

use crate::cancel::CancelToken;
use crate::error::{Error, Result, Step};
use crate::types::ResourceKind;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Retry configuration for remote calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first
    pub max_attempts: u32,
    /// Delay before the first retry
    #[serde(with = "millis")]
    pub base_delay: Duration,
    /// Multiplier applied to the delay after each retry
    pub backoff_factor: f64,
    /// Upper bound for a single delay
    #[serde(with = "millis")]
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            backoff_factor: 2.0,
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryConfig {
    /// A single attempt.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    /// Delay before retrying after `attempt` (0-indexed) failed.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        backoff(self.base_delay, self.backoff_factor, self.max_delay, attempt)
    }
}

/// Bounded polling schedule for existence checks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Patience {
    /// Maximum number of checks
    pub max_attempts: u32,
    /// Delay between checks
    #[serde(with = "millis")]
    pub delay: Duration,
    /// Multiplier applied to the delay after each check
    pub backoff_factor: f64,
    /// Upper bound for a single delay
    #[serde(with = "millis")]
    pub max_delay: Duration,
}

impl Default for Patience {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            delay: Duration::from_secs(2),
            backoff_factor: 1.0,
            max_delay: Duration::from_secs(30),
        }
    }
}

impl Patience {
    /// Fixed delay between a bounded number of checks.
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
            backoff_factor: 1.0,
            max_delay: delay,
        }
    }

    /// Delay after check `attempt` (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        backoff(self.delay, self.backoff_factor, self.max_delay, attempt)
    }
}

fn backoff(base: Duration, factor: f64, max: Duration, attempt: u32) -> Duration {
    let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
    let secs = base.as_secs_f64() * factor.max(1.0).powi(exponent);
    if !secs.is_finite() || secs >= max.as_secs_f64() {
        return max;
    }
    Duration::from_secs_f64(secs)
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

/// The remote call being retried.
#[derive(Debug, Clone, Copy)]
pub struct CallSite<'a> {
    pub kind: ResourceKind,
    /// Entity name for creates, ID otherwise
    pub name: &'a str,
    pub step: Step,
}

impl<'a> CallSite<'a> {
    pub fn new(kind: ResourceKind, name: &'a str, step: Step) -> Self {
        Self { kind, name, step }
    }

    /// The error reported when the caller cancels this call.
    pub fn cancelled(&self) -> Error {
        Error::Cancelled {
            kind: self.kind,
            name: self.name.to_string(),
            step: self.step,
        }
    }
}

/// Callback trait for retry progress notifications.
pub trait RetryCallback: Send + Sync {
    /// Called before sleeping ahead of the next attempt.
    ///
    /// # Arguments
    /// * `site` - The call being retried
    /// * `attempt` - Attempt that just failed (1-indexed)
    /// * `max_attempts` - Maximum number of attempts
    /// * `error` - The error that triggered the retry
    /// * `delay` - Time until the next attempt
    fn on_retry(&self, site: &CallSite<'_>, attempt: u32, max_attempts: u32, error: &Error, delay: Duration);
}

/// No-op callback that does nothing.
pub struct NoCallback;

impl RetryCallback for NoCallback {
    fn on_retry(&self, _site: &CallSite<'_>, _attempt: u32, _max_attempts: u32, _error: &Error, _delay: Duration) {}
}

/// Execute an operation with retry logic.
///
/// Only transient errors are retried; everything else is returned at once.
/// Waits between attempts end early when `cancel` fires, in which case
/// [`Error::Cancelled`] is returned.
pub fn with_retry<T, F>(
    config: &RetryConfig,
    cancel: &CancelToken,
    callback: &dyn RetryCallback,
    site: CallSite<'_>,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Result<T>,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        if cancel.is_cancelled() {
            return Err(site.cancelled());
        }

        let err = match operation() {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        if !err.is_retryable() || attempt + 1 >= max_attempts {
            return Err(err);
        }

        let delay = config.delay_for_attempt(attempt);
        log::warn!(
            "{} {:?}: attempt {}/{} failed: {}; retrying in {:?}",
            site.kind,
            site.name,
            attempt + 1,
            max_attempts,
            err,
            delay
        );
        callback.on_retry(&site, attempt + 1, max_attempts, &err, delay);

        if !cancel.sleep(delay) {
            return Err(site.cancelled());
        }
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCategory;
    use std::cell::Cell;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast() -> RetryConfig {
        RetryConfig {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            backoff_factor: 1.0,
            max_delay: Duration::from_millis(10),
        }
    }

    fn transient() -> Error {
        Error::Transient {
            kind: ResourceKind::Template,
            name: "tpl-1".to_string(),
            step: Step::Get,
            message: "timeout".to_string(),
        }
    }

    fn site() -> CallSite<'static> {
        CallSite::new(ResourceKind::Template, "tpl-1", Step::Get)
    }

    #[test]
    fn test_with_retry_success_first_try() {
        let result = with_retry(&RetryConfig::no_retry(), &CancelToken::new(), &NoCallback, site(), || {
            Ok::<_, Error>(42)
        });
        assert_eq!(result.unwrap(), 42);
    }

    #[test]
    fn test_with_retry_non_retryable_error() {
        let attempts = Cell::new(0);
        let result: Result<()> = with_retry(&fast(), &CancelToken::new(), &NoCallback, site(), || {
            attempts.set(attempts.get() + 1);
            Err(Error::NotFound {
                kind: ResourceKind::Template,
                id: "tpl-1".to_string(),
            })
        });

        assert!(result.unwrap_err().is_not_found());
        assert_eq!(attempts.get(), 1);
    }

    #[test]
    fn test_with_retry_eventual_success() {
        let attempts = Cell::new(0);
        let result = with_retry(&fast(), &CancelToken::new(), &NoCallback, site(), || {
            let current = attempts.get();
            attempts.set(current + 1);
            if current < 2 { Err(transient()) } else { Ok("done") }
        });

        assert_eq!(result.unwrap(), "done");
        assert_eq!(attempts.get(), 3);
    }

    #[test]
    fn test_with_retry_exhausted() {
        let attempts = Cell::new(0);
        let result: Result<()> = with_retry(&fast(), &CancelToken::new(), &NoCallback, site(), || {
            attempts.set(attempts.get() + 1);
            Err(transient())
        });

        assert_eq!(result.unwrap_err().category(), ErrorCategory::Transient);
        assert_eq!(attempts.get(), 3);
    }

    #[test]
    fn test_callback_sees_each_retry() {
        struct Counter(AtomicU32);
        impl RetryCallback for Counter {
            fn on_retry(&self, _site: &CallSite<'_>, _attempt: u32, _max: u32, _error: &Error, _delay: Duration) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let counter = Counter(AtomicU32::new(0));
        let _: Result<()> = with_retry(&fast(), &CancelToken::new(), &counter, site(), || Err(transient()));
        assert_eq!(counter.0.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_cancel_stops_retrying() {
        let cancel = CancelToken::new();
        let config = RetryConfig {
            max_attempts: 5,
            base_delay: Duration::from_secs(60),
            ..Default::default()
        };
        let attempts = Cell::new(0);
        let result: Result<()> = with_retry(&config, &cancel, &NoCallback, site(), || {
            attempts.set(attempts.get() + 1);
            cancel.cancel();
            Err(transient())
        });

        assert_eq!(result.unwrap_err().category(), ErrorCategory::Cancelled);
        assert_eq!(attempts.get(), 1);
    }

    #[test]
    fn test_delay_growth_is_capped() {
        let config = RetryConfig::default();
        assert_eq!(config.delay_for_attempt(0), Duration::from_millis(500));
        assert_eq!(config.delay_for_attempt(1), Duration::from_secs(1));
        assert_eq!(config.delay_for_attempt(10), Duration::from_secs(10));

        let patience = Patience::new(4, Duration::from_millis(250));
        assert_eq!(patience.delay_for_attempt(3), Duration::from_millis(250));
    }
}
