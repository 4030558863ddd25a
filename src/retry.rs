//! Retry policies and predicates for handling transient failures.
//!
//! A [`RetryPolicy`] answers two questions for the error-handling routine:
//! whether attempt `n` (0-indexed) should be followed by another one, and how
//! long to wait first. Which failures qualify is decided by an optional
//! [`RetryPredicate`]; without one every HTTP error and network failure
//! qualifies until the attempt budget runs out.

use crate::response::FetchResponse;
use http::StatusCode;
use rand::Rng;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Defines when and how to retry failed calls.
///
/// # Examples
///
/// ```
/// use fetchling::RetryPolicy;
/// use std::time::Duration;
///
/// // Linear: 3 retries, 1s apart
/// let linear = RetryPolicy::linear(3, Duration::from_secs(1));
///
/// // Exponential: 100ms, 200ms, 400ms... capped at 10s, only on 502/503
/// let exponential = RetryPolicy::exponential(
///     5,
///     Duration::from_millis(100),
///     Duration::from_secs(10),
/// )
/// .retry_on_status([502, 503]);
///
/// // Sugar: 2 retries with no delay
/// let quick = RetryPolicy::from(2);
/// # let _ = (linear, exponential, quick);
/// ```
#[derive(Clone)]
pub enum RetryPolicy {
    /// Retry up to `count` times with a fixed delay.
    Linear {
        /// The maximum number of retries.
        count: usize,
        /// The delay before every retry.
        interval: Duration,
        /// Restricts which failures are retried.
        predicate: Option<Arc<dyn RetryPredicate>>,
    },

    /// Retry with exponentially increasing delays.
    ///
    /// Retry `n` waits for `base_delay * factor^n`, capped at `max_delay`.
    Exponential {
        /// The maximum number of retries.
        max_attempts: usize,
        /// The delay before the first retry.
        base_delay: Duration,
        /// The upper bound for any delay.
        max_delay: Duration,
        /// The backoff multiplier.
        factor: f64,
        /// Whether to scale each delay by a random factor in `[0.5, 1.0]`.
        jitter: bool,
        /// Restricts which failures are retried.
        predicate: Option<Arc<dyn RetryPredicate>>,
    },
}

impl RetryPolicy {
    /// Creates a linear policy.
    pub fn linear(count: usize, interval: Duration) -> Self {
        RetryPolicy::Linear {
            count,
            interval,
            predicate: None,
        }
    }

    /// Creates an exponential policy with a factor of 2 and no jitter.
    pub fn exponential(max_attempts: usize, base_delay: Duration, max_delay: Duration) -> Self {
        RetryPolicy::Exponential {
            max_attempts,
            base_delay,
            max_delay,
            factor: 2.0,
            jitter: false,
            predicate: None,
        }
    }

    /// Sets the backoff multiplier. Has no effect on linear policies.
    pub fn with_factor(mut self, value: f64) -> Self {
        if let RetryPolicy::Exponential { factor, .. } = &mut self {
            *factor = value;
        }
        self
    }

    /// Enables or disables jitter. Has no effect on linear policies.
    pub fn with_jitter(mut self, enabled: bool) -> Self {
        if let RetryPolicy::Exponential { jitter, .. } = &mut self {
            *jitter = enabled;
        }
        self
    }

    /// Only retries responses whose status is in `statuses`.
    ///
    /// Network failures, which have no response, remain retryable.
    pub fn retry_on_status(self, statuses: impl IntoIterator<Item = u16>) -> Self {
        self.retry_if(RetryOnStatus::new(statuses))
    }

    /// Sets a custom retry predicate, replacing any previous one.
    pub fn retry_if(mut self, retry_predicate: impl RetryPredicate + 'static) -> Self {
        let slot = match &mut self {
            RetryPolicy::Linear { predicate, .. } => predicate,
            RetryPolicy::Exponential { predicate, .. } => predicate,
        };
        *slot = Some(Arc::new(retry_predicate));
        self
    }

    /// Returns the maximum number of retries.
    pub fn max_retries(&self) -> usize {
        match self {
            RetryPolicy::Linear { count, .. } => *count,
            RetryPolicy::Exponential { max_attempts, .. } => *max_attempts,
        }
    }

    /// Returns `true` if the failure of attempt `attempt` (0-indexed) should
    /// be followed by another attempt.
    ///
    /// `response` is `None` when the failure happened at the network level.
    pub fn should_attempt_retry(&self, attempt: usize, response: Option<&FetchResponse>) -> bool {
        if attempt >= self.max_retries() {
            return false;
        }

        let predicate = match self {
            RetryPolicy::Linear { predicate, .. } => predicate,
            RetryPolicy::Exponential { predicate, .. } => predicate,
        };

        predicate
            .as_ref()
            .map_or(true, |p| p.should_retry(response, attempt))
    }

    /// Returns the delay to wait after the failure of attempt `attempt`.
    pub fn delay(&self, attempt: usize) -> Duration {
        match self {
            RetryPolicy::Linear { interval, .. } => *interval,
            RetryPolicy::Exponential {
                base_delay,
                max_delay,
                factor,
                jitter,
                ..
            } => {
                let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
                let nanos = base_delay.as_nanos() as f64 * factor.powi(exponent);

                let delay = if !nanos.is_finite() || nanos >= max_delay.as_nanos() as f64 {
                    *max_delay
                } else {
                    Duration::from_nanos(nanos.max(0.0).round() as u64)
                };

                if *jitter {
                    let jitter_factor = rand::thread_rng().gen_range(0.5..=1.0);
                    delay.mul_f64(jitter_factor)
                } else {
                    delay
                }
            }
        }
    }
}

impl From<usize> for RetryPolicy {
    fn from(count: usize) -> Self {
        RetryPolicy::linear(count, Duration::ZERO)
    }
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetryPolicy::Linear {
                count,
                interval,
                predicate,
            } => f
                .debug_struct("Linear")
                .field("count", count)
                .field("interval", interval)
                .field("predicate", &predicate.is_some())
                .finish(),
            RetryPolicy::Exponential {
                max_attempts,
                base_delay,
                max_delay,
                factor,
                jitter,
                predicate,
            } => f
                .debug_struct("Exponential")
                .field("max_attempts", max_attempts)
                .field("base_delay", base_delay)
                .field("max_delay", max_delay)
                .field("factor", factor)
                .field("jitter", jitter)
                .field("predicate", &predicate.is_some())
                .finish(),
        }
    }
}

/// Trait for deciding whether a failed attempt qualifies for a retry.
///
/// The attempt budget is enforced by [`RetryPolicy`]; predicates only judge
/// the failure itself.
///
/// # Examples
///
/// ```
/// use fetchling::{FetchResponse, RetryPredicate};
///
/// struct RetryOnRateLimit;
///
/// impl RetryPredicate for RetryOnRateLimit {
///     fn should_retry(&self, response: Option<&FetchResponse>, _attempt: usize) -> bool {
///         response.is_some_and(|r| r.status().as_u16() == 429)
///     }
/// }
/// ```
pub trait RetryPredicate: Send + Sync {
    /// Determines whether the failure should be retried.
    ///
    /// # Arguments
    ///
    /// * `response` - The failed response, or `None` for network failures
    /// * `attempt` - The attempt that failed (0-indexed)
    fn should_retry(&self, response: Option<&FetchResponse>, attempt: usize) -> bool;
}

/// Retry only responses with one of the listed statuses.
///
/// Network failures are always retried.
#[derive(Debug, Clone)]
pub struct RetryOnStatus {
    statuses: Vec<u16>,
}

impl RetryOnStatus {
    /// Creates a predicate from an allow-list of status codes.
    pub fn new(statuses: impl IntoIterator<Item = u16>) -> Self {
        Self {
            statuses: statuses.into_iter().collect(),
        }
    }
}

impl RetryPredicate for RetryOnStatus {
    fn should_retry(&self, response: Option<&FetchResponse>, _attempt: usize) -> bool {
        match response {
            Some(response) => self.statuses.contains(&response.status().as_u16()),
            None => true,
        }
    }
}

/// Retry only on 5xx server errors and 429.
#[derive(Debug, Clone, Copy)]
pub struct RetryOn5xx;

impl RetryPredicate for RetryOn5xx {
    fn should_retry(&self, response: Option<&FetchResponse>, _attempt: usize) -> bool {
        response.is_some_and(|r| {
            r.status().is_server_error() || r.status() == StatusCode::TOO_MANY_REQUESTS
        })
    }
}

/// Retry only on network-level failures.
#[derive(Debug, Clone, Copy)]
pub struct RetryOnNetworkError;

impl RetryPredicate for RetryOnNetworkError {
    fn should_retry(&self, response: Option<&FetchResponse>, _attempt: usize) -> bool {
        response.is_none()
    }
}

/// Combine multiple retry predicates with OR logic.
///
/// # Examples
///
/// ```
/// use fetchling::retry::{OrPredicate, RetryOn5xx, RetryOnNetworkError};
///
/// let predicate = OrPredicate::new(vec![
///     Box::new(RetryOn5xx),
///     Box::new(RetryOnNetworkError),
/// ]);
/// # let _ = predicate;
/// ```
pub struct OrPredicate {
    predicates: Vec<Box<dyn RetryPredicate>>,
}

impl OrPredicate {
    /// Creates a new `OrPredicate` from a list of predicates.
    pub fn new(predicates: Vec<Box<dyn RetryPredicate>>) -> Self {
        Self { predicates }
    }
}

impl RetryPredicate for OrPredicate {
    fn should_retry(&self, response: Option<&FetchResponse>, attempt: usize) -> bool {
        self.predicates
            .iter()
            .any(|p| p.should_retry(response, attempt))
    }
}

/// Combine multiple retry predicates with AND logic.
pub struct AndPredicate {
    predicates: Vec<Box<dyn RetryPredicate>>,
}

impl AndPredicate {
    /// Creates a new `AndPredicate` from a list of predicates.
    pub fn new(predicates: Vec<Box<dyn RetryPredicate>>) -> Self {
        Self { predicates }
    }
}

impl RetryPredicate for AndPredicate {
    fn should_retry(&self, response: Option<&FetchResponse>, attempt: usize) -> bool {
        self.predicates
            .iter()
            .all(|p| p.should_retry(response, attempt))
    }
}
