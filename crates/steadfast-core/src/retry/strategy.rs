//! Retry strategy configuration

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use super::classifier::{AlwaysRetry, ErrorClassifier};

/// Default total number of attempts
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
/// Default delay before the second attempt
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(1000);
/// Default upper bound on any single delay
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_millis(30_000);
/// Default growth factor per attempt
pub const DEFAULT_MULTIPLIER: f64 = 2.0;
/// Default jitter ratio (±25% of the computed delay)
pub const DEFAULT_JITTER_RATIO: f64 = 0.25;
/// Operation label used when none is given
pub const DEFAULT_OPERATION_NAME: &str = "retry";

/// How an operation is retried
///
/// A strategy is an immutable value: build it once per call site and share it
/// freely between tasks. The executor never modifies a strategy, it works on
/// the copy returned by [`RetryStrategy::normalized`].
///
/// # Example
///
/// ```rust
/// use steadfast_core::retry::{IoErrorClassifier, RetryStrategy};
/// use std::time::Duration;
///
/// let strategy = RetryStrategy::new("discovery-refresh")
///     .with_max_attempts(5)
///     .with_base_delay(Duration::from_millis(200))
///     .with_max_delay(Duration::from_secs(5))
///     .with_classifier(IoErrorClassifier);
///
/// assert_eq!(strategy.max_attempts, 5);
/// assert_eq!(strategy.operation_name, "discovery-refresh");
/// ```
#[derive(Clone)]
pub struct RetryStrategy {
    /// Total attempts including the first
    pub max_attempts: u32,
    /// Delay before the second attempt
    pub base_delay: Duration,
    /// Upper bound on any computed delay
    pub max_delay: Duration,
    /// Growth factor per attempt
    pub multiplier: f64,
    /// Fraction of the delay randomized symmetrically, in `[0, 1)`
    pub jitter_ratio: f64,
    /// Decides which errors are retried
    pub classifier: Arc<dyn ErrorClassifier>,
    /// Label for logs and metrics
    pub operation_name: String,
}

impl Default for RetryStrategy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            multiplier: DEFAULT_MULTIPLIER,
            jitter_ratio: DEFAULT_JITTER_RATIO,
            classifier: Arc::new(AlwaysRetry),
            operation_name: DEFAULT_OPERATION_NAME.to_string(),
        }
    }
}

impl fmt::Debug for RetryStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryStrategy")
            .field("operation_name", &self.operation_name)
            .field("max_attempts", &self.max_attempts)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .field("multiplier", &self.multiplier)
            .field("jitter_ratio", &self.jitter_ratio)
            .field("classifier", &self.classifier.name())
            .finish()
    }
}

impl RetryStrategy {
    /// Create a strategy with default settings for `operation_name`
    pub fn new(operation_name: impl Into<String>) -> Self {
        Self {
            operation_name: operation_name.into(),
            ..Self::default()
        }
    }

    /// Set the total number of attempts
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Set the delay before the second attempt
    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Set the maximum delay
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Set the growth factor
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Set the jitter ratio; `0.0` disables jitter
    pub fn with_jitter_ratio(mut self, jitter_ratio: f64) -> Self {
        self.jitter_ratio = jitter_ratio;
        self
    }

    /// Set the error classifier
    pub fn with_classifier<C>(mut self, classifier: C) -> Self
    where
        C: ErrorClassifier + 'static,
    {
        self.classifier = Arc::new(classifier);
        self
    }

    /// Share an existing classifier
    pub fn with_shared_classifier(mut self, classifier: Arc<dyn ErrorClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    /// Set the operation label
    pub fn with_operation_name(mut self, operation_name: impl Into<String>) -> Self {
        self.operation_name = operation_name.into();
        self
    }

    /// Return a copy with every invalid field replaced by its default
    ///
    /// - `max_attempts == 0` becomes [`DEFAULT_MAX_ATTEMPTS`]
    /// - a zero `base_delay` becomes [`DEFAULT_BASE_DELAY`]
    /// - a zero `max_delay` becomes [`DEFAULT_MAX_DELAY`] (raised to
    ///   `base_delay` if needed); a `max_delay` below `base_delay` is raised
    ///   to `base_delay`
    /// - a `multiplier` below 1.0 or not finite becomes [`DEFAULT_MULTIPLIER`]
    /// - a `jitter_ratio` outside `[0, 1)` becomes [`DEFAULT_JITTER_RATIO`]
    /// - a blank `operation_name` becomes [`DEFAULT_OPERATION_NAME`]
    pub fn normalized(&self) -> Self {
        let mut normalized = self.clone();

        if normalized.max_attempts == 0 {
            normalized.max_attempts = DEFAULT_MAX_ATTEMPTS;
        }

        if normalized.base_delay.is_zero() {
            normalized.base_delay = DEFAULT_BASE_DELAY;
        }

        if normalized.max_delay.is_zero() {
            normalized.max_delay = DEFAULT_MAX_DELAY.max(normalized.base_delay);
        } else if normalized.max_delay < normalized.base_delay {
            normalized.max_delay = normalized.base_delay;
        }

        if !normalized.multiplier.is_finite() || normalized.multiplier < 1.0 {
            normalized.multiplier = DEFAULT_MULTIPLIER;
        }

        if !(0.0..1.0).contains(&normalized.jitter_ratio) {
            normalized.jitter_ratio = DEFAULT_JITTER_RATIO;
        }

        if normalized.operation_name.trim().is_empty() {
            normalized.operation_name = DEFAULT_OPERATION_NAME.to_string();
        }

        normalized
    }

    /// Check whether [`normalized`](Self::normalized) would change anything
    pub fn is_normalized(&self) -> bool {
        self.max_attempts >= 1
            && !self.base_delay.is_zero()
            && self.max_delay >= self.base_delay
            && self.multiplier.is_finite()
            && self.multiplier >= 1.0
            && (0.0..1.0).contains(&self.jitter_ratio)
            && !self.operation_name.trim().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::classifier::NeverRetry;

    #[test]
    fn test_default_strategy() {
        let strategy = RetryStrategy::default();
        assert_eq!(strategy.max_attempts, 3);
        assert_eq!(strategy.base_delay, Duration::from_millis(1000));
        assert_eq!(strategy.max_delay, Duration::from_millis(30_000));
        assert_eq!(strategy.multiplier, 2.0);
        assert_eq!(strategy.jitter_ratio, 0.25);
        assert_eq!(strategy.operation_name, "retry");
        assert!(strategy.is_normalized());
    }

    #[test]
    fn test_normalize_replaces_invalid_fields() {
        let strategy = RetryStrategy::new("  ")
            .with_max_attempts(0)
            .with_base_delay(Duration::ZERO)
            .with_max_delay(Duration::ZERO)
            .with_multiplier(0.5)
            .with_jitter_ratio(1.0);

        let normalized = strategy.normalized();

        assert_eq!(normalized.max_attempts, DEFAULT_MAX_ATTEMPTS);
        assert_eq!(normalized.base_delay, DEFAULT_BASE_DELAY);
        assert_eq!(normalized.max_delay, DEFAULT_MAX_DELAY);
        assert_eq!(normalized.multiplier, DEFAULT_MULTIPLIER);
        assert_eq!(normalized.jitter_ratio, DEFAULT_JITTER_RATIO);
        assert_eq!(normalized.operation_name, DEFAULT_OPERATION_NAME);
        assert!(normalized.is_normalized());
    }

    #[test]
    fn test_normalize_does_not_touch_original() {
        let strategy = RetryStrategy::new("shared").with_max_attempts(0);
        let normalized = strategy.normalized();

        assert_eq!(strategy.max_attempts, 0);
        assert_eq!(normalized.max_attempts, DEFAULT_MAX_ATTEMPTS);
        assert!(!strategy.is_normalized());
    }

    #[test]
    fn test_normalize_raises_max_delay_to_base() {
        let strategy = RetryStrategy::new("op")
            .with_base_delay(Duration::from_secs(5))
            .with_max_delay(Duration::from_secs(1));
        assert_eq!(strategy.normalized().max_delay, Duration::from_secs(5));

        let strategy = RetryStrategy::new("op")
            .with_base_delay(Duration::from_secs(60))
            .with_max_delay(Duration::ZERO);
        assert_eq!(strategy.normalized().max_delay, Duration::from_secs(60));
    }

    #[test]
    fn test_normalize_rejects_nan() {
        let strategy = RetryStrategy::new("op")
            .with_multiplier(f64::NAN)
            .with_jitter_ratio(f64::NAN);
        let normalized = strategy.normalized();

        assert_eq!(normalized.multiplier, DEFAULT_MULTIPLIER);
        assert_eq!(normalized.jitter_ratio, DEFAULT_JITTER_RATIO);
    }

    #[test]
    fn test_normalize_keeps_valid_values() {
        let strategy = RetryStrategy::new("op")
            .with_max_attempts(1)
            .with_base_delay(Duration::from_millis(10))
            .with_max_delay(Duration::from_millis(10))
            .with_multiplier(1.0)
            .with_jitter_ratio(0.0)
            .with_classifier(NeverRetry);
        let normalized = strategy.normalized();

        assert_eq!(normalized.max_attempts, 1);
        assert_eq!(normalized.base_delay, Duration::from_millis(10));
        assert_eq!(normalized.max_delay, Duration::from_millis(10));
        assert_eq!(normalized.multiplier, 1.0);
        assert_eq!(normalized.jitter_ratio, 0.0);
        assert_eq!(normalized.classifier.name(), "never");
    }

    #[test]
    fn test_debug_shows_classifier_name() {
        let debug = format!("{:?}", RetryStrategy::new("fetch"));
        assert!(debug.contains("fetch"));
        assert!(debug.contains("always"));
    }
}
