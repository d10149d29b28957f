//! Backoff delay calculation and jitter sources

use std::fmt;
use std::sync::Mutex;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::strategy::RetryStrategy;

/// Source of the random offset applied to a backoff delay
///
/// Implementations return a value in `[low, high]`. The executor holds one
/// source for all of its invocations, so implementations must be shareable.
pub trait JitterSource: Send + Sync {
    /// Draw a value uniformly from `[low, high]`
    fn sample(&self, low: f64, high: f64) -> f64;
}

/// Jitter drawn from the thread-local RNG
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadRngJitter;

impl JitterSource for ThreadRngJitter {
    fn sample(&self, low: f64, high: f64) -> f64 {
        if high <= low {
            return low;
        }
        rand::rng().random_range(low..=high)
    }
}

/// Reproducible jitter from a seeded RNG
pub struct SeededJitter {
    rng: Mutex<StdRng>,
}

impl SeededJitter {
    /// Create a jitter source seeded with `seed`
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl fmt::Debug for SeededJitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SeededJitter").finish_non_exhaustive()
    }
}

impl JitterSource for SeededJitter {
    fn sample(&self, low: f64, high: f64) -> f64 {
        if high <= low {
            return low;
        }
        // A poisoned lock still holds a usable RNG
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        rng.random_range(low..=high)
    }
}

/// Always returns the same relative position in the range
///
/// `0.0` yields the lower bound, `1.0` the upper bound and `0.5` the midpoint.
#[derive(Debug, Clone, Copy)]
pub struct FixedJitter(pub f64);

impl JitterSource for FixedJitter {
    fn sample(&self, low: f64, high: f64) -> f64 {
        let position = self.0.clamp(0.0, 1.0);
        low + (high - low) * position
    }
}

/// Calculate the delay to wait after attempt `attempt` fails
///
/// `attempt` is 0-based: attempt 0 is the gap between the first and second
/// try. The delay is `base_delay * multiplier^attempt`, capped at
/// `max_delay`, then shifted by a random offset of up to
/// `±capped * jitter_ratio` and clamped at zero.
///
/// # Example
///
/// ```rust
/// use steadfast_core::retry::{calculate_delay, RetryStrategy, ThreadRngJitter};
/// use std::time::Duration;
///
/// let strategy = RetryStrategy::new("fetch")
///     .with_base_delay(Duration::from_millis(100))
///     .with_max_delay(Duration::from_millis(1000))
///     .with_multiplier(2.0)
///     .with_jitter_ratio(0.0);
///
/// assert_eq!(calculate_delay(0, &strategy, &ThreadRngJitter), Duration::from_millis(100));
/// assert_eq!(calculate_delay(3, &strategy, &ThreadRngJitter), Duration::from_millis(800));
/// assert_eq!(calculate_delay(4, &strategy, &ThreadRngJitter), Duration::from_millis(1000));
/// ```
pub fn calculate_delay(
    attempt: u32,
    strategy: &RetryStrategy,
    jitter: &dyn JitterSource,
) -> Duration {
    let base_nanos = strategy.base_delay.as_nanos() as f64;
    let max_nanos = strategy.max_delay.as_nanos() as f64;

    // powi takes i32; clamp so huge attempt counts saturate instead of wrapping
    let exponent = attempt.min(i32::MAX as u32) as i32;
    let factor = strategy.multiplier.powi(exponent);
    let raw = base_nanos * factor;

    // Reaching the cap yields max_delay itself, not its f64 image
    let capped = if factor == 1.0 {
        strategy.base_delay.min(strategy.max_delay)
    } else if !raw.is_finite() || raw >= max_nanos {
        strategy.max_delay
    } else {
        nanos_to_duration(raw).min(strategy.max_delay)
    };

    if strategy.jitter_ratio.is_nan() || strategy.jitter_ratio <= 0.0 || capped.is_zero() {
        return capped;
    }

    let spread = capped.as_nanos() as f64 * strategy.jitter_ratio;
    let offset = jitter.sample(-spread, spread);
    let shift = nanos_to_duration(offset.abs());
    if offset >= 0.0 {
        capped.saturating_add(shift)
    } else {
        capped.saturating_sub(shift)
    }
}

/// Delays for every gap of an invocation under `strategy`
///
/// Returns `max_attempts - 1` values: the wait after attempt 0, 1, ...
pub fn delay_schedule(strategy: &RetryStrategy, jitter: &dyn JitterSource) -> Vec<Duration> {
    (0..strategy.max_attempts.saturating_sub(1))
        .map(|attempt| calculate_delay(attempt, strategy, jitter))
        .collect()
}

fn nanos_to_duration(nanos: f64) -> Duration {
    if nanos.is_nan() || nanos <= 0.0 {
        Duration::ZERO
    } else if nanos < u64::MAX as f64 {
        Duration::from_nanos(nanos.round() as u64)
    } else {
        Duration::try_from_secs_f64(nanos / 1e9).unwrap_or(Duration::MAX)
    }
}
