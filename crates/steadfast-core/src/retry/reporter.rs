//! Attempt outcome reporting
//!
//! An [`OutcomeReporter`] is notified after every attempt the executor makes.
//! Reporters are called synchronously from the retry loop, so they must be
//! cheap: record a counter, emit a log line, and return.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

/// What happened on a single attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutcomeKind {
    /// The operation returned a value
    Success,
    /// The operation failed with a retryable error and a retry is scheduled
    Retry,
    /// The operation failed with a permanent error
    NonRetryable,
    /// The operation failed on the last allowed attempt
    MaxRetries,
    /// The cancellation token fired before or between attempts
    Cancelled,
}

impl OutcomeKind {
    /// All outcome kinds, in reporting order
    pub const ALL: [OutcomeKind; 5] = [
        OutcomeKind::Success,
        OutcomeKind::Retry,
        OutcomeKind::NonRetryable,
        OutcomeKind::MaxRetries,
        OutcomeKind::Cancelled,
    ];

    /// Metric label for this outcome
    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeKind::Success => "success",
            OutcomeKind::Retry => "retry",
            OutcomeKind::NonRetryable => "non_retryable",
            OutcomeKind::MaxRetries => "max_retries",
            OutcomeKind::Cancelled => "cancelled",
        }
    }

    fn index(&self) -> usize {
        match self {
            OutcomeKind::Success => 0,
            OutcomeKind::Retry => 1,
            OutcomeKind::NonRetryable => 2,
            OutcomeKind::MaxRetries => 3,
            OutcomeKind::Cancelled => 4,
        }
    }

    /// Whether this outcome ends the invocation
    pub fn is_terminal(&self) -> bool {
        !matches!(self, OutcomeKind::Retry)
    }
}

impl fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The result of one attempt, as seen by reporters
#[derive(Debug, Clone, PartialEq)]
pub struct AttemptOutcome {
    /// 0-based attempt index
    pub attempt: u32,
    /// Time since the invocation started
    pub elapsed: Duration,
    /// What happened
    pub kind: OutcomeKind,
    /// Delay before the next attempt, when one is scheduled
    pub next_delay: Option<Duration>,
}

impl AttemptOutcome {
    /// 1-based attempt number, as shown to users
    pub fn attempt_number(&self) -> u32 {
        self.attempt.saturating_add(1)
    }
}

/// Receives the outcome of every attempt
///
/// # Example
///
/// ```rust
/// use steadfast_core::retry::{AttemptOutcome, OutcomeReporter};
///
/// struct PrintReporter;
///
/// impl OutcomeReporter for PrintReporter {
///     fn report(&self, operation: &str, outcome: &AttemptOutcome) {
///         println!("{operation}: attempt {} -> {}", outcome.attempt_number(), outcome.kind);
///     }
/// }
/// ```
pub trait OutcomeReporter: Send + Sync {
    /// Called after each attempt, and once when the invocation is cancelled
    fn report(&self, operation: &str, outcome: &AttemptOutcome);
}

/// A reporter that does nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpReporter;

impl OutcomeReporter for NoOpReporter {
    fn report(&self, _operation: &str, _outcome: &AttemptOutcome) {}
}

/// A reporter that logs outcomes using the `tracing` crate
///
/// # Log Levels
///
/// - `success`: INFO after retries, DEBUG on the first attempt
/// - `retry`: DEBUG (the executor already warns with the error)
/// - `non_retryable`, `cancelled`: WARN
/// - `max_retries`: ERROR
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl OutcomeReporter for TracingReporter {
    fn report(&self, operation: &str, outcome: &AttemptOutcome) {
        let attempt = outcome.attempt_number();
        let elapsed_ms = outcome.elapsed.as_millis() as u64;

        match outcome.kind {
            OutcomeKind::Success if attempt > 1 => tracing::info!(
                operation = %operation,
                attempt = attempt,
                elapsed_ms = elapsed_ms,
                outcome = %outcome.kind,
                "succeeded after retry"
            ),
            OutcomeKind::Success => tracing::debug!(
                operation = %operation,
                elapsed_ms = elapsed_ms,
                outcome = %outcome.kind,
                "succeeded on first attempt"
            ),
            OutcomeKind::Retry => tracing::debug!(
                operation = %operation,
                attempt = attempt,
                delay_ms = outcome.next_delay.unwrap_or_default().as_millis() as u64,
                outcome = %outcome.kind,
                "retry scheduled"
            ),
            OutcomeKind::NonRetryable | OutcomeKind::Cancelled => tracing::warn!(
                operation = %operation,
                attempt = attempt,
                elapsed_ms = elapsed_ms,
                outcome = %outcome.kind,
                "retry stopped"
            ),
            OutcomeKind::MaxRetries => tracing::error!(
                operation = %operation,
                attempts = attempt,
                elapsed_ms = elapsed_ms,
                outcome = %outcome.kind,
                "all retry attempts exhausted"
            ),
        }
    }
}

/// Per-operation counters, one per outcome kind
#[derive(Debug, Default)]
pub struct OutcomeCounters {
    counts: [AtomicU64; 5],
}

impl OutcomeCounters {
    /// Current count for `kind`
    pub fn get(&self, kind: OutcomeKind) -> u64 {
        self.counts[kind.index()].load(Ordering::Relaxed)
    }

    fn increment(&self, kind: OutcomeKind) {
        self.counts[kind.index()].fetch_add(1, Ordering::Relaxed);
    }

    /// Sum over every outcome kind
    pub fn total(&self) -> u64 {
        OutcomeKind::ALL.iter().map(|kind| self.get(*kind)).sum()
    }
}

/// A reporter that counts outcomes per operation and kind
///
/// Safe to share between concurrent invocations: the map is only write-locked
/// the first time an operation name is seen, increments are atomic.
#[derive(Debug, Default)]
pub struct CountingReporter {
    operations: RwLock<HashMap<String, Arc<OutcomeCounters>>>,
}

impl CountingReporter {
    /// Create an empty reporter
    pub fn new() -> Self {
        Self::default()
    }

    /// Counters for `operation`, created on first use
    pub fn counters(&self, operation: &str) -> Arc<OutcomeCounters> {
        if let Some(counters) = self
            .operations
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(operation)
        {
            return Arc::clone(counters);
        }

        let mut operations = self.operations.write().unwrap_or_else(|e| e.into_inner());
        Arc::clone(operations.entry(operation.to_string()).or_default())
    }

    /// Number of `kind` outcomes recorded for `operation`
    pub fn count(&self, operation: &str, kind: OutcomeKind) -> u64 {
        self.operations
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(operation)
            .map(|counters| counters.get(kind))
            .unwrap_or(0)
    }

    /// Copy of every non-zero counter, keyed by operation and kind
    pub fn snapshot(&self) -> HashMap<(String, OutcomeKind), u64> {
        let operations = self.operations.read().unwrap_or_else(|e| e.into_inner());
        let mut snapshot = HashMap::new();

        for (operation, counters) in operations.iter() {
            for kind in OutcomeKind::ALL {
                let count = counters.get(kind);
                if count > 0 {
                    snapshot.insert((operation.clone(), kind), count);
                }
            }
        }

        snapshot
    }
}

impl OutcomeReporter for CountingReporter {
    fn report(&self, operation: &str, outcome: &AttemptOutcome) {
        self.counters(operation).increment(outcome.kind);
    }
}

impl<T: OutcomeReporter + ?Sized> OutcomeReporter for Arc<T> {
    fn report(&self, operation: &str, outcome: &AttemptOutcome) {
        (**self).report(operation, outcome)
    }
}

impl<T: OutcomeReporter + ?Sized> OutcomeReporter for Box<T> {
    fn report(&self, operation: &str, outcome: &AttemptOutcome) {
        (**self).report(operation, outcome)
    }
}

impl<T: OutcomeReporter + ?Sized> OutcomeReporter for &T {
    fn report(&self, operation: &str, outcome: &AttemptOutcome) {
        (**self).report(operation, outcome)
    }
}

/// Fan out to two reporters, in order
impl<A: OutcomeReporter, B: OutcomeReporter> OutcomeReporter for (A, B) {
    fn report(&self, operation: &str, outcome: &AttemptOutcome) {
        self.0.report(operation, outcome);
        self.1.report(operation, outcome);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(attempt: u32, kind: OutcomeKind) -> AttemptOutcome {
        AttemptOutcome {
            attempt,
            elapsed: Duration::from_millis(5),
            kind,
            next_delay: None,
        }
    }

    #[test]
    fn test_outcome_labels() {
        let labels: Vec<&str> = OutcomeKind::ALL.iter().map(|k| k.as_str()).collect();
        assert_eq!(
            labels,
            vec!["success", "retry", "non_retryable", "max_retries", "cancelled"]
        );
        assert!(!OutcomeKind::Retry.is_terminal());
        assert!(OutcomeKind::MaxRetries.is_terminal());
    }

    #[test]
    fn test_attempt_number_is_one_based() {
        assert_eq!(outcome(0, OutcomeKind::Success).attempt_number(), 1);
        assert_eq!(outcome(4, OutcomeKind::Retry).attempt_number(), 5);
    }

    #[test]
    fn test_noop_and_tracing_reporters() {
        NoOpReporter.report("op", &outcome(0, OutcomeKind::Success));
        for kind in OutcomeKind::ALL {
            TracingReporter.report("op", &outcome(1, kind));
        }
    }

    #[test]
    fn test_counting_reporter() {
        let reporter = CountingReporter::new();

        reporter.report("fetch", &outcome(0, OutcomeKind::Retry));
        reporter.report("fetch", &outcome(1, OutcomeKind::Retry));
        reporter.report("fetch", &outcome(2, OutcomeKind::MaxRetries));
        reporter.report("store", &outcome(0, OutcomeKind::Success));

        assert_eq!(reporter.count("fetch", OutcomeKind::Retry), 2);
        assert_eq!(reporter.count("fetch", OutcomeKind::MaxRetries), 1);
        assert_eq!(reporter.count("fetch", OutcomeKind::Success), 0);
        assert_eq!(reporter.count("store", OutcomeKind::Success), 1);
        assert_eq!(reporter.count("unknown", OutcomeKind::Success), 0);
        assert_eq!(reporter.counters("fetch").total(), 3);

        let snapshot = reporter.snapshot();
        assert_eq!(snapshot.len(), 3);
        assert_eq!(
            snapshot.get(&("fetch".to_string(), OutcomeKind::Retry)),
            Some(&2)
        );
    }

    #[test]
    fn test_counting_reporter_across_threads() {
        let reporter = Arc::new(CountingReporter::new());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let reporter = Arc::clone(&reporter);
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        reporter.report("shared", &outcome(0, OutcomeKind::Retry));
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(reporter.count("shared", OutcomeKind::Retry), 8000);
    }

    #[test]
    fn test_pair_reporter_fans_out() {
        let first = CountingReporter::new();
        let second = CountingReporter::new();
        let pair = (&first, &second);

        pair.report("op", &outcome(0, OutcomeKind::Cancelled));

        assert_eq!(first.count("op", OutcomeKind::Cancelled), 1);
        assert_eq!(second.count("op", OutcomeKind::Cancelled), 1);
    }
}
