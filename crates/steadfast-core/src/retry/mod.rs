//! Retry execution engine
//!
//! This module wraps a fallible, idempotent async operation and re-executes it
//! under an exponential-backoff-with-jitter strategy.
//!
//! # Features
//!
//! - Exponential backoff capped at a maximum delay
//! - Symmetric jitter from a replaceable randomness source
//! - Pluggable error classification via the `ErrorClassifier` trait
//! - Cancellation before every attempt and during every wait, with deadlines
//!   reported apart from plain cancellation
//! - Observable attempts via the `OutcomeReporter` trait
//! - Strategies are immutable values, safe to share across tasks
//!
//! # Example
//!
//! ```rust,no_run
//! use steadfast_core::retry::{retry, IoErrorClassifier, RetryStrategy, TerminalError};
//! use tokio_util::sync::CancellationToken;
//!
//! async fn example() -> Result<String, TerminalError<std::io::Error>> {
//!     let strategy = RetryStrategy::new("read-manifest").with_classifier(IoErrorClassifier);
//!     let cancel = CancellationToken::new();
//!
//!     retry(&strategy, &cancel, || async {
//!         tokio::fs::read_to_string("manifest.yaml").await
//!     })
//!     .await
//! }
//! ```

mod classifier;
mod delay;
mod error;
mod executor;
mod reporter;
mod strategy;

pub use classifier::{
    AlwaysRetry, ErrorClassifier, FnClassifier, HttpStatusClassifier, HttpStatusError,
    IoErrorClassifier, MessageClassifier, NeverRetry,
};
pub use delay::{
    calculate_delay, delay_schedule, FixedJitter, JitterSource, SeededJitter, ThreadRngJitter,
};
pub use error::{CancelCause, FailureKind, TerminalError};
pub use executor::{retry, Deadline, RetryExecutor, RetryExecutorBuilder};
pub use reporter::{
    AttemptOutcome, CountingReporter, NoOpReporter, OutcomeCounters, OutcomeKind,
    OutcomeReporter, TracingReporter,
};
pub use strategy::{
    RetryStrategy, DEFAULT_BASE_DELAY, DEFAULT_JITTER_RATIO, DEFAULT_MAX_ATTEMPTS,
    DEFAULT_MAX_DELAY, DEFAULT_MULTIPLIER, DEFAULT_OPERATION_NAME,
};
