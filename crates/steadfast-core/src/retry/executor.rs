//! Retry execution engine
//!
//! This module provides the retry control loop: run the operation, classify
//! its error, wait out the backoff delay (cancellably), and either try again
//! or stop with a [`TerminalError`].

use std::error::Error;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::{CancellationToken, DropGuard};

use super::delay::{calculate_delay, JitterSource, ThreadRngJitter};
use super::error::{CancelCause, TerminalError};
use super::reporter::{AttemptOutcome, OutcomeKind, OutcomeReporter, TracingReporter};
use super::strategy::RetryStrategy;

/// Execute an async operation under `strategy` with the default executor
///
/// This is a convenience function for simple retry scenarios. Outcomes are
/// logged through [`TracingReporter`] and jitter comes from the thread RNG.
/// For more control, use [`RetryExecutorBuilder`].
///
/// # Example
///
/// ```rust,no_run
/// use steadfast_core::retry::{retry, RetryStrategy};
/// use tokio_util::sync::CancellationToken;
///
/// async fn example() {
///     let strategy = RetryStrategy::new("fetch-config");
///     let cancel = CancellationToken::new();
///
///     let result = retry(&strategy, &cancel, || async {
///         Ok::<_, std::io::Error>("config")
///     })
///     .await;
/// }
/// ```
pub async fn retry<F, Fut, T, E>(
    strategy: &RetryStrategy,
    cancel: &CancellationToken,
    op: F,
) -> Result<T, TerminalError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Error + 'static,
{
    RetryExecutor::new().execute(strategy, cancel, op).await
}

/// A cancellation token that also fires after a timeout
///
/// The token is a child of `parent`, so cancelling the parent cancels it
/// too. The timer task ends when the `Deadline` is dropped. Pass it to
/// [`RetryExecutor::execute_with_deadline`] so an expired deadline is
/// reported as [`CancelCause::DeadlineExceeded`].
///
/// Must be created from within a Tokio runtime.
///
/// # Example
///
/// ```rust,no_run
/// use std::time::Duration;
/// use steadfast_core::retry::{Deadline, RetryExecutor, RetryStrategy};
/// use tokio_util::sync::CancellationToken;
///
/// async fn example() {
///     let parent = CancellationToken::new();
///     let deadline = Deadline::new(&parent, Duration::from_secs(30));
///
///     let result = RetryExecutor::new()
///         .execute_with_deadline(&RetryStrategy::new("sync"), &deadline, || async {
///             Ok::<_, std::io::Error>(())
///         })
///         .await;
/// }
/// ```
#[derive(Debug)]
pub struct Deadline {
    token: CancellationToken,
    expired: Arc<AtomicBool>,
    _timer: DropGuard,
}

impl Deadline {
    /// Start a deadline of `timeout` under `parent`
    pub fn new(parent: &CancellationToken, timeout: Duration) -> Self {
        let token = parent.child_token();
        let expired = Arc::new(AtomicBool::new(false));
        let stop = CancellationToken::new();

        let fire = token.clone();
        let flag = expired.clone();
        let stopped = stop.clone();
        tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = stopped.cancelled() => {}
                _ = fire.cancelled() => {}
                _ = tokio::time::sleep(timeout) => {
                    flag.store(true, Ordering::SeqCst);
                    fire.cancel();
                }
            }
        });

        Self {
            token,
            expired,
            _timer: stop.drop_guard(),
        }
    }

    /// The token to hand to operations that should stop with the deadline
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Whether the timeout, rather than the parent, cancelled the token
    pub fn is_expired(&self) -> bool {
        self.expired.load(Ordering::SeqCst)
    }

    /// Cause to record for a cancellation observed on [`token`](Self::token)
    pub fn cause(&self) -> CancelCause {
        if self.is_expired() {
            CancelCause::DeadlineExceeded
        } else {
            CancelCause::Cancelled
        }
    }
}

/// Builder for configuring a [`RetryExecutor`]
///
/// # Example
///
/// ```rust
/// use steadfast_core::retry::{CountingReporter, RetryExecutorBuilder, SeededJitter};
/// use std::sync::Arc;
///
/// let reporter = Arc::new(CountingReporter::new());
/// let executor = RetryExecutorBuilder::new()
///     .with_reporter(reporter.clone())
///     .with_jitter_source(SeededJitter::new(42))
///     .build();
/// ```
pub struct RetryExecutorBuilder<R = TracingReporter> {
    reporter: R,
    jitter: Arc<dyn JitterSource>,
}

impl Default for RetryExecutorBuilder<TracingReporter> {
    fn default() -> Self {
        Self::new()
    }
}

impl RetryExecutorBuilder<TracingReporter> {
    /// Create a new builder with default settings
    pub fn new() -> Self {
        Self {
            reporter: TracingReporter,
            jitter: Arc::new(ThreadRngJitter),
        }
    }
}

impl<R> RetryExecutorBuilder<R> {
    /// Set the outcome reporter
    pub fn with_reporter<R2>(self, reporter: R2) -> RetryExecutorBuilder<R2> {
        RetryExecutorBuilder {
            reporter,
            jitter: self.jitter,
        }
    }

    /// Set the randomness used for jitter
    pub fn with_jitter_source<J>(mut self, jitter: J) -> Self
    where
        J: JitterSource + 'static,
    {
        self.jitter = Arc::new(jitter);
        self
    }

    /// Build the executor
    pub fn build(self) -> RetryExecutor<R> {
        RetryExecutor {
            reporter: self.reporter,
            jitter: self.jitter,
        }
    }
}

/// Runs operations under a [`RetryStrategy`]
///
/// An executor holds no per-invocation state: one instance can serve many
/// concurrent invocations, each with its own strategy and token.
pub struct RetryExecutor<R = TracingReporter> {
    reporter: R,
    jitter: Arc<dyn JitterSource>,
}

impl Default for RetryExecutor<TracingReporter> {
    fn default() -> Self {
        Self::new()
    }
}

impl RetryExecutor<TracingReporter> {
    /// Create an executor with the default reporter and jitter source
    pub fn new() -> Self {
        RetryExecutorBuilder::new().build()
    }

    /// Start configuring an executor
    pub fn builder() -> RetryExecutorBuilder<TracingReporter> {
        RetryExecutorBuilder::new()
    }
}

impl<R> RetryExecutor<R>
where
    R: OutcomeReporter,
{
    /// The configured reporter
    pub fn reporter(&self) -> &R {
        &self.reporter
    }

    /// Execute an operation with retry logic
    ///
    /// # Arguments
    ///
    /// * `strategy` - Retry settings; normalized before use, never modified
    /// * `cancel` - Checked before every attempt, after every failed attempt
    ///   and raced against every wait
    /// * `op` - A closure that returns a future representing one attempt
    ///
    /// # Returns
    ///
    /// The result of the first successful attempt, or a [`TerminalError`]
    /// describing why the loop stopped.
    pub async fn execute<F, Fut, T, E>(
        &self,
        strategy: &RetryStrategy,
        cancel: &CancellationToken,
        op: F,
    ) -> Result<T, TerminalError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Error + 'static,
    {
        self.run(strategy, cancel, None, op).await
    }

    /// Execute an operation until it succeeds, fails for good or `deadline`
    /// fires
    ///
    /// Same as [`execute`](Self::execute) with `deadline.token()`, except a
    /// cancellation caused by the timeout carries
    /// [`CancelCause::DeadlineExceeded`].
    pub async fn execute_with_deadline<F, Fut, T, E>(
        &self,
        strategy: &RetryStrategy,
        deadline: &Deadline,
        op: F,
    ) -> Result<T, TerminalError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Error + 'static,
    {
        self.run(strategy, deadline.token(), Some(deadline), op).await
    }

    async fn run<F, Fut, T, E>(
        &self,
        strategy: &RetryStrategy,
        cancel: &CancellationToken,
        deadline: Option<&Deadline>,
        mut op: F,
    ) -> Result<T, TerminalError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Error + 'static,
    {
        let cause = || deadline.map_or(CancelCause::Cancelled, Deadline::cause);
        let strategy = strategy.normalized();
        let operation = strategy.operation_name.as_str();
        let max_attempts = strategy.max_attempts;
        let start = Instant::now();

        let mut last_error: Option<E> = None;
        let mut attempt: u32 = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(self.cancelled(operation, cause(), attempt, last_error, start));
            }

            tracing::debug!(
                operation = %operation,
                attempt = attempt + 1,
                max_attempts = max_attempts,
                "starting attempt"
            );

            let err = match op().await {
                Ok(value) => {
                    self.report(operation, attempt, start, OutcomeKind::Success, None);
                    return Ok(value);
                }
                Err(err) => err,
            };

            let attempts_made = attempt + 1;

            // An attempt that failed because the signal fired mid-flight
            // is a cancellation, whatever the classifier thinks of it
            if cancel.is_cancelled() {
                return Err(self.cancelled(operation, cause(), attempts_made, Some(err), start));
            }

            if !strategy.classifier.is_retryable(&err) {
                tracing::warn!(
                    operation = %operation,
                    attempt = attempts_made,
                    error = %err,
                    classifier = strategy.classifier.name(),
                    "non-retryable error, giving up"
                );
                self.report(operation, attempt, start, OutcomeKind::NonRetryable, None);
                return Err(TerminalError::non_retryable(
                    operation,
                    err,
                    attempts_made,
                    start.elapsed(),
                ));
            }

            if attempts_made >= max_attempts {
                tracing::error!(
                    operation = %operation,
                    attempts = attempts_made,
                    error = %err,
                    "all retry attempts exhausted"
                );
                self.report(operation, attempt, start, OutcomeKind::MaxRetries, None);
                return Err(TerminalError::exhausted(
                    operation,
                    err,
                    attempts_made,
                    start.elapsed(),
                ));
            }

            let delay = calculate_delay(attempt, &strategy, self.jitter.as_ref());

            tracing::warn!(
                operation = %operation,
                attempt = attempts_made,
                max_attempts = max_attempts,
                error = %err,
                delay_ms = delay.as_millis() as u64,
                "attempt failed, will retry"
            );
            self.report(operation, attempt, start, OutcomeKind::Retry, Some(delay));

            last_error = Some(err);

            if !wait(delay, cancel).await {
                return Err(self.cancelled(operation, cause(), attempts_made, last_error, start));
            }

            attempt = attempts_made;
        }
    }

    fn report(
        &self,
        operation: &str,
        attempt: u32,
        start: Instant,
        kind: OutcomeKind,
        next_delay: Option<Duration>,
    ) {
        self.reporter.report(
            operation,
            &AttemptOutcome {
                attempt,
                elapsed: start.elapsed(),
                kind,
                next_delay,
            },
        );
    }

    fn cancelled<E>(
        &self,
        operation: &str,
        cause: CancelCause,
        attempts_made: u32,
        last_error: Option<E>,
        start: Instant,
    ) -> TerminalError<E> {
        tracing::warn!(
            operation = %operation,
            attempts = attempts_made,
            cause = %cause,
            "retry cancelled"
        );
        self.report(
            operation,
            attempts_made.saturating_sub(1),
            start,
            OutcomeKind::Cancelled,
            None,
        );
        TerminalError::cancelled(operation, cause, last_error, attempts_made, start.elapsed())
    }
}

/// Sleep for `delay` unless `cancel` fires first
///
/// Returns `false` when cancelled. Cancellation wins a tie with the timer.
async fn wait(delay: Duration, cancel: &CancellationToken) -> bool {
    if delay.is_zero() {
        tokio::task::yield_now().await;
        return !cancel.is_cancelled();
    }

    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}
