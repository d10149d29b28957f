//! Terminal error returned when a retried operation does not succeed

use std::error::Error;
use std::fmt;
use std::time::Duration;

/// Why the retry loop stopped without a result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The classifier rejected the error as permanent
    NonRetryable,
    /// The last allowed attempt failed with a retryable error
    Exhausted,
    /// The cancellation token fired before an attempt, during one that
    /// failed, or while waiting
    Cancelled,
}

impl FailureKind {
    /// Whether a failure of this kind is transient
    ///
    /// Exhausted and cancelled invocations only ever saw retryable errors;
    /// a non-retryable failure is permanent.
    pub fn is_transient(&self) -> bool {
        !matches!(self, FailureKind::NonRetryable)
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FailureKind::NonRetryable => "non-retryable error",
            FailureKind::Exhausted => "retry exhausted",
            FailureKind::Cancelled => "retry cancelled",
        })
    }
}

/// What fired the cancellation signal of a cancelled invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelCause {
    /// The caller's token was cancelled
    Cancelled,
    /// A [`Deadline`](super::Deadline) ran out
    DeadlineExceeded,
}

impl fmt::Display for CancelCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CancelCause::Cancelled => "cancelled",
            CancelCause::DeadlineExceeded => "deadline exceeded",
        })
    }
}

/// The failure of a retried operation
///
/// Generic over `E`, the error type of the operation. Carries the last
/// operation error (absent only when cancelled before the first attempt),
/// how many attempts were made, how long the invocation took and whether the
/// failure is transient.
#[derive(Debug)]
pub struct TerminalError<E> {
    operation: String,
    kind: FailureKind,
    cancel_cause: Option<CancelCause>,
    last_error: Option<E>,
    attempts: u32,
    elapsed: Duration,
}

impl<E> TerminalError<E> {
    /// Create a non-retryable failure
    pub fn non_retryable(
        operation: impl Into<String>,
        source: E,
        attempts: u32,
        elapsed: Duration,
    ) -> Self {
        Self::new(
            operation,
            FailureKind::NonRetryable,
            Some(source),
            attempts,
            elapsed,
        )
    }

    /// Create an exhausted failure
    pub fn exhausted(
        operation: impl Into<String>,
        source: E,
        attempts: u32,
        elapsed: Duration,
    ) -> Self {
        Self::new(
            operation,
            FailureKind::Exhausted,
            Some(source),
            attempts,
            elapsed,
        )
    }

    /// Create a cancelled failure
    pub fn cancelled(
        operation: impl Into<String>,
        cause: CancelCause,
        last_error: Option<E>,
        attempts: u32,
        elapsed: Duration,
    ) -> Self {
        Self {
            cancel_cause: Some(cause),
            ..Self::new(
                operation,
                FailureKind::Cancelled,
                last_error,
                attempts,
                elapsed,
            )
        }
    }

    fn new(
        operation: impl Into<String>,
        kind: FailureKind,
        last_error: Option<E>,
        attempts: u32,
        elapsed: Duration,
    ) -> Self {
        Self {
            operation: operation.into(),
            kind,
            cancel_cause: None,
            last_error,
            attempts,
            elapsed,
        }
    }

    /// Label of the operation that failed
    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Why the loop stopped
    pub fn kind(&self) -> FailureKind {
        self.kind
    }

    /// What stopped a cancelled invocation; `None` for other kinds
    pub fn cancel_cause(&self) -> Option<CancelCause> {
        self.cancel_cause
    }

    /// Check if a deadline stopped the invocation
    pub fn is_deadline_exceeded(&self) -> bool {
        self.cancel_cause == Some(CancelCause::DeadlineExceeded)
    }

    /// Number of attempts made (1-based count; 0 if cancelled up front)
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Total time spent in the invocation
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Whether the failure is transient
    pub fn is_transient(&self) -> bool {
        self.kind.is_transient()
    }

    /// Check if this error indicates all retries were exhausted
    pub fn is_exhausted(&self) -> bool {
        self.kind == FailureKind::Exhausted
    }

    /// Check if this error indicates cancellation
    pub fn is_cancelled(&self) -> bool {
        self.kind == FailureKind::Cancelled
    }

    /// Check if this error is non-retryable
    pub fn is_non_retryable(&self) -> bool {
        self.kind == FailureKind::NonRetryable
    }

    /// Get a reference to the last operation error
    pub fn last_error(&self) -> Option<&E> {
        self.last_error.as_ref()
    }

    /// Get the last operation error, consuming this error
    pub fn into_last_error(self) -> Option<E> {
        self.last_error
    }

    /// Map the operation error type using a closure
    pub fn map_err<F, E2>(self, f: F) -> TerminalError<E2>
    where
        F: FnOnce(E) -> E2,
    {
        TerminalError {
            operation: self.operation,
            kind: self.kind,
            cancel_cause: self.cancel_cause,
            last_error: self.last_error.map(f),
            attempts: self.attempts,
            elapsed: self.elapsed,
        }
    }
}

impl<E: fmt::Display> fmt::Display for TerminalError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} after {} attempt{} over {:.2}s",
            self.operation,
            self.kind,
            self.attempts,
            if self.attempts == 1 { "" } else { "s" },
            self.elapsed.as_secs_f64()
        )?;

        if let Some(CancelCause::DeadlineExceeded) = self.cancel_cause {
            write!(f, " ({})", CancelCause::DeadlineExceeded)?;
        }

        if let Some(err) = &self.last_error {
            write!(f, ": {}", err)?;
        }

        Ok(())
    }
}

impl<E: Error + 'static> Error for TerminalError<E> {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.last_error.as_ref().map(|err| err as &(dyn Error + 'static))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_exhausted_error() {
        let err = TerminalError::exhausted(
            "fetch",
            io::Error::new(io::ErrorKind::TimedOut, "timeout"),
            3,
            Duration::from_secs(5),
        );

        assert!(err.is_exhausted());
        assert!(err.is_transient());
        assert!(!err.is_cancelled());
        assert!(!err.is_non_retryable());
        assert_eq!(err.cancel_cause(), None);
        assert_eq!(err.attempts(), 3);
        assert_eq!(err.operation(), "fetch");
        assert_eq!(err.elapsed(), Duration::from_secs(5));
    }

    #[test]
    fn test_non_retryable_error_is_permanent() {
        let err = TerminalError::non_retryable(
            "fetch",
            io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
            1,
            Duration::ZERO,
        );

        assert!(err.is_non_retryable());
        assert!(!err.is_transient());
        assert_eq!(err.kind(), FailureKind::NonRetryable);
    }

    #[test]
    fn test_cancelled_without_error() {
        let err: TerminalError<io::Error> =
            TerminalError::cancelled("fetch", CancelCause::Cancelled, None, 0, Duration::ZERO);

        assert!(err.is_cancelled());
        assert_eq!(err.cancel_cause(), Some(CancelCause::Cancelled));
        assert!(!err.is_deadline_exceeded());
        assert!(err.is_transient());
        assert!(err.last_error().is_none());
        assert!(err.source().is_none());
        assert_eq!(err.to_string(), "fetch: retry cancelled after 0 attempts over 0.00s");
    }

    #[test]
    fn test_deadline_cause_survives_map_err() {
        let err = TerminalError::cancelled(
            "fetch",
            CancelCause::DeadlineExceeded,
            Some(io::Error::other("slow")),
            2,
            Duration::from_secs(3),
        );

        assert!(err.is_deadline_exceeded());
        assert_eq!(
            err.to_string(),
            "fetch: retry cancelled after 2 attempts over 3.00s (deadline exceeded): slow"
        );

        let mapped = err.map_err(|e| e.to_string());
        assert_eq!(mapped.cancel_cause(), Some(CancelCause::DeadlineExceeded));
        assert!(mapped.is_transient());
    }

    #[test]
    fn test_source_is_last_error() {
        let err = TerminalError::cancelled(
            "fetch",
            CancelCause::Cancelled,
            Some(io::Error::other("reset")),
            2,
            Duration::from_millis(300),
        );

        let source = err.source().expect("source");
        assert_eq!(source.to_string(), "reset");
    }

    #[test]
    fn test_map_err_preserves_metadata() {
        let err = TerminalError::exhausted("op", 42, 3, Duration::from_secs(1));
        let mapped = err.map_err(|n| format!("error code: {}", n));

        assert_eq!(mapped.last_error().map(String::as_str), Some("error code: 42"));
        assert_eq!(mapped.attempts(), 3);
        assert!(mapped.is_exhausted());
    }

    #[test]
    fn test_display() {
        let err = TerminalError::exhausted(
            "download",
            io::Error::new(io::ErrorKind::TimedOut, "connection timeout"),
            3,
            Duration::from_secs(5),
        );

        let display = err.to_string();
        assert!(display.contains("download"));
        assert!(display.contains("retry exhausted"));
        assert!(display.contains("3 attempts"));
        assert!(display.contains("connection timeout"));

        let single = TerminalError::non_retryable("x", "bad input", 1, Duration::ZERO);
        assert!(single.to_string().contains("after 1 attempt over"));
    }
}
