//! Error classification
//!
//! An [`ErrorClassifier`] decides whether a failed attempt is worth retrying.
//! Classifiers receive the failure as a `dyn Error` so they can downcast it or
//! walk its `source()` chain without the executor knowing anything about the
//! concrete error type.

use std::error::Error;
use std::fmt;
use std::io;

/// Decides whether an operation error is transient (retryable) or permanent
///
/// # Example
///
/// ```rust
/// use steadfast_core::retry::ErrorClassifier;
/// use std::error::Error;
///
/// struct NotFoundIsPermanent;
///
/// impl ErrorClassifier for NotFoundIsPermanent {
///     fn is_retryable(&self, error: &(dyn Error + 'static)) -> bool {
///         !error.to_string().contains("not found")
///     }
/// }
/// ```
pub trait ErrorClassifier: Send + Sync {
    /// Return `true` if the operation should be attempted again after `error`
    fn is_retryable(&self, error: &(dyn Error + 'static)) -> bool;

    /// Short label used in logs and `Debug` output
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
            .rsplit("::")
            .next()
            .unwrap_or("classifier")
    }
}

/// Iterate over `error` and every error in its `source()` chain
fn chain<'a>(
    error: &'a (dyn Error + 'static),
) -> impl Iterator<Item = &'a (dyn Error + 'static)> + 'a {
    std::iter::successors(Some(error), |&err| err.source())
}

/// Treats every error as retryable
///
/// This is the default classifier, used when there is no domain knowledge
/// about the failures an operation can produce.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysRetry;

impl ErrorClassifier for AlwaysRetry {
    fn is_retryable(&self, _error: &(dyn Error + 'static)) -> bool {
        true
    }

    fn name(&self) -> &str {
        "always"
    }
}

/// Treats every error as permanent
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverRetry;

impl ErrorClassifier for NeverRetry {
    fn is_retryable(&self, _error: &(dyn Error + 'static)) -> bool {
        false
    }

    fn name(&self) -> &str {
        "never"
    }
}

/// A classifier backed by a closure
pub struct FnClassifier<F> {
    classify: F,
}

impl<F> FnClassifier<F>
where
    F: Fn(&(dyn Error + 'static)) -> bool + Send + Sync,
{
    /// Create a new closure-based classifier
    pub fn new(classify: F) -> Self {
        Self { classify }
    }
}

impl<F> fmt::Debug for FnClassifier<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnClassifier").finish_non_exhaustive()
    }
}

impl<F> ErrorClassifier for FnClassifier<F>
where
    F: Fn(&(dyn Error + 'static)) -> bool + Send + Sync,
{
    fn is_retryable(&self, error: &(dyn Error + 'static)) -> bool {
        (self.classify)(error)
    }

    fn name(&self) -> &str {
        "fn"
    }
}

/// Retries only when the error chain mentions one of a set of patterns
///
/// Matching is case-insensitive and considers every error in the chain.
#[derive(Debug, Clone)]
pub struct MessageClassifier {
    patterns: Vec<String>,
}

impl MessageClassifier {
    /// Create a classifier retrying on any of `patterns`
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            patterns: patterns
                .into_iter()
                .map(|p| p.into().to_lowercase())
                .collect(),
        }
    }

    /// Patterns for common network failures
    pub fn network_errors() -> Self {
        Self::new([
            "timeout",
            "timed out",
            "connection reset",
            "connection refused",
            "network unreachable",
            "temporary failure",
        ])
    }
}

impl ErrorClassifier for MessageClassifier {
    fn is_retryable(&self, error: &(dyn Error + 'static)) -> bool {
        chain(error).any(|err| {
            let message = err.to_string().to_lowercase();
            self.patterns.iter().any(|p| message.contains(p.as_str()))
        })
    }

    fn name(&self) -> &str {
        "network"
    }
}

/// Classifies by the first `std::io::Error` found in the error chain
///
/// Connection-level and timing failures are retryable. Missing files,
/// permission problems and malformed input are permanent. Errors without an
/// `io::Error` in their chain, and unlisted kinds, are retried.
#[derive(Debug, Clone, Copy, Default)]
pub struct IoErrorClassifier;

impl IoErrorClassifier {
    /// Classify a single I/O error kind
    pub fn is_retryable_kind(kind: io::ErrorKind) -> bool {
        use io::ErrorKind::*;

        !matches!(
            kind,
            NotFound | PermissionDenied | InvalidInput | InvalidData | Unsupported | AlreadyExists
        )
    }
}

impl ErrorClassifier for IoErrorClassifier {
    fn is_retryable(&self, error: &(dyn Error + 'static)) -> bool {
        chain(error)
            .find_map(|err| err.downcast_ref::<io::Error>())
            .map(|io_err| Self::is_retryable_kind(io_err.kind()))
            .unwrap_or(true)
    }

    fn name(&self) -> &str {
        "io"
    }
}

/// An error carrying an HTTP status code
///
/// Clients that surface HTTP failures can wrap (or chain) this type so that
/// [`HttpStatusClassifier`] can find the status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpStatusError {
    /// The HTTP status code
    pub status: u16,
    /// Response reason or body excerpt
    pub message: String,
}

impl HttpStatusError {
    /// Create a new status error
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl fmt::Display for HttpStatusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HTTP {}: {}", self.status, self.message)
    }
}

impl Error for HttpStatusError {}

/// Classifies by the HTTP status found in the error chain
#[derive(Debug, Clone)]
pub struct HttpStatusClassifier {
    retryable_codes: Vec<u16>,
}

impl Default for HttpStatusClassifier {
    /// Retryable codes: 408, 425, 429, 500, 502, 503, 504
    fn default() -> Self {
        Self::with_codes(vec![408, 425, 429, 500, 502, 503, 504])
    }
}

impl HttpStatusClassifier {
    /// Create a classifier with custom retryable status codes
    pub fn with_codes(codes: Vec<u16>) -> Self {
        Self {
            retryable_codes: codes,
        }
    }

    /// Check if a status code is retryable
    pub fn is_retryable_code(&self, code: u16) -> bool {
        self.retryable_codes.contains(&code)
    }
}

impl ErrorClassifier for HttpStatusClassifier {
    fn is_retryable(&self, error: &(dyn Error + 'static)) -> bool {
        chain(error)
            .find_map(|err| err.downcast_ref::<HttpStatusError>())
            .map(|status| self.is_retryable_code(status.status))
            .unwrap_or(true)
    }

    fn name(&self) -> &str {
        "http"
    }
}
