//! Retry classification for discovery source failures

use std::error::Error;
use steadfast_core::retry::{ErrorClassifier, IoErrorClassifier};

use crate::error::SourceError;

/// Decides which [`SourceError`]s are worth another fetch
///
/// Timeouts, unavailability, 5xx, 408 and 429 statuses and transient I/O
/// kinds are retried. Authorization failures, malformed lists and other
/// statuses are permanent. Errors that are not source errors are retried.
#[derive(Debug, Clone, Copy, Default)]
pub struct SourceErrorClassifier;

impl SourceErrorClassifier {
    /// Classify a source error
    pub fn is_retryable_source(error: &SourceError) -> bool {
        match error {
            SourceError::Unavailable(_) | SourceError::Timeout(_) => true,
            SourceError::Status { code, .. } => matches!(code, 408 | 429 | 500..=599),
            SourceError::Unauthorized(_) | SourceError::Malformed(_) => false,
            SourceError::Io(e) => IoErrorClassifier::is_retryable_kind(e.kind()),
        }
    }
}

impl ErrorClassifier for SourceErrorClassifier {
    fn is_retryable(&self, error: &(dyn Error + 'static)) -> bool {
        std::iter::successors(Some(error), |&err| err.source())
            .find_map(|err| err.downcast_ref::<SourceError>())
            .map(Self::is_retryable_source)
            .unwrap_or(true)
    }

    fn name(&self) -> &str {
        "discovery-source"
    }
}
