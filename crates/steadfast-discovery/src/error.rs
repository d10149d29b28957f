//! Error types for steadfast-discovery

use std::time::Duration;
use steadfast_core::retry::{FailureKind, TerminalError};
use thiserror::Error;

/// Failure of a single fetch from a discovery source
#[derive(Error, Debug)]
pub enum SourceError {
    /// The source could not be reached
    #[error("source unavailable: {0}")]
    Unavailable(String),

    /// The source did not answer in time
    #[error("source timed out after {0:?}")]
    Timeout(Duration),

    /// The source answered with an error status
    #[error("source returned status {code}: {message}")]
    Status { code: u16, message: String },

    /// The caller is not allowed to read the source
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The source answered with something that is not an endpoint list
    #[error("malformed endpoint list: {0}")]
    Malformed(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SourceError {
    /// Create a status error
    pub fn status(code: u16, message: impl Into<String>) -> Self {
        Self::Status {
            code,
            message: message.into(),
        }
    }
}

/// Discovery error types
#[derive(Error, Debug)]
pub enum DiscoveryError {
    /// A refresh stopped without producing endpoints
    #[error("refresh of {operation} {kind} after {attempts} attempt(s) over {:.2}s", .duration.as_secs_f64())]
    RefreshFailed {
        operation: String,
        kind: FailureKind,
        attempts: u32,
        duration: Duration,
        transient: bool,
        #[source]
        source: Option<SourceError>,
    },
}

impl DiscoveryError {
    /// Number of fetch attempts made
    pub fn attempts(&self) -> u32 {
        match self {
            DiscoveryError::RefreshFailed { attempts, .. } => *attempts,
        }
    }

    /// Whether the failure may clear up on a later refresh
    pub fn is_transient(&self) -> bool {
        match self {
            DiscoveryError::RefreshFailed { transient, .. } => *transient,
        }
    }

    /// Whether the refresh was cancelled
    pub fn is_cancelled(&self) -> bool {
        match self {
            DiscoveryError::RefreshFailed { kind, .. } => *kind == FailureKind::Cancelled,
        }
    }
}

impl From<TerminalError<SourceError>> for DiscoveryError {
    fn from(err: TerminalError<SourceError>) -> Self {
        DiscoveryError::RefreshFailed {
            operation: err.operation().to_string(),
            kind: err.kind(),
            attempts: err.attempts(),
            duration: err.elapsed(),
            transient: err.is_transient(),
            source: err.into_last_error(),
        }
    }
}
