//! # steadfast-core
//!
//! Core library for steadfast providing:
//! - Retry execution engine with exponential backoff, jitter and cancellation
//! - Pluggable error classification and outcome reporting
//! - Retry policy types and configuration file loading (steadfast.yaml)

pub mod config;
pub mod error;
pub mod retry;
pub mod types;

pub use config::SteadfastConfig;
pub use error::{Error, Result};
pub use retry::{retry, RetryExecutor, RetryStrategy, TerminalError};
