//! Serializable retry policy configuration

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::retry::{
    AlwaysRetry, ErrorClassifier, HttpStatusClassifier, IoErrorClassifier, MessageClassifier,
    NeverRetry, RetryStrategy, DEFAULT_BASE_DELAY, DEFAULT_JITTER_RATIO, DEFAULT_MAX_ATTEMPTS,
    DEFAULT_MAX_DELAY, DEFAULT_MULTIPLIER,
};

/// Retry policy configurations
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RetryPoliciesConfig {
    /// Default retry policy
    #[serde(default)]
    pub default: RetryPolicy,

    /// Per-operation retry policies
    #[serde(default)]
    pub operations: HashMap<String, RetryPolicy>,
}

impl RetryPoliciesConfig {
    /// Policy configured for `operation`, or the default policy
    pub fn policy_for(&self, operation: &str) -> &RetryPolicy {
        self.operations.get(operation).unwrap_or(&self.default)
    }

    /// Build the strategy for `operation`
    pub fn strategy_for(&self, operation: &str) -> RetryStrategy {
        self.policy_for(operation).to_strategy(operation)
    }
}

/// Retry policy for an operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RetryPolicy {
    /// Total number of attempts, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the second attempt, in milliseconds
    #[serde(default = "default_base_delay")]
    pub base_delay_ms: u64,

    /// Maximum delay between attempts, in milliseconds
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,

    /// Growth factor per attempt
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    /// Fraction of each delay randomized symmetrically
    #[serde(default = "default_jitter_ratio")]
    pub jitter_ratio: f64,

    /// Which errors are retried
    #[serde(default)]
    pub classifier: ClassifierKind,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay(),
            max_delay_ms: default_max_delay(),
            multiplier: default_multiplier(),
            jitter_ratio: default_jitter_ratio(),
            classifier: ClassifierKind::default(),
        }
    }
}

impl RetryPolicy {
    /// Build a strategy labelled `operation` from this policy
    ///
    /// Values are copied as-is; the executor normalizes them before use.
    pub fn to_strategy(&self, operation: &str) -> RetryStrategy {
        RetryStrategy::new(operation)
            .with_max_attempts(self.max_attempts)
            .with_base_delay(Duration::from_millis(self.base_delay_ms))
            .with_max_delay(Duration::from_millis(self.max_delay_ms))
            .with_multiplier(self.multiplier)
            .with_jitter_ratio(self.jitter_ratio)
            .with_shared_classifier(self.classifier.build())
    }
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}
fn default_base_delay() -> u64 {
    DEFAULT_BASE_DELAY.as_millis() as u64
}
fn default_max_delay() -> u64 {
    DEFAULT_MAX_DELAY.as_millis() as u64
}
fn default_multiplier() -> f64 {
    DEFAULT_MULTIPLIER
}
fn default_jitter_ratio() -> f64 {
    DEFAULT_JITTER_RATIO
}

/// Named error classifiers available from configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ClassifierKind {
    /// Retry every error (default)
    #[default]
    Always,

    /// Never retry
    Never,

    /// Classify by `std::io::Error` kind
    Io,

    /// Classify by HTTP status code
    Http,

    /// Classify by common network failure messages
    Network,
}

impl ClassifierKind {
    /// Instantiate the classifier
    pub fn build(&self) -> Arc<dyn ErrorClassifier> {
        match self {
            ClassifierKind::Always => Arc::new(AlwaysRetry),
            ClassifierKind::Never => Arc::new(NeverRetry),
            ClassifierKind::Io => Arc::new(IoErrorClassifier),
            ClassifierKind::Http => Arc::new(HttpStatusClassifier::default()),
            ClassifierKind::Network => Arc::new(MessageClassifier::network_errors()),
        }
    }
}

impl fmt::Display for ClassifierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ClassifierKind::Always => "always",
            ClassifierKind::Never => "never",
            ClassifierKind::Io => "io",
            ClassifierKind::Http => "http",
            ClassifierKind::Network => "network",
        };
        f.write_str(name)
    }
}
