//! Endpoint snapshot refresh

use chrono::{DateTime, Utc};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use steadfast_core::retry::{OutcomeReporter, RetryExecutor, RetryStrategy, TracingReporter};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::classifier::SourceErrorClassifier;
use crate::endpoint::Endpoint;
use crate::error::DiscoveryError;
use crate::source::DiscoverySource;

/// Operation name used for refresh strategies and reporting
pub const REFRESH_OPERATION: &str = "discovery-refresh";

/// The endpoint list as of one successful refresh
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    /// Endpoints returned by the source
    pub endpoints: Vec<Endpoint>,

    /// Number of successful refreshes so far; 0 before the first
    pub sequence: u64,

    /// When the snapshot was taken
    pub refreshed_at: Option<DateTime<Utc>>,
}

impl Snapshot {
    /// Whether no refresh has succeeded yet
    pub fn is_initial(&self) -> bool {
        self.sequence == 0
    }
}

/// Keeps the latest [`Snapshot`] of a [`DiscoverySource`]
///
/// Every fetch runs under the retry executor. Readers get the last good
/// snapshot; a failed refresh leaves it untouched.
pub struct Refresher<S, R = TracingReporter> {
    source: S,
    strategy: RetryStrategy,
    executor: RetryExecutor<R>,
    current: RwLock<Arc<Snapshot>>,
}

impl<S: DiscoverySource> Refresher<S, TracingReporter> {
    /// Create a refresher with the default strategy and executor
    pub fn new(source: S) -> Self {
        Self {
            source,
            strategy: RetryStrategy::new(REFRESH_OPERATION).with_classifier(SourceErrorClassifier),
            executor: RetryExecutor::new(),
            current: RwLock::new(Arc::new(Snapshot::default())),
        }
    }
}

impl<S, R> Refresher<S, R>
where
    S: DiscoverySource,
    R: OutcomeReporter,
{
    /// Replace the retry strategy used for each refresh
    pub fn with_strategy(mut self, strategy: RetryStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Replace the executor (reporter and jitter source)
    pub fn with_executor<R2: OutcomeReporter>(self, executor: RetryExecutor<R2>) -> Refresher<S, R2> {
        Refresher {
            source: self.source,
            strategy: self.strategy,
            executor,
            current: self.current,
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn strategy(&self) -> &RetryStrategy {
        &self.strategy
    }

    /// The latest snapshot
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.current
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Fetch once, retrying per the strategy, and publish the result
    pub async fn refresh(&self, cancel: &CancellationToken) -> Result<Arc<Snapshot>, DiscoveryError> {
        let endpoints = self
            .executor
            .execute(&self.strategy, cancel, || self.source.fetch())
            .await?;

        let snapshot = {
            let mut current = self.current.write().unwrap_or_else(|e| e.into_inner());
            let next = Arc::new(Snapshot {
                endpoints,
                sequence: current.sequence + 1,
                refreshed_at: Some(Utc::now()),
            });
            *current = next.clone();
            next
        };

        debug!(
            source = self.source.name(),
            sequence = snapshot.sequence,
            endpoints = snapshot.endpoints.len(),
            "discovery snapshot updated"
        );

        Ok(snapshot)
    }

    /// Refresh every `interval` until `cancel` fires
    ///
    /// Failed refreshes are logged and the previous snapshot is kept.
    pub async fn run_periodic(&self, interval: Duration, cancel: &CancellationToken) {
        self.run_periodic_with(interval, cancel, |_| {}).await
    }

    /// Like [`run_periodic`](Self::run_periodic), calling `on_cycle` with
    /// the outcome of each completed refresh
    pub async fn run_periodic_with<F>(
        &self,
        interval: Duration,
        cancel: &CancellationToken,
        mut on_cycle: F,
    ) where
        F: FnMut(&Result<Arc<Snapshot>, DiscoveryError>),
    {
        info!(
            source = self.source.name(),
            interval_ms = interval.as_millis() as u64,
            "starting periodic discovery refresh"
        );

        loop {
            let result = self.refresh(cancel).await;

            match &result {
                Err(err) if err.is_cancelled() => break,
                Err(err) => warn!(
                    source = self.source.name(),
                    error = %err,
                    transient = err.is_transient(),
                    "discovery refresh failed, keeping previous snapshot"
                ),
                Ok(_) => {}
            }
            on_cycle(&result);

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }

        info!(source = self.source.name(), "periodic discovery refresh stopped");
    }
}
