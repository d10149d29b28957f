//! Integration tests for discovery refresh

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use camino::Utf8PathBuf;
use steadfast_core::retry::{CountingReporter, OutcomeKind, RetryExecutor, RetryStrategy};
use steadfast_discovery::{
    DiscoverySource, Endpoint, FileSource, Refresher, SourceError, SourceErrorClassifier,
    REFRESH_OPERATION,
};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

/// Replays a fixed script of fetch results, then keeps returning the last one
struct Scripted {
    script: Mutex<VecDeque<Result<Vec<Endpoint>, SourceError>>>,
    calls: Mutex<u32>,
}

impl Scripted {
    fn new(script: Vec<Result<Vec<Endpoint>, SourceError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            calls: Mutex::new(0),
        }
    }

    fn calls(&self) -> u32 {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl DiscoverySource for Scripted {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn fetch(&self) -> Result<Vec<Endpoint>, SourceError> {
        *self.calls.lock().unwrap() += 1;
        let mut script = self.script.lock().unwrap();
        match script.pop_front() {
            Some(next) => next,
            None => Ok(vec![Endpoint::new("fallback", "127.0.0.1:1")]),
        }
    }
}

fn strategy(max_attempts: u32) -> RetryStrategy {
    RetryStrategy::new(REFRESH_OPERATION)
        .with_max_attempts(max_attempts)
        .with_base_delay(Duration::from_millis(20))
        .with_max_delay(Duration::from_millis(100))
        .with_jitter_ratio(0.0)
        .with_classifier(SourceErrorClassifier)
}

fn endpoints(n: usize) -> Vec<Endpoint> {
    (0..n)
        .map(|i| Endpoint::new(format!("svc-{i}"), format!("10.1.0.{i}:443")))
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_permanent_error_is_not_retried() {
    let source = Arc::new(Scripted::new(vec![Err(SourceError::Unauthorized(
        "token expired".into(),
    ))]));
    let refresher = Refresher::new(source.clone()).with_strategy(strategy(5));

    let err = refresher
        .refresh(&CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.attempts(), 1);
    assert!(!err.is_transient());
    assert_eq!(source.calls(), 1);
    assert!(refresher.snapshot().is_initial());
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_refresh_reports_attempts() {
    let source = Arc::new(Scripted::new(vec![
        Err(SourceError::status(502, "bad gateway")),
        Err(SourceError::Timeout(Duration::from_secs(1))),
        Err(SourceError::status(503, "unavailable")),
    ]));
    let reporter = Arc::new(CountingReporter::new());
    let refresher = Refresher::new(source.clone())
        .with_strategy(strategy(3))
        .with_executor(RetryExecutor::builder().with_reporter(reporter.clone()).build());

    let err = refresher
        .refresh(&CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.attempts(), 3);
    assert!(err.is_transient());
    assert!(!err.is_cancelled());
    assert_eq!(reporter.count(REFRESH_OPERATION, OutcomeKind::Retry), 2);
    assert_eq!(reporter.count(REFRESH_OPERATION, OutcomeKind::MaxRetries), 1);
}

#[tokio::test(start_paused = true)]
async fn test_periodic_refresh_survives_failures_until_cancelled() {
    let source = Arc::new(Scripted::new(vec![
        Ok(endpoints(2)),
        Err(SourceError::Malformed("truncated".into())),
        Ok(endpoints(3)),
    ]));
    let refresher = Arc::new(Refresher::new(source.clone()).with_strategy(strategy(2)));
    let cancel = CancellationToken::new();

    let cycles = Arc::new(Mutex::new(Vec::new()));
    let task = {
        let refresher = refresher.clone();
        let cancel = cancel.clone();
        let cycles = cycles.clone();
        tokio::spawn(async move {
            refresher
                .run_periodic_with(Duration::from_secs(10), &cancel, |result| {
                    cycles
                        .lock()
                        .unwrap()
                        .push(result.as_ref().map(|s| s.sequence).map_err(|e| e.attempts()));
                })
                .await
        })
    };

    // Three cycles at t = 0, 10s, 20s
    tokio::time::sleep(Duration::from_secs(25)).await;
    cancel.cancel();
    task.await.unwrap();

    let cycles = cycles.lock().unwrap().clone();
    assert_eq!(cycles, vec![Ok(1), Err(1), Ok(2)]);

    let snapshot = refresher.snapshot();
    assert_eq!(snapshot.sequence, 2);
    assert_eq!(snapshot.endpoints, endpoints(3));
    assert_eq!(source.calls(), 3);
}

#[tokio::test]
async fn test_file_source_refresh() {
    let dir = TempDir::new().unwrap();
    let path = Utf8PathBuf::try_from(dir.path().join("endpoints.yaml")).unwrap();
    std::fs::write(
        &path,
        "- name: primary\n  address: db-1:5432\n  weight: 10\n- name: replica\n  address: db-2:5432\n",
    )
    .unwrap();

    let refresher = Refresher::new(FileSource::new(path.clone())).with_strategy(strategy(1));
    let cancel = CancellationToken::new();

    let first = refresher.refresh(&cancel).await.unwrap();
    assert_eq!(first.endpoints.len(), 2);
    assert_eq!(first.endpoints[0].weight, Some(10));
    assert!(first.refreshed_at.is_some());

    std::fs::write(&path, "endpoints: []\n").unwrap();
    let second = refresher.refresh(&cancel).await.unwrap();
    assert_eq!(second.sequence, 2);
    assert!(second.endpoints.is_empty());
}
