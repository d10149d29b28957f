//! Run command

use anyhow::{anyhow, Result};
use camino::Utf8Path;
use std::error::Error;
use std::io;
use std::process::ExitStatus;
use std::sync::Arc;
use std::time::Duration;
use steadfast_core::retry::{
    CancelCause, Deadline, ErrorClassifier, IoErrorClassifier, RetryExecutor, TerminalError,
};
use thiserror::Error;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::cli::RunArgs;
use crate::{commands, output};

/// Exit codes treated as permanent when none are given
const DEFAULT_PERMANENT_EXIT_CODES: &[i32] = &[126, 127];

/// Exit code when `--timeout` expires
const EXIT_TIMED_OUT: i32 = 124;

/// Exit code when interrupted with Ctrl-C
const EXIT_INTERRUPTED: i32 = 130;

/// Failure of one child process run
#[derive(Error, Debug)]
pub enum ChildError {
    /// The process could not be started
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    /// The process started but waiting for it failed
    #[error("failed waiting for {program}: {source}")]
    Wait {
        program: String,
        #[source]
        source: io::Error,
    },

    /// The process exited unsuccessfully
    #[error("exited with status {0}")]
    Exit(i32),

    /// The process was killed by a signal
    #[error("terminated by signal")]
    Signal(Option<i32>),

    /// The run was cancelled while the process was running
    #[error("interrupted")]
    Interrupted,
}

impl ChildError {
    /// Exit code steadfast reports for this failure, shell style
    pub fn exit_code(&self) -> i32 {
        match self {
            ChildError::Spawn { source, .. } if source.kind() == io::ErrorKind::NotFound => 127,
            ChildError::Spawn { .. } => 126,
            ChildError::Wait { .. } => 1,
            ChildError::Exit(code) => *code,
            ChildError::Signal(Some(signal)) => 128 + signal,
            ChildError::Signal(None) => 1,
            ChildError::Interrupted => EXIT_INTERRUPTED,
        }
    }
}

/// Stops on permanent exit codes, unrecoverable spawn failures and
/// interruption; everything else is left to the policy's classifier
pub struct ChildClassifier {
    permanent_exit_codes: Vec<i32>,
    policy: Arc<dyn ErrorClassifier>,
}

impl ChildClassifier {
    pub fn new(permanent_exit_codes: Vec<i32>, policy: Arc<dyn ErrorClassifier>) -> Self {
        Self {
            permanent_exit_codes,
            policy,
        }
    }

    fn is_permanent(&self, error: &ChildError) -> bool {
        match error {
            ChildError::Exit(code) => self.permanent_exit_codes.contains(code),
            ChildError::Spawn { source, .. } => !IoErrorClassifier::is_retryable_kind(source.kind()),
            ChildError::Wait { .. } | ChildError::Signal(_) => false,
            ChildError::Interrupted => true,
        }
    }
}

impl ErrorClassifier for ChildClassifier {
    fn is_retryable(&self, error: &(dyn Error + 'static)) -> bool {
        let permanent = error
            .downcast_ref::<ChildError>()
            .is_some_and(|child| self.is_permanent(child));
        !permanent && self.policy.is_retryable(error)
    }

    fn name(&self) -> &str {
        "exit-code"
    }
}

pub async fn run(args: RunArgs, config_path: Option<&Utf8Path>) -> Result<()> {
    let config = commands::load_config(config_path)?;

    let (program, program_args) = args
        .command
        .split_first()
        .ok_or_else(|| anyhow!("No command given"))?;

    let mut strategy = config.strategy_for(&args.policy);
    if let Some(max_attempts) = args.max_attempts {
        strategy = strategy.with_max_attempts(max_attempts);
    }

    let permanent_exit_codes = if args.permanent_exit_codes.is_empty() {
        DEFAULT_PERMANENT_EXIT_CODES.to_vec()
    } else {
        args.permanent_exit_codes.clone()
    };
    let classifier = ChildClassifier::new(permanent_exit_codes, strategy.classifier.clone());
    let strategy = strategy.with_classifier(classifier);

    let interrupt = commands::ctrl_c_token();
    let deadline = args
        .timeout
        .map(|secs| Deadline::new(&interrupt, Duration::from_secs(secs)));

    let executor = RetryExecutor::new();
    let result = match &deadline {
        Some(deadline) => {
            executor
                .execute_with_deadline(&strategy, deadline, || {
                    run_once(program, program_args, deadline.token())
                })
                .await
        }
        None => {
            executor
                .execute(&strategy, &interrupt, || {
                    run_once(program, program_args, &interrupt)
                })
                .await
        }
    };

    match result {
        Ok(()) => Ok(()),
        Err(err) => {
            let code = exit_code_for(&err);
            if code == EXIT_TIMED_OUT {
                output::warning(&format!(
                    "Timed out after {}",
                    output::duration(err.elapsed())
                ));
            }
            output::error(&err.to_string());
            std::process::exit(code);
        }
    }
}

/// One attempt: run the child to completion unless cancelled
async fn run_once(
    program: &str,
    args: &[String],
    cancel: &CancellationToken,
) -> Result<(), ChildError> {
    tracing::debug!(program = %program, "spawning");

    let mut child = Command::new(program)
        .args(args)
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| ChildError::Spawn {
            program: program.to_string(),
            source,
        })?;

    let status = tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        status = child.wait() => Some(status),
    };

    match status {
        Some(status) => {
            let status = status.map_err(|source| ChildError::Wait {
                program: program.to_string(),
                source,
            })?;
            check_status(status)
        }
        None => {
            if let Err(e) = child.kill().await {
                tracing::debug!(error = %e, "failed to kill child");
            }
            Err(ChildError::Interrupted)
        }
    }
}

fn check_status(status: ExitStatus) -> Result<(), ChildError> {
    if status.success() {
        return Ok(());
    }
    match status.code() {
        Some(code) => Err(ChildError::Exit(code)),
        None => Err(ChildError::Signal(signal_of(status))),
    }
}

#[cfg(unix)]
fn signal_of(status: ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn signal_of(_status: ExitStatus) -> Option<i32> {
    None
}

/// Exit code for a failed run
fn exit_code_for(err: &TerminalError<ChildError>) -> i32 {
    match err.cancel_cause() {
        Some(CancelCause::DeadlineExceeded) => EXIT_TIMED_OUT,
        Some(CancelCause::Cancelled) => EXIT_INTERRUPTED,
        None => err.last_error().map_or(1, ChildError::exit_code),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use steadfast_core::retry::{AlwaysRetry, NeverRetry, RetryStrategy};

    fn classifier(codes: Vec<i32>) -> ChildClassifier {
        ChildClassifier::new(codes, Arc::new(AlwaysRetry))
    }

    #[test]
    fn test_permanent_exit_codes() {
        let classifier = classifier(vec![2, 126, 127]);

        assert!(classifier.is_retryable(&ChildError::Exit(1)));
        assert!(!classifier.is_retryable(&ChildError::Exit(2)));
        assert!(!classifier.is_retryable(&ChildError::Exit(127)));
        assert!(classifier.is_retryable(&ChildError::Signal(Some(9))));
        assert!(!classifier.is_retryable(&ChildError::Interrupted));
    }

    #[test]
    fn test_spawn_failures_use_io_kind() {
        let classifier = classifier(vec![]);
        let missing = ChildError::Spawn {
            program: "nope".into(),
            source: io::Error::new(io::ErrorKind::NotFound, "not found"),
        };
        let busy = ChildError::Spawn {
            program: "busy".into(),
            source: io::Error::new(io::ErrorKind::WouldBlock, "try again"),
        };

        assert!(!classifier.is_retryable(&missing));
        assert!(classifier.is_retryable(&busy));
        assert_eq!(missing.exit_code(), 127);
        assert_eq!(busy.exit_code(), 126);
    }

    #[test]
    fn test_policy_classifier_still_applies() {
        let classifier = ChildClassifier::new(vec![], Arc::new(NeverRetry));
        assert!(!classifier.is_retryable(&ChildError::Exit(1)));
    }

    #[test]
    fn test_exit_code_for_outcomes() {
        let exhausted = TerminalError::exhausted("run", ChildError::Exit(3), 3, Duration::ZERO);
        assert_eq!(exit_code_for(&exhausted), 3);

        let signalled =
            TerminalError::exhausted("run", ChildError::Signal(Some(15)), 1, Duration::ZERO);
        assert_eq!(exit_code_for(&signalled), 143);

        let interrupted: TerminalError<ChildError> =
            TerminalError::cancelled("run", CancelCause::Cancelled, None, 0, Duration::ZERO);
        assert_eq!(exit_code_for(&interrupted), EXIT_INTERRUPTED);

        let timed_out = TerminalError::cancelled(
            "run",
            CancelCause::DeadlineExceeded,
            Some(ChildError::Interrupted),
            2,
            Duration::from_secs(1),
        );
        assert_eq!(exit_code_for(&timed_out), EXIT_TIMED_OUT);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_during_child_exits_timed_out() {
        let parent = CancellationToken::new();
        let deadline = Deadline::new(&parent, Duration::from_millis(100));

        let result: Result<(), _> = RetryExecutor::new()
            .execute_with_deadline(&RetryStrategy::new("run"), &deadline, || async {
                deadline.token().cancelled().await;
                Err(ChildError::Interrupted)
            })
            .await;

        let err = result.unwrap_err();
        assert_eq!(exit_code_for(&err), EXIT_TIMED_OUT);
        assert!(!parent.is_cancelled());
    }

    #[test]
    fn test_wait_failure_is_not_a_spawn_failure() {
        let classifier = classifier(DEFAULT_PERMANENT_EXIT_CODES.to_vec());
        let err = ChildError::Wait {
            program: "sleep".into(),
            source: io::Error::new(io::ErrorKind::NotFound, "no child"),
        };

        assert_eq!(err.exit_code(), 1);
        assert!(classifier.is_retryable(&err));
        assert_eq!(err.to_string(), "failed waiting for sleep: no child");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_once_reports_exit_status() {
        let cancel = CancellationToken::new();
        let args = |script: &str| vec!["-c".to_string(), script.to_string()];

        assert!(run_once("sh", &args("exit 0"), &cancel).await.is_ok());
        assert!(matches!(
            run_once("sh", &args("exit 4"), &cancel).await,
            Err(ChildError::Exit(4))
        ));
        assert!(matches!(
            run_once("definitely-not-a-real-program-7f3a", &[], &cancel).await,
            Err(ChildError::Spawn { .. })
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_once_kills_child_on_cancel() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let started = std::time::Instant::now();
        let result = run_once("sleep", &["30".to_string()], &cancel).await;

        assert!(matches!(result, Err(ChildError::Interrupted)));
        assert!(started.elapsed() < Duration::from_secs(10));
    }
}
