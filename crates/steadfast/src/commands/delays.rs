//! Delays command

use anyhow::Result;
use camino::Utf8Path;
use serde::Serialize;
use std::time::Duration;
use steadfast_core::retry::{
    delay_schedule, FixedJitter, JitterSource, RetryStrategy, SeededJitter, ThreadRngJitter,
};

use crate::cli::DelaysArgs;
use crate::{commands, output};

/// One wait between attempts
#[derive(Debug, Serialize, PartialEq)]
struct DelayRow {
    after_attempt: u32,
    delay_ms: u64,
    total_ms: u64,
}

pub fn run(args: DelaysArgs, config_path: Option<&Utf8Path>) -> Result<()> {
    let config = commands::load_config(config_path)?;
    let strategy = config.strategy_for(&args.policy).normalized();

    let jitter: Box<dyn JitterSource> = match (args.seed, args.jitter) {
        (Some(seed), _) => Box::new(SeededJitter::new(seed)),
        (None, true) => Box::new(ThreadRngJitter),
        // The midpoint of the jitter range is the nominal delay
        (None, false) => Box::new(FixedJitter(0.5)),
    };

    let rows = schedule_rows(&strategy, jitter.as_ref());

    if args.json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    output::header(&format!("Delays for '{}'", strategy.operation_name));
    output::kv("Max attempts", &strategy.max_attempts.to_string());
    output::kv("Jitter ratio", &strategy.jitter_ratio.to_string());
    println!();

    if rows.is_empty() {
        output::info("Single attempt, no waits");
        return Ok(());
    }

    for row in &rows {
        println!(
            "  after attempt {:>3}: wait {:>9}  (total {})",
            row.after_attempt,
            output::duration(Duration::from_millis(row.delay_ms)),
            output::duration(Duration::from_millis(row.total_ms)),
        );
    }

    Ok(())
}

fn schedule_rows(strategy: &RetryStrategy, jitter: &dyn JitterSource) -> Vec<DelayRow> {
    let mut total = Duration::ZERO;
    delay_schedule(strategy, jitter)
        .into_iter()
        .zip(1u32..)
        .map(|(delay, after_attempt)| {
            total += delay;
            DelayRow {
                after_attempt,
                delay_ms: delay.as_millis() as u64,
                total_ms: total.as_millis() as u64,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nominal_rows() {
        let strategy = RetryStrategy::new("run")
            .with_max_attempts(4)
            .with_base_delay(Duration::from_millis(100))
            .with_max_delay(Duration::from_millis(250))
            .with_jitter_ratio(0.5);

        let rows = schedule_rows(&strategy, &FixedJitter(0.5));
        assert_eq!(
            rows,
            vec![
                DelayRow {
                    after_attempt: 1,
                    delay_ms: 100,
                    total_ms: 100,
                },
                DelayRow {
                    after_attempt: 2,
                    delay_ms: 200,
                    total_ms: 300,
                },
                DelayRow {
                    after_attempt: 3,
                    delay_ms: 250,
                    total_ms: 550,
                },
            ]
        );
    }

    #[test]
    fn test_seeded_rows_are_reproducible() {
        let strategy = RetryStrategy::new("run").with_max_attempts(6);

        let first = schedule_rows(&strategy, &SeededJitter::new(99));
        let second = schedule_rows(&strategy, &SeededJitter::new(99));
        assert_eq!(first, second);
        assert_eq!(first.len(), 5);
    }

    #[test]
    fn test_single_attempt_has_no_rows() {
        let strategy = RetryStrategy::new("run").with_max_attempts(1);
        assert!(schedule_rows(&strategy, &FixedJitter(0.5)).is_empty());
    }
}
