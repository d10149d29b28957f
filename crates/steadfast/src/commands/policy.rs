//! Policy command

use anyhow::Result;
use camino::Utf8Path;
use steadfast_core::types::RetryPolicy;

use crate::cli::{PolicyCommands, PolicyShowArgs};
use crate::{commands, output};

pub fn run(cmd: PolicyCommands, config_path: Option<&Utf8Path>) -> Result<()> {
    match cmd {
        PolicyCommands::Show(args) => show(args, config_path),
    }
}

fn show(args: PolicyShowArgs, config_path: Option<&Utf8Path>) -> Result<()> {
    let config = commands::load_config(config_path)?;
    let policies = config.retry_policies();

    if args.json {
        println!("{}", serde_json::to_string_pretty(policies)?);
        return Ok(());
    }

    match &config.config_path {
        Some(path) => output::info(&format!("Configuration: {}", path)),
        None => output::info("No steadfast.yaml found, using built-in defaults"),
    }

    output::header("default");
    print_policy(&policies.default);

    let mut operations: Vec<_> = policies.operations.iter().collect();
    operations.sort_by(|a, b| a.0.cmp(b.0));
    for (name, policy) in operations {
        output::header(name);
        print_policy(policy);
    }

    Ok(())
}

fn print_policy(policy: &RetryPolicy) {
    output::kv("max-attempts", &policy.max_attempts.to_string());
    output::kv("base-delay-ms", &policy.base_delay_ms.to_string());
    output::kv("max-delay-ms", &policy.max_delay_ms.to_string());
    output::kv("multiplier", &policy.multiplier.to_string());
    output::kv("jitter-ratio", &policy.jitter_ratio.to_string());
    output::kv("classifier", &policy.classifier.to_string());
}
