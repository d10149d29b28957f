//! CLI argument parsing with clap

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};

/// steadfast - retry commands and refresh endpoints with exponential backoff
#[derive(Parser, Debug)]
#[command(name = "steadfast")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to steadfast.yaml config file
    #[arg(short, long, global = true)]
    pub config: Option<Utf8PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a command, retrying it when it fails
    Run(RunArgs),

    /// Print the delays a policy would wait between attempts
    Delays(DelaysArgs),

    /// Retry policy management
    #[command(subcommand)]
    Policy(PolicyCommands),

    /// Refresh endpoints from a discovery file
    Discover(DiscoverArgs),
}

// Run command
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Retry policy to use (falls back to the default policy)
    #[arg(short, long, default_value = "run")]
    pub policy: String,

    /// Give up on the whole run after this many seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Override the policy's attempt limit
    #[arg(short = 'n', long)]
    pub max_attempts: Option<u32>,

    /// Exit code that means retrying is pointless (repeatable; default 126, 127)
    #[arg(long = "permanent-exit-code", value_name = "CODE")]
    pub permanent_exit_codes: Vec<i32>,

    /// Command and arguments to run
    #[arg(last = true, required = true, value_name = "COMMAND")]
    pub command: Vec<String>,
}

// Delays command
#[derive(Args, Debug)]
pub struct DelaysArgs {
    /// Retry policy to show (falls back to the default policy)
    #[arg(short, long, default_value = "run")]
    pub policy: String,

    /// Apply jitter instead of showing nominal delays
    #[arg(long)]
    pub jitter: bool,

    /// Seed for reproducible jitter (implies --jitter)
    #[arg(long)]
    pub seed: Option<u64>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

// Policy commands
#[derive(Subcommand, Debug)]
pub enum PolicyCommands {
    /// Show the resolved retry policies
    Show(PolicyShowArgs),
}

#[derive(Args, Debug)]
pub struct PolicyShowArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

// Discover command
#[derive(Args, Debug)]
pub struct DiscoverArgs {
    /// Endpoint list (YAML, or JSON by .json extension)
    #[arg(short, long)]
    pub file: Utf8PathBuf,

    /// Keep refreshing every SECS seconds until interrupted
    #[arg(short, long, value_name = "SECS")]
    pub watch: Option<u64>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}
