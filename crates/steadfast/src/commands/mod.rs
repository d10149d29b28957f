//! CLI command implementations

pub mod delays;
pub mod discover;
pub mod policy;
pub mod run;

use anyhow::{Context, Result};
use camino::Utf8Path;
use steadfast_core::config::SteadfastConfig;
use tokio_util::sync::CancellationToken;

/// Load steadfast.yaml from `path`, or search for it
pub(crate) fn load_config(path: Option<&Utf8Path>) -> Result<SteadfastConfig> {
    SteadfastConfig::load(path).context("Failed to load configuration")
}

/// A token that is cancelled on Ctrl-C
pub(crate) fn ctrl_c_token() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, cancelling");
            trigger.cancel();
        }
    });

    token
}
