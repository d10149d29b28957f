//! Discover command

use anyhow::Result;
use camino::Utf8Path;
use std::time::Duration;
use steadfast_discovery::{
    Endpoint, FileSource, Refresher, Snapshot, SourceErrorClassifier, REFRESH_OPERATION,
};

use crate::cli::DiscoverArgs;
use crate::{commands, output};

pub async fn run(args: DiscoverArgs, config_path: Option<&Utf8Path>) -> Result<()> {
    let config = commands::load_config(config_path)?;
    let strategy = config
        .strategy_for(REFRESH_OPERATION)
        .with_classifier(SourceErrorClassifier);

    let refresher = Refresher::new(FileSource::new(args.file.clone())).with_strategy(strategy);
    let cancel = commands::ctrl_c_token();

    let Some(secs) = args.watch else {
        let snapshot = refresher.refresh(&cancel).await?;
        return print_snapshot(&snapshot, args.json);
    };

    let mut last: Option<Vec<Endpoint>> = None;
    refresher
        .run_periodic_with(Duration::from_secs(secs.max(1)), &cancel, |result| match result {
            Ok(snapshot) if last.as_ref() == Some(&snapshot.endpoints) => {
                tracing::debug!(sequence = snapshot.sequence, "endpoints unchanged");
            }
            Ok(snapshot) => {
                if let Err(e) = print_snapshot(snapshot, args.json) {
                    output::error(&format!("Failed to print endpoints: {}", e));
                }
                last = Some(snapshot.endpoints.clone());
            }
            Err(e) => output::warning(&format!("{} (keeping previous endpoints)", e)),
        })
        .await;

    Ok(())
}

fn print_snapshot(snapshot: &Snapshot, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(&snapshot.endpoints)?);
        return Ok(());
    }

    output::success(&format!(
        "{} endpoint(s), refresh #{}",
        snapshot.endpoints.len(),
        snapshot.sequence
    ));
    if let Some(at) = snapshot.refreshed_at {
        output::kv("Refreshed", &at.to_rfc3339());
    }
    for endpoint in &snapshot.endpoints {
        println!("  {}", endpoint);
    }

    Ok(())
}
