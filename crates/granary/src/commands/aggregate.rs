//! Aggregate command

use std::sync::Arc;

use anyhow::{anyhow, Result};
use camino::Utf8Path;
use granary_catalog::{CatalogAggregator, ErrorTracker, LogAlertSink};
use granary_core::config::GranaryConfig;
use granary_stores::HttpClient;

use crate::cli::AggregateArgs;
use crate::commands::{blob_store, record_store, ERRORS_TABLE, PROGRESS_TABLE, STATUS_TABLE};
use crate::output;

pub async fn run(args: AggregateArgs, config_path: Option<&Utf8Path>) -> Result<()> {
    // Load config
    let mut config = GranaryConfig::load(config_path)?;
    if let Some(dir) = args.records_dir.clone() {
        config.records_dir = Some(dir);
    }
    if let Some(root) = args.blob_root.clone() {
        config.blob_root = Some(root);
        config.s3_region = None;
    }

    let progress = record_store(&config, PROGRESS_TABLE, "repo_name")?;
    let status = record_store(&config, STATUS_TABLE, "api_version")?;
    let errors = record_store(&config, ERRORS_TABLE, "reporter")?;
    let blobs = blob_store(&config, &config.api_bucket).await?;
    let web = Arc::new(HttpClient::new()?);

    let tracker = ErrorTracker::new(
        errors,
        Arc::new(LogAlertSink),
        "catalog",
        config.error_threshold,
    );
    let aggregator = CatalogAggregator::new(config, progress, status, blobs, web, tracker);

    let response = aggregator.run().await?;

    if args.json {
        if let Some(catalog) = &response.catalog {
            println!("{}", catalog.to_sorted_json()?);
        }
    }

    if !response.success {
        output::error(&response.message);
        return Err(anyhow!("catalog was not published"));
    }
    if response.incomplete {
        output::warning("Some package records failed their consistency checks");
    }
    output::success(&response.message);
    Ok(())
}
