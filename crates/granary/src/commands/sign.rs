//! Sign command

use std::sync::Arc;

use anyhow::Result;
use camino::Utf8Path;
use granary_core::config::GranaryConfig;
use granary_signing::{OpensslSigner, SigningOrchestrator};
use granary_stores::HttpClient;

use crate::cli::SignArgs;
use crate::commands::{blob_store, record_store, PROGRESS_TABLE};
use crate::output;

pub async fn run(_args: SignArgs, config_path: Option<&Utf8Path>) -> Result<()> {
    // Load config
    let config = GranaryConfig::load(config_path)?;

    let records = record_store(&config, PROGRESS_TABLE, "repo_name")?;
    let cdn = blob_store(&config, &config.cdn_bucket).await?;
    let web = Arc::new(HttpClient::new()?);
    let signer = Arc::new(OpensslSigner::new(&config.signing)?);

    let orchestrator = SigningOrchestrator::new(config, records, cdn, web, signer);
    let found = orchestrator.run().await?;

    if found {
        output::success("Signing run complete");
    } else {
        output::info("No records waiting for signatures");
    }
    Ok(())
}
