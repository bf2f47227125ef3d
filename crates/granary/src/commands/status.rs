//! Status command

use anyhow::Result;
use camino::Utf8Path;
use granary_core::config::GranaryConfig;
use granary_core::types::StatusRecord;

use crate::cli::StatusArgs;
use crate::commands::{record_store, STATUS_TABLE};
use crate::output;

pub async fn run(args: StatusArgs, config_path: Option<&Utf8Path>) -> Result<()> {
    // Load config
    let config = GranaryConfig::load(config_path)?;

    let store = record_store(&config, STATUS_TABLE, "api_version")?;
    let Some(value) = store.get(&config.api_version).await? else {
        output::info(&format!(
            "No catalog has been published for API version {}",
            config.api_version
        ));
        return Ok(());
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    let status = StatusRecord::from_value(&value)?;
    output::header(&format!("Catalog v{}", status.api_version));
    output::kv("State", &status.state);
    output::kv("Updated", &status.timestamp);
    output::kv("URL", &status.catalog_url);

    if !status.is_complete() {
        output::warning("The last aggregation run left the catalog incomplete");
    }
    Ok(())
}
