//! CLI subcommands

pub mod aggregate;
pub mod sign;
pub mod status;

use std::sync::Arc;

use anyhow::{anyhow, Result};
use camino::Utf8PathBuf;
use granary_core::config::GranaryConfig;
use granary_stores::{BlobStore, FsBlobStore, FsRecordStore, RecordStore, S3BlobStore};

/// Names of the on-disk record tables under `records_dir`.
pub const PROGRESS_TABLE: &str = "progress";
pub const STATUS_TABLE: &str = "status";
pub const ERRORS_TABLE: &str = "errors";

fn records_dir(config: &GranaryConfig) -> Result<&Utf8PathBuf> {
    config
        .records_dir
        .as_ref()
        .ok_or_else(|| anyhow!("records_dir is not configured"))
}

/// Open a record table stored under `records_dir`.
pub fn record_store(
    config: &GranaryConfig,
    table: &str,
    key_attr: &str,
) -> Result<Arc<dyn RecordStore>> {
    let dir = records_dir(config)?.join(table);
    Ok(Arc::new(FsRecordStore::new(dir, key_attr)?))
}

/// Open the blob store backing `bucket`.
///
/// Uses S3 when a region is configured, otherwise a directory under
/// `blob_root` named after the bucket.
pub async fn blob_store(config: &GranaryConfig, bucket: &str) -> Result<Arc<dyn BlobStore>> {
    if let Some(region) = &config.s3_region {
        let store =
            S3BlobStore::new(bucket.to_string(), region, config.s3_endpoint.as_deref()).await?;
        return Ok(Arc::new(store));
    }
    let root = config
        .blob_root
        .as_ref()
        .ok_or_else(|| anyhow!("neither s3_region nor blob_root is configured"))?;
    Ok(Arc::new(FsBlobStore::new(root.join(bucket))?))
}
