//! S3 blob store
//!
//! Supports AWS S3 and S3-compatible storage (MinIO, Wasabi,
//! DigitalOcean Spaces) via a custom endpoint.

use crate::blob::BlobStore;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use std::path::Path;
use tracing::debug;

/// Blob store backed by an S3 bucket
pub struct S3BlobStore {
    client: Client,
    bucket: String,
}

impl S3BlobStore {
    /// Create a store for the given bucket with explicit region and
    /// optional custom endpoint
    pub async fn new(bucket: String, region: &str, endpoint: Option<&str>) -> Result<Self> {
        let client = Self::create_client(region, endpoint).await?;
        Ok(Self { client, bucket })
    }

    async fn create_client(region: &str, endpoint: Option<&str>) -> Result<Client> {
        let region = Region::new(region.to_string());

        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(region)
            .load()
            .await;

        let mut s3_config_builder = aws_sdk_s3::config::Builder::from(&sdk_config);

        // Custom endpoint for S3-compatible storage
        if let Some(endpoint_url) = endpoint {
            debug!("Using custom S3 endpoint: {}", endpoint_url);
            s3_config_builder = s3_config_builder
                .endpoint_url(endpoint_url)
                .force_path_style(true); // Required for MinIO and many S3-compatible services
        }

        let s3_config = s3_config_builder.build();
        Ok(Client::from_conf(s3_config))
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

impl std::fmt::Debug for S3BlobStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3BlobStore")
            .field("bucket", &self.bucket)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn upload(&self, local: &Path, key: &str, cache_control: Option<&str>) -> Result<()> {
        let body = ByteStream::from_path(local)
            .await
            .with_context(|| format!("Failed to read {:?}", local))?;

        let mut request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(body);
        if let Some(cache) = cache_control {
            request = request.cache_control(cache);
        }

        request
            .send()
            .await
            .with_context(|| format!("Failed to upload {} to bucket {}", key, self.bucket))?;

        debug!("Uploaded {:?} to s3://{}/{}", local, self.bucket, key);
        Ok(())
    }

    async fn download(&self, key: &str, dest: &Path) -> Result<()> {
        let response = match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                let service_error = e.into_service_error();
                if service_error.is_no_such_key() {
                    return Err(granary_core::Error::blob_not_found(key).into());
                }
                return Err(anyhow!(
                    "Failed to download {} from bucket {}: {}",
                    key,
                    self.bucket,
                    service_error
                ));
            }
        };

        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let bytes = response
            .body
            .collect()
            .await
            .with_context(|| format!("Failed to read body of {}", key))?;
        std::fs::write(dest, bytes.into_bytes())
            .with_context(|| format!("Failed to write {:?}", dest))?;

        debug!("Downloaded s3://{}/{} to {:?}", self.bucket, key, dest);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) => {
                let service_error = e.into_service_error();
                if service_error.is_not_found() {
                    Ok(false)
                } else {
                    Err(anyhow!(
                        "Failed to check {} in bucket {}: {}",
                        key,
                        self.bucket,
                        service_error
                    ))
                }
            }
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .with_context(|| format!("Failed to delete {} from bucket {}", key, self.bucket))?;

        debug!("Deleted s3://{}/{}", self.bucket, key);
        Ok(())
    }
}
