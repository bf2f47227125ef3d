//! Configuration file loading and parsing
//!
//! Granary reads a single `granary.yaml` describing the API version, the
//! CDN/API endpoints, which hostnames count as "our" storage, and the
//! store/signing wiring. The file is searched upward from the working
//! directory unless an explicit path is given.

use crate::error::{Error, Result};
use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use std::fs;
use url::Url;

/// Configuration file names to search for
const CONFIG_FILE_NAMES: &[&str] = &["granary.yaml", "granary.yml"];

/// Default consecutive-failure count before an alert fires
pub const DEFAULT_ERROR_THRESHOLD: u32 = 4;

/// Signer key material locations
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SigningConfig {
    /// Private signing key (PEM)
    #[serde(default)]
    pub pem_path: Option<Utf8PathBuf>,

    /// Public verifying key (PEM)
    #[serde(default)]
    pub verifying_key_path: Option<Utf8PathBuf>,

    /// Issuer id recorded in the signature payload (`si` entry)
    #[serde(default = "default_key_id")]
    pub key_id: String,
}

fn default_key_id() -> String {
    "primary".to_string()
}

/// Loaded Granary configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GranaryConfig {
    /// Catalog API version, used to build `v<version>/catalog.json`
    pub api_version: String,

    /// Public base URL of the content CDN (no trailing slash)
    pub cdn_url: String,

    /// Public base URL of the catalog API (no trailing slash)
    pub api_url: String,

    /// Bucket holding published content and signatures
    pub cdn_bucket: String,

    /// Bucket holding the published catalog document
    pub api_bucket: String,

    /// Hostnames treated as locally hosted storage. Artifacts on other
    /// hosts are exempt from the local-signature requirement and are
    /// never downloaded for signing. A staging deployment that mirrors
    /// production lists the production hostnames here too.
    #[serde(default)]
    pub local_hosts: Vec<String>,

    /// Consecutive failed aggregation runs tolerated before alerting
    #[serde(default = "default_error_threshold")]
    pub error_threshold: u32,

    /// Directory holding the record tables (file-backed record store)
    #[serde(default)]
    pub records_dir: Option<Utf8PathBuf>,

    /// Root directory for the filesystem blob store (used when no S3
    /// region is configured)
    #[serde(default)]
    pub blob_root: Option<Utf8PathBuf>,

    /// AWS region for the S3 blob store
    #[serde(default)]
    pub s3_region: Option<String>,

    /// Custom S3 endpoint (MinIO and other S3-compatible storage)
    #[serde(default)]
    pub s3_endpoint: Option<String>,

    /// Signer key material
    #[serde(default)]
    pub signing: SigningConfig,
}

fn default_error_threshold() -> u32 {
    DEFAULT_ERROR_THRESHOLD
}

impl GranaryConfig {
    /// Load configuration from the specified path or search for it
    pub fn load(path: Option<&Utf8Path>) -> Result<Self> {
        let (config_path, content) = if let Some(p) = path {
            let content = fs::read_to_string(p).map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    Error::config_not_found(p.as_str())
                } else {
                    Error::Io(e)
                }
            })?;
            (p.to_owned(), content)
        } else {
            Self::find_config()?
        };

        tracing::debug!("Loaded configuration from {}", config_path);

        let mut config: GranaryConfig = serde_yaml_ng::from_str(&content)?;
        config.normalize();
        config.validate()?;
        Ok(config)
    }

    /// Search for a config file upward from the current directory
    fn find_config() -> Result<(Utf8PathBuf, String)> {
        let cwd = std::env::current_dir()?;
        let mut dir = Utf8PathBuf::from_path_buf(cwd)
            .map_err(|p| Error::invalid_config(format!("non UTF-8 working directory: {:?}", p)))?;

        loop {
            for name in CONFIG_FILE_NAMES {
                let candidate = dir.join(name);
                if candidate.exists() {
                    let content = fs::read_to_string(&candidate)?;
                    return Ok((candidate, content));
                }
            }
            if !dir.pop() {
                return Err(Error::config_not_found(CONFIG_FILE_NAMES[0]));
            }
        }
    }

    /// Strip trailing slashes from public URLs
    fn normalize(&mut self) {
        self.cdn_url = self.cdn_url.trim_end_matches('/').to_string();
        self.api_url = self.api_url.trim_end_matches('/').to_string();
    }

    fn validate(&self) -> Result<()> {
        if self.api_version.is_empty() {
            return Err(Error::missing_field("api_version"));
        }
        if self.cdn_url.is_empty() {
            return Err(Error::missing_field("cdn_url"));
        }
        if self.api_url.is_empty() {
            return Err(Error::missing_field("api_url"));
        }
        Ok(())
    }

    /// Blob store key of the published catalog document
    pub fn catalog_key(&self) -> String {
        format!("v{}/catalog.json", self.api_version)
    }

    /// Public URL of the published catalog document
    pub fn catalog_url(&self) -> String {
        format!("{}/{}", self.api_url, self.catalog_key())
    }

    /// Whether a URL points at storage we host (by hostname allow-list)
    pub fn is_local_url(&self, url: &str) -> bool {
        match Url::parse(url) {
            Ok(parsed) => parsed
                .host_str()
                .map(|host| self.local_hosts.iter().any(|h| h == host))
                .unwrap_or(false),
            Err(_) => false,
        }
    }

    /// Whether a URL is served from the content CDN
    pub fn is_cdn_url(&self, url: &str) -> bool {
        url.starts_with(&self.cdn_url)
    }

    /// CDN object key for a URL under `cdn_url`
    pub fn cdn_key(&self, url: &str) -> String {
        url[self.cdn_url.len()..].trim_start_matches('/').to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_yaml() -> &'static str {
        r#"
api_version: "3"
cdn_url: https://cdn.example.org/
api_url: https://api.example.org
cdn_bucket: example-cdn
api_bucket: example-api
local_hosts:
  - cdn.example.org
  - api.example.org
"#
    }

    fn load_sample() -> GranaryConfig {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("granary.yaml");
        std::fs::write(&path, sample_yaml()).unwrap();
        GranaryConfig::load(Some(Utf8Path::new(path.to_str().unwrap()))).unwrap()
    }

    #[test]
    fn trailing_slash_is_stripped() {
        let config = load_sample();
        assert_eq!(config.cdn_url, "https://cdn.example.org");
    }

    #[test]
    fn catalog_paths() {
        let config = load_sample();
        assert_eq!(config.catalog_key(), "v3/catalog.json");
        assert_eq!(config.catalog_url(), "https://api.example.org/v3/catalog.json");
    }

    #[test]
    fn local_url_detection_is_host_based() {
        let config = load_sample();
        assert!(config.is_local_url("https://cdn.example.org/en/obs/v1/obs.zip"));
        assert!(!config.is_local_url("https://thirdparty.example.com/obs.zip"));
        assert!(!config.is_local_url("not a url"));
    }

    #[test]
    fn cdn_key_strips_base_url() {
        let config = load_sample();
        assert_eq!(
            config.cdn_key("https://cdn.example.org/en/obs/v1/obs.zip"),
            "en/obs/v1/obs.zip"
        );
    }

    #[test]
    fn threshold_defaults_to_four() {
        let config = load_sample();
        assert_eq!(config.error_threshold, 4);
    }

    #[test]
    fn missing_file_is_config_not_found() {
        let err = GranaryConfig::load(Some(Utf8Path::new("/nonexistent/granary.yaml")))
            .expect_err("should fail");
        assert!(matches!(err, Error::ConfigNotFound { .. }));
    }
}
