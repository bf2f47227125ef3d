//! Web client: reachability probe, HEAD metadata and artifact download
//!
//! `exists` implements the probe contract: a URL resolves iff a HEAD
//! request yields success (200) or a permanent redirect (301). Redirects
//! are deliberately not followed for probing, so a 301 counts as
//! reachable without chasing the target.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use granary_core::time::parse_http_date;
use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;
use tracing::debug;

/// Metadata from a HEAD request
#[derive(Debug, Clone, Default)]
pub struct UrlInfo {
    pub content_length: Option<u64>,
    pub last_modified: Option<DateTime<Utc>>,
}

/// Web client contract
#[async_trait]
pub trait WebClient: Send + Sync {
    /// Whether the URL resolves (HEAD yields 200 or 301)
    async fn exists(&self, url: &str) -> bool;

    /// HEAD metadata for the URL
    async fn head(&self, url: &str) -> Result<UrlInfo>;

    /// Download the URL to a local file
    async fn download(&self, url: &str, dest: &Path) -> Result<()>;
}

/// Timeout applied to probe/HEAD requests
const HEAD_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout applied to artifact downloads; a hung transfer must not
/// stall the whole batch
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(600);

/// reqwest-backed web client
pub struct HttpClient {
    /// Probe client: no redirect following, so 301 is observable
    head_client: reqwest::Client,
    /// Transfer client: follows redirects
    client: reqwest::Client,
}

impl HttpClient {
    pub fn new() -> Result<Self> {
        let head_client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(HEAD_TIMEOUT)
            .build()
            .context("Failed to create probe client")?;
        let client = reqwest::Client::builder()
            .timeout(DOWNLOAD_TIMEOUT)
            .build()
            .context("Failed to create transfer client")?;
        Ok(Self { head_client, client })
    }
}

#[async_trait]
impl WebClient for HttpClient {
    async fn exists(&self, url: &str) -> bool {
        match self.head_client.head(url).send().await {
            Ok(response) => {
                let status = response.status().as_u16();
                status == 200 || status == 301
            }
            Err(e) => {
                debug!("HEAD {} failed: {}", url, e);
                false
            }
        }
    }

    async fn head(&self, url: &str) -> Result<UrlInfo> {
        let response = self
            .head_client
            .head(url)
            .send()
            .await
            .with_context(|| format!("HEAD request failed for {}", url))?;

        let content_length = response
            .headers()
            .get(reqwest::header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        let last_modified = response
            .headers()
            .get(reqwest::header::LAST_MODIFIED)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_http_date);

        Ok(UrlInfo {
            content_length,
            last_modified,
        })
    }

    async fn download(&self, url: &str, dest: &Path) -> Result<()> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("Failed to request {}", url))?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "Download of {} failed with status {}",
                url,
                response.status()
            ));
        }

        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = std::fs::File::create(dest)
            .with_context(|| format!("Failed to create {:?}", dest))?;

        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.context("Failed to read download chunk")?;
            file.write_all(&chunk)?;
        }

        debug!("Downloaded {} to {:?}", url, dest);
        Ok(())
    }
}

/// Scripted web client for tests: URLs resolve unless declared missing,
/// HEAD metadata and bodies are configurable, and every request is
/// logged so tests can assert no network I/O happened.
#[derive(Default)]
pub struct StaticWeb {
    missing: HashSet<String>,
    sizes: HashMap<String, u64>,
    bodies: HashMap<String, Vec<u8>>,
    requests: Mutex<Vec<String>>,
}

impl StaticWeb {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a URL unreachable
    pub fn with_missing(mut self, url: impl Into<String>) -> Self {
        self.missing.insert(url.into());
        self
    }

    /// Declare a HEAD content length for a URL
    pub fn with_size(mut self, url: impl Into<String>, size: u64) -> Self {
        self.sizes.insert(url.into(), size);
        self
    }

    /// Declare a downloadable body for a URL
    pub fn with_body(mut self, url: impl Into<String>, body: Vec<u8>) -> Self {
        self.bodies.insert(url.into(), body);
        self
    }

    /// All requests made, in order, as `"<METHOD> <url>"`
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().expect("poisoned").clone()
    }

    /// Number of GET downloads performed
    pub fn download_count(&self) -> usize {
        self.requests()
            .iter()
            .filter(|r| r.starts_with("GET "))
            .count()
    }

    fn log(&self, method: &str, url: &str) {
        self.requests
            .lock()
            .expect("poisoned")
            .push(format!("{} {}", method, url));
    }
}

#[async_trait]
impl WebClient for StaticWeb {
    async fn exists(&self, url: &str) -> bool {
        self.log("HEAD", url);
        !self.missing.contains(url)
    }

    async fn head(&self, url: &str) -> Result<UrlInfo> {
        self.log("HEAD", url);
        if self.missing.contains(url) {
            return Err(anyhow!("HEAD request failed for {}", url));
        }
        let content_length = self
            .sizes
            .get(url)
            .copied()
            .or_else(|| self.bodies.get(url).map(|b| b.len() as u64));
        Ok(UrlInfo {
            content_length,
            last_modified: None,
        })
    }

    async fn download(&self, url: &str, dest: &Path) -> Result<()> {
        self.log("GET", url);
        if self.missing.contains(url) {
            return Err(anyhow!("Download of {} failed", url));
        }
        let body = self
            .bodies
            .get(url)
            .cloned()
            .unwrap_or_else(|| b"content".to_vec());
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(dest, body)?;
        Ok(())
    }
}
