//! Blob store contract plus in-memory and filesystem backends
//!
//! Published catalog and signature artifacts are append/overwrite only;
//! nothing in the pipeline deletes published content. `delete` exists
//! for scratch cleanup by operators and tests.

use anyhow::Result;
use async_trait::async_trait;
use granary_core::Error;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

/// Blob store contract
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Upload a local file to the given key
    async fn upload(&self, local: &Path, key: &str, cache_control: Option<&str>) -> Result<()>;

    /// Download a key to a local file. Fails with
    /// [`granary_core::Error::BlobNotFound`] when the key is absent.
    async fn download(&self, key: &str, local: &Path) -> Result<()>;

    /// Whether a key exists
    async fn exists(&self, key: &str) -> Result<bool>;

    /// Remove a key
    async fn delete(&self, key: &str) -> Result<()>;
}

/// In-memory blob store with an upload log, for tests and embedding
#[derive(Default)]
pub struct MemoryBlobStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    uploads: Mutex<Vec<String>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store bytes directly under a key
    pub fn put_bytes(&self, key: impl Into<String>, bytes: Vec<u8>) {
        self.objects.lock().expect("poisoned").insert(key.into(), bytes);
    }

    /// Read bytes stored under a key
    pub fn get_bytes(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.lock().expect("poisoned").get(key).cloned()
    }

    /// Keys uploaded through the trait, in order
    pub fn upload_log(&self) -> Vec<String> {
        self.uploads.lock().expect("poisoned").clone()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn upload(&self, local: &Path, key: &str, _cache_control: Option<&str>) -> Result<()> {
        let bytes = std::fs::read(local)?;
        self.objects
            .lock()
            .expect("poisoned")
            .insert(key.to_string(), bytes);
        self.uploads.lock().expect("poisoned").push(key.to_string());
        Ok(())
    }

    async fn download(&self, key: &str, local: &Path) -> Result<()> {
        let bytes = self
            .get_bytes(key)
            .ok_or_else(|| Error::blob_not_found(key))?;
        if let Some(parent) = local.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(local, bytes)?;
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.objects.lock().expect("poisoned").contains_key(key))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.objects.lock().expect("poisoned").remove(key);
        Ok(())
    }
}

/// Filesystem blob store rooted at a directory
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(key.trim_start_matches('/'))
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn upload(&self, local: &Path, key: &str, _cache_control: Option<&str>) -> Result<()> {
        let dest = self.path_for(key);
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        debug!("Copying {:?} to {:?}", local, dest);
        std::fs::copy(local, &dest)?;
        Ok(())
    }

    async fn download(&self, key: &str, local: &Path) -> Result<()> {
        let src = self.path_for(key);
        if !src.exists() {
            return Err(Error::blob_not_found(key).into());
        }
        if let Some(parent) = local.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::copy(&src, local)?;
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.path_for(key).exists())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.path_for(key);
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }
}
