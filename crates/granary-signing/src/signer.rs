//! Detached content signatures
//!
//! Signing shells out to `openssl dgst -sha384`. The signature artifact
//! written next to the content is a JSON array of `{si, sig}` entries,
//! where `si` names the issuing key and `sig` is the base64-encoded raw
//! signature. Verification decodes the matching entry and runs the
//! round trip with the public key, so a bad signature never goes live.

use anyhow::{anyhow, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use camino::Utf8PathBuf;
use granary_core::config::SigningConfig;
use granary_core::Error;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::debug;

/// One entry in a signature payload
#[derive(Debug, Serialize, Deserialize)]
pub struct SignatureEntry {
    /// Issuer id of the signing key
    pub si: String,
    /// Base64 encoded raw signature
    pub sig: String,
}

/// Produces and verifies detached signatures
pub trait ContentSigner: Send + Sync {
    /// Sign a file, returning the path of the signature artifact
    fn sign_file(&self, path: &Path) -> Result<PathBuf>;

    /// Verify that content and signature belong together
    fn verify_signature(&self, content: &Path, signature: &Path) -> Result<()>;
}

/// Signer backed by the `openssl` binary
#[derive(Debug)]
pub struct OpensslSigner {
    pem_path: Utf8PathBuf,
    verifying_key_path: Utf8PathBuf,
    key_id: String,
}

impl OpensslSigner {
    pub fn new(config: &SigningConfig) -> Result<Self> {
        which::which("openssl").context("openssl binary not found on PATH")?;
        let pem_path = config
            .pem_path
            .clone()
            .ok_or_else(|| anyhow!("signing.pem_path is not configured"))?;
        let verifying_key_path = config
            .verifying_key_path
            .clone()
            .ok_or_else(|| anyhow!("signing.verifying_key_path is not configured"))?;
        Ok(Self {
            pem_path,
            verifying_key_path,
            key_id: config.key_id.clone(),
        })
    }

    fn run_openssl(args: &[&str]) -> Result<()> {
        let output = Command::new("openssl")
            .args(args)
            .output()
            .context("Failed to run openssl")?;
        if !output.status.success() {
            return Err(Error::signing(String::from_utf8_lossy(&output.stderr).trim()).into());
        }
        Ok(())
    }
}

impl ContentSigner for OpensslSigner {
    fn sign_file(&self, path: &Path) -> Result<PathBuf> {
        let path_str = path
            .to_str()
            .ok_or_else(|| anyhow!("non UTF-8 path: {:?}", path))?;
        let raw_sig = format!("{}.sha384", path_str);

        Self::run_openssl(&[
            "dgst",
            "-sha384",
            "-sign",
            self.pem_path.as_str(),
            "-out",
            &raw_sig,
            path_str,
        ])?;

        let signature = std::fs::read(&raw_sig)?;
        std::fs::remove_file(&raw_sig)?;

        let payload = vec![SignatureEntry {
            si: self.key_id.clone(),
            sig: BASE64.encode(signature),
        }];
        let sig_file = PathBuf::from(format!("{}.sig", path_str));
        std::fs::write(&sig_file, serde_json::to_string(&payload)?)?;

        debug!("Signed {} as {:?}", path_str, sig_file);
        Ok(sig_file)
    }

    fn verify_signature(&self, content: &Path, signature: &Path) -> Result<()> {
        let payload: Vec<SignatureEntry> =
            serde_json::from_str(&std::fs::read_to_string(signature)?)
                .context("Malformed signature payload")?;
        let entry = payload
            .iter()
            .find(|e| e.si == self.key_id)
            .ok_or_else(|| anyhow!("no '{}' entry in signature payload", self.key_id))?;
        let raw = BASE64
            .decode(&entry.sig)
            .context("Signature is not valid base64")?;

        let dir = tempfile::tempdir()?;
        let raw_path = dir.path().join("signature.raw");
        std::fs::write(&raw_path, raw)?;

        let content_str = content
            .to_str()
            .ok_or_else(|| anyhow!("non UTF-8 path: {:?}", content))?;
        let raw_str = raw_path.to_str().expect("tempdir paths are UTF-8");

        let output = Command::new("openssl")
            .args([
                "dgst",
                "-sha384",
                "-verify",
                self.verifying_key_path.as_str(),
                "-signature",
                raw_str,
                content_str,
            ])
            .output()
            .context("Failed to run openssl")?;

        if output.status.success() {
            Ok(())
        } else {
            Err(Error::VerificationFailed.into())
        }
    }
}

/// Scripted signer for tests: writes a fixed payload, optionally
/// refuses to verify
#[derive(Default)]
pub struct StaticSigner {
    pub fail_verify: bool,
}

impl StaticSigner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_verify() -> Self {
        Self { fail_verify: true }
    }
}

impl ContentSigner for StaticSigner {
    fn sign_file(&self, path: &Path) -> Result<PathBuf> {
        let sig_file = PathBuf::from(format!("{}.sig", path.display()));
        let payload = vec![SignatureEntry {
            si: "test".to_string(),
            sig: BASE64.encode(b"signature"),
        }];
        std::fs::write(&sig_file, serde_json::to_string(&payload)?)?;
        Ok(sig_file)
    }

    fn verify_signature(&self, _content: &Path, _signature: &Path) -> Result<()> {
        if self.fail_verify {
            Err(Error::VerificationFailed.into())
        } else {
            Ok(())
        }
    }
}
