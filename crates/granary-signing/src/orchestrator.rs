//! Signing orchestration over unsigned package records
//!
//! Each artifact runs a small state machine: already-signed formats are
//! skipped with zero I/O, third-party hosted and oversized artifacts
//! get a synthesized signature location without a download, everything
//! else is downloaded, signed, verified and uploaded together with its
//! signature. Per-record bookkeeping happens only after that record's
//! artifacts are fully processed, so a killed run resumes cleanly.

use crate::signer::ContentSigner;
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use granary_core::time::{iso_timestamp, now_timestamp};
use granary_core::types::{is_sentinel_repo, Format, Manifest, PackageRecord};
use granary_core::{mime, GranaryConfig};
use granary_stores::{BlobStore, Filter, RecordStore, WebClient};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Artifacts above this byte count are never downloaded; their
/// signatures are supplied out-of-band
pub const MAX_FILE_SIZE: u64 = 400_000_000;

/// How one artifact left the state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatOutcome {
    /// The artifact already carried a signature on entry
    pub already_signed: bool,
    /// A signature location was produced this run
    pub newly_signed: bool,
}

impl FormatOutcome {
    fn settled(&self) -> bool {
        self.already_signed || self.newly_signed
    }
}

/// Walks unsigned records and signs their artifacts
pub struct SigningOrchestrator {
    config: GranaryConfig,
    records: Arc<dyn RecordStore>,
    cdn: Arc<dyn BlobStore>,
    web: Arc<dyn WebClient>,
    signer: Arc<dyn ContentSigner>,
}

impl SigningOrchestrator {
    pub fn new(
        config: GranaryConfig,
        records: Arc<dyn RecordStore>,
        cdn: Arc<dyn BlobStore>,
        web: Arc<dyn WebClient>,
        signer: Arc<dyn ContentSigner>,
    ) -> Self {
        Self {
            config,
            records,
            cdn,
            web,
            signer,
        }
    }

    /// Process every unsigned record once. Returns whether any
    /// signable records were found, which is distinct from having made
    /// progress. Sentinel records never count as work.
    pub async fn run(&self) -> Result<bool> {
        let filter = Filter::new().eq("signed", false);
        let items = self
            .records
            .query(Some(&filter))
            .await
            .context("Failed to query unsigned records")?;

        let scratch = tempfile::tempdir().context("Failed to create scratch directory")?;

        let mut found = false;
        for item in &items {
            let record = match PackageRecord::from_value(item) {
                Ok(record) => record,
                Err(e) => {
                    warn!("Skipping malformed record: {}", e);
                    continue;
                }
            };
            if is_sentinel_repo(&record.repo_name) {
                continue;
            }
            found = true;
            let manifest = match Manifest::from_json(&record.package) {
                Ok(manifest) => manifest,
                Err(e) => {
                    warn!("Skipping {}. Bad manifest: {}", record.repo_name, e);
                    continue;
                }
            };
            self.process_record(&record, manifest, scratch.path()).await?;
        }

        if !found {
            info!("No items found for signing");
        }
        Ok(found)
    }

    /// Run the state machine over every artifact of one record and
    /// write the record back if anything settled
    async fn process_record(
        &self,
        record: &PackageRecord,
        mut manifest: Manifest,
        scratch: &Path,
    ) -> Result<()> {
        info!("Processing {}", record.repo_name);
        let mut was_signed = false;
        let mut fully_signed = true;

        if let Some(formats) = manifest.formats.as_mut() {
            for format in formats {
                let outcome = self.process_format(record, format, scratch).await;
                was_signed |= outcome.newly_signed;
                fully_signed &= outcome.settled();
            }
        }

        for project in manifest.projects.iter_mut() {
            let Some(formats) = project.formats.as_mut() else {
                continue;
            };
            for format in formats {
                let outcome = self.process_format(record, format, scratch).await;
                was_signed |= outcome.newly_signed;
                fully_signed &= outcome.settled();

                if let Some(chapters) = format.chapters.take() {
                    let mut kept = Vec::with_capacity(chapters.len());
                    for mut chapter in chapters {
                        // chapters without a resolving url are dropped,
                        // not retried
                        if chapter.url.is_empty() || !self.web.exists(&chapter.url).await {
                            warn!(
                                "Skipping chapter {}:{}, missing url {}",
                                project.identifier,
                                chapter.identifier.as_deref().unwrap_or("?"),
                                if chapter.url.is_empty() { "(empty)" } else { &chapter.url }
                            );
                            continue;
                        }
                        let outcome = self.process_format(record, &mut chapter, scratch).await;
                        was_signed |= outcome.newly_signed;
                        fully_signed &= outcome.settled();
                        kept.push(chapter);
                    }
                    apply_chapter_content_tag(format, &kept);
                    format.chapters = Some(kept);
                }
            }
        }

        if was_signed || fully_signed {
            info!("Recording signatures for {}", record.repo_name);
            let mut fields = Map::new();
            fields.insert(
                "package".to_string(),
                Value::String(manifest.to_sorted_json()?),
            );
            fields.insert("signed".to_string(), Value::Bool(fully_signed));
            self.records
                .update(&record.repo_name, fields)
                .await
                .with_context(|| format!("Failed to update record {}", record.repo_name))?;
        }
        Ok(())
    }

    /// Per-artifact state machine
    pub async fn process_format(
        &self,
        record: &PackageRecord,
        format: &mut Format,
        scratch: &Path,
    ) -> FormatOutcome {
        if format.is_signed() {
            return FormatOutcome {
                already_signed: true,
                newly_signed: false,
            };
        }
        if format.url.is_empty() {
            warn!("{}: cannot sign a format without a url", record.repo_name);
            return FormatOutcome {
                already_signed: false,
                newly_signed: false,
            };
        }
        info!("Signing {}", format.url);

        // third-party hosting: the provider supplies the signature
        if !self.config.is_cdn_url(&format.url) {
            format.signature = format!("{}.sig", format.url);
            warn!(
                "Cannot sign files outside the cdn. The hosting provider should upload {}",
                format.signature
            );
            return FormatOutcome {
                already_signed: true,
                newly_signed: true,
            };
        }

        match self.sign_artifact(record, format, scratch).await {
            Ok(newly_signed) => FormatOutcome {
                already_signed: false,
                newly_signed,
            },
            Err(e) => {
                warn!("{}: {}", format.url, e);
                FormatOutcome {
                    already_signed: false,
                    newly_signed: false,
                }
            }
        }
    }

    /// Download, sign, verify and upload one cdn-hosted artifact.
    /// Any failure leaves the signature empty and is retried next run.
    async fn sign_artifact(
        &self,
        record: &PackageRecord,
        format: &mut Format,
        scratch: &Path,
    ) -> Result<bool> {
        let headers = self
            .web
            .head(&format.url)
            .await
            .context("Failed to read headers")?;

        let size = headers.content_length.unwrap_or(0);
        if size > MAX_FILE_SIZE {
            // too large to stage locally; the signature is added
            // out-of-band so the catalog still builds
            warn!("File is too large to sign: {}", format.url);
            format.size = size;
            if format.modified.is_empty() {
                format.modified = now_timestamp();
            }
            format.signature = format!("{}.sig", format.url);
            return Ok(true);
        }

        let src_key = self.config.cdn_key(&format.url);
        let sig_key = format!("{}.sig", src_key);
        let base_name = format
            .url
            .rsplit('/')
            .next()
            .ok_or_else(|| anyhow!("url has no file name"))?;
        let file_to_sign = scratch.join(base_name);

        let build_rules = format.build_rules_for("signing");
        let sign_given_url = build_rules.iter().any(|r| r == "sign_given_url");
        if sign_given_url {
            self.web
                .download(&format.url, &file_to_sign)
                .await
                .context("The file could not be downloaded")?;
        } else {
            // staged content waits under an immutable temp key
            let src_temp_key = format!(
                "temp/{}/{}/{}",
                record.repo_name, record.commit_id, src_key
            );
            self.cdn
                .download(&src_temp_key, &file_to_sign)
                .await
                .context("The file could not be downloaded")?;
        }

        let sig_file = self.signer.sign_file(&file_to_sign)?;
        self.signer
            .verify_signature(&file_to_sign, &sig_file)
            .context("The signature was not successfully verified")?;

        if !sign_given_url {
            self.cdn
                .upload(&file_to_sign, &src_key, None)
                .await
                .context("Failed to upload content")?;
        }
        self.cdn
            .upload(&sig_file, &sig_key, None)
            .await
            .context("Failed to upload signature")?;

        format.signature = format!("{}.sig", format.url);

        let stats = std::fs::metadata(&file_to_sign)?;
        if format.modified.is_empty() {
            format.modified = match headers.last_modified {
                Some(modified) => iso_timestamp(modified),
                None => iso_timestamp(DateTime::<Utc>::from(stats.modified()?)),
            };
        }
        format.size = stats.len();

        if format.format.is_empty() {
            if let Some(mime) = mime::from_path(&file_to_sign) {
                format.format = mime.to_string();
            }
        }

        remove_scratch(&file_to_sign);
        remove_scratch(&sig_file);
        Ok(true)
    }
}

fn remove_scratch(path: &PathBuf) {
    if let Err(e) = std::fs::remove_file(path) {
        warn!("Failed to remove scratch file {:?}: {}", path, e);
    }
}

/// Zipped chapter media carries the media type on the parent tag. When
/// the kept chapters are homogeneous mp3/mp4 and the tag has no
/// `content=` qualifier yet, fill it in.
fn apply_chapter_content_tag(format: &mut Format, chapters: &[Format]) {
    let Some(first) = chapters.first() else {
        return;
    };
    if format.format.contains("content=") || !format.url.ends_with("zip") {
        return;
    }
    if first.url.ends_with(".mp3") && chapters.iter().all(|c| c.url.ends_with(".mp3")) {
        format.format = "application/zip; content=audio/mp3".to_string();
    } else if first.url.ends_with(".mp4") && chapters.iter().all(|c| c.url.ends_with(".mp4")) {
        format.format = "application/zip; content=video/mp4".to_string();
    }
}
