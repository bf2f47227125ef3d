//! Catalog aggregation engine
//!
//! Builds one merged catalog document from every package record,
//! entirely in memory, then publishes it only when the content differs
//! from what is already live. A malformed record is skipped, never
//! fatal; the status record distinguishes a clean publish from a
//! best-effort one.

use crate::checker::ConsistencyChecker;
use crate::reporter::ErrorTracker;
use anyhow::{Context, Result};
use granary_core::types::{
    CatalogDocument, CatalogProject, Format, LanguageRef, PackageRecord, Resource, StatusRecord,
};
use granary_core::{time::now_timestamp, GranaryConfig};
use granary_stores::{BlobStore, RecordStore, WebClient};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Outcome of one aggregation run
#[derive(Debug)]
pub struct AggregationResponse {
    pub success: bool,
    /// At least one record failed its consistency check
    pub incomplete: bool,
    pub message: String,
    /// The built document; absent when the run failed
    pub catalog: Option<CatalogDocument>,
}

/// Merges package records into the published catalog
pub struct CatalogAggregator {
    config: GranaryConfig,
    progress: Arc<dyn RecordStore>,
    status: Arc<dyn RecordStore>,
    blobs: Arc<dyn BlobStore>,
    web: Arc<dyn WebClient>,
    tracker: ErrorTracker,
}

impl CatalogAggregator {
    pub fn new(
        config: GranaryConfig,
        progress: Arc<dyn RecordStore>,
        status: Arc<dyn RecordStore>,
        blobs: Arc<dyn BlobStore>,
        web: Arc<dyn WebClient>,
        tracker: ErrorTracker,
    ) -> Self {
        Self {
            config,
            progress,
            status,
            blobs,
            web,
            tracker,
        }
    }

    /// Run one aggregation pass: build, compare, publish
    pub async fn run(&self) -> Result<AggregationResponse> {
        let items = self
            .progress
            .query(None)
            .await
            .context("Failed to query package records")?;

        let mut catalog = CatalogDocument::default();
        let mut checker = ConsistencyChecker::new(self.web.as_ref(), &self.config);
        let mut completed = 0usize;

        for item in &items {
            let record = match PackageRecord::from_value(item) {
                Ok(record) => record,
                Err(e) => {
                    warn!("Skipping malformed record: {}", e);
                    continue;
                }
            };

            match record.repo_name.as_str() {
                "catalogs" => match serde_json::from_str::<Value>(&record.package) {
                    Ok(package) => catalog.catalogs = Some(package),
                    Err(e) => warn!("Skipping catalogs payload. Bad package: {}", e),
                },
                "localization" => {
                    match serde_json::from_str::<Map<String, Value>>(&record.package) {
                        Ok(package) => build_localization(&mut catalog, &package),
                        Err(e) => warn!("Skipping localization payload. Bad package: {}", e),
                    }
                }
                "versification" => {
                    // stored but not merged into the catalog
                    debug!("Skipping versification payload");
                }
                _ => {
                    if self.build_resource(&mut catalog, &mut checker, &record).await {
                        completed += 1;
                    }
                }
            }
        }

        catalog.prune_empty_languages();

        let incomplete = !checker.all_errors.is_empty();
        let mut success = false;
        let mut message = String::new();

        if completed > 0 {
            let status = self.read_status().await;
            let unchanged = matches!(&status, Some(s) if s.is_complete())
                && !self.catalog_has_changed(&catalog).await;
            if unchanged {
                success = true;
                message = "No changes detected. Catalog not deployed".to_string();
            } else {
                let state = if incomplete {
                    StatusRecord::STATE_INCOMPLETE
                } else {
                    StatusRecord::STATE_COMPLETE
                };
                match self.publish(&catalog, state).await {
                    Ok(()) => {
                        success = true;
                        message = format!("Uploaded new catalog to {}", self.config.catalog_url());
                    }
                    Err(e) => {
                        checker.record_failure(format!("Unable to save catalog: {}", e));
                    }
                }
            }
        } else {
            checker.record_failure("There were no formats to process".to_string());
        }

        self.tracker.commit(&checker.all_errors).await?;

        if success {
            info!("{}", message);
            Ok(AggregationResponse {
                success,
                incomplete,
                message,
                catalog: Some(catalog),
            })
        } else {
            warn!("Catalog was not published due to errors");
            Ok(AggregationResponse {
                success,
                incomplete,
                message: checker.all_errors.join("; "),
                catalog: None,
            })
        }
    }

    /// Validate one resource record and merge it into the catalog.
    /// Returns whether the record contributed a resource.
    async fn build_resource(
        &self,
        catalog: &mut CatalogDocument,
        checker: &mut ConsistencyChecker<'_>,
        record: &PackageRecord,
    ) -> bool {
        let manifest = match checker.check(record) {
            Ok(manifest) => manifest,
            Err(_) => return false,
        };
        let dc = &manifest.dublin_core;
        let single_project = manifest.projects.len() == 1;

        // the placement invariant puts candidate formats on the project
        // for single-project resources and on the resource otherwise
        let candidates: Vec<Format> = if single_project {
            manifest.projects[0].formats.clone().unwrap_or_default()
        } else {
            manifest.formats.clone().unwrap_or_default()
        };

        let mut kept: Vec<Format> = Vec::new();
        for format in &candidates {
            let check = checker.check_format(format, record).await;
            if check.is_publishable() {
                kept.push(format.stripped());
            }
        }

        if kept.is_empty() {
            debug!("{}: no publishable formats", record.repo_name);
            return false;
        }

        if dc.format.contains("usfm3") {
            duplicate_usfm_formats(&mut kept);
        }

        // project formats on multi-project resources are published
        // as-is but still reachability-checked
        if !single_project {
            for project in &manifest.projects {
                for format in project.formats.as_deref().unwrap_or_default() {
                    checker.check_format(format, record).await;
                }
            }
        }

        let mut projects: Vec<CatalogProject> =
            manifest.projects.iter().map(CatalogProject::from_project).collect();

        // Bible usfm bundles always live at the resource level
        let is_bible = dc.identifier == "ulb" || dc.identifier == "udb";
        let has_bundle = kept.iter().any(Format::is_usfm_bundle);
        let mut resource_formats = None;
        if single_project && !(is_bible && has_bundle) {
            projects[0].formats = Some(kept);
        } else {
            if single_project {
                projects[0].formats = None;
            }
            resource_formats = Some(kept);
        }

        let resource = Resource {
            checking: manifest.checking.clone(),
            comment: String::new(),
            contributor: dc.contributor.clone(),
            creator: dc.creator.clone(),
            description: dc.description.clone(),
            formats: resource_formats,
            identifier: dc.identifier.clone(),
            issued: dc.issued.clone(),
            modified: dc.modified.clone(),
            projects,
            publisher: dc.publisher.clone(),
            relation: dc.relation.clone().unwrap_or_default(),
            rights: dc.rights.clone(),
            source: dc.source.clone(),
            subject: dc.subject.clone(),
            title: dc.title.clone(),
            version: dc.version.clone(),
        };

        catalog.language_mut(&dc.language).resources.push(resource);
        true
    }

    async fn read_status(&self) -> Option<StatusRecord> {
        match self.status.get(&self.config.api_version).await {
            Ok(Some(value)) => match StatusRecord::from_value(&value) {
                Ok(status) => Some(status),
                Err(e) => {
                    warn!("Ignoring malformed status record: {}", e);
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!("Failed to read status record: {}", e);
                None
            }
        }
    }

    /// Compare against the previously published document. Any failure
    /// to fetch or parse it means "assume changed".
    async fn catalog_has_changed(&self, catalog: &CatalogDocument) -> bool {
        let previous = match self.download_published().await {
            Ok(value) => value,
            Err(e) => {
                debug!("Could not fetch published catalog: {}", e);
                return true;
            }
        };
        match serde_json::to_value(catalog) {
            Ok(current) => current != previous,
            Err(_) => true,
        }
    }

    async fn download_published(&self) -> Result<Value> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("catalog.json");
        self.blobs.download(&self.config.catalog_key(), &path).await?;
        let content = std::fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&content)?)
    }

    async fn publish(&self, catalog: &CatalogDocument, state: &str) -> Result<()> {
        let serialized = catalog.to_sorted_json()?;
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("catalog.json");
        std::fs::write(&path, &serialized)?;
        info!("New catalog built: {} kilobytes", serialized.len() as f64 * 0.001);

        self.blobs
            .upload(&path, &self.config.catalog_key(), Some("max-age=0"))
            .await
            .context("Failed to upload catalog")?;

        let mut fields = Map::new();
        fields.insert("state".to_string(), Value::String(state.to_string()));
        fields.insert("timestamp".to_string(), Value::String(now_timestamp()));
        fields.insert(
            "catalog_url".to_string(),
            Value::String(self.config.catalog_url()),
        );
        self.status
            .update(&self.config.api_version, fields)
            .await
            .context("Failed to record catalog status")?;
        Ok(())
    }
}

/// Merge a localization payload: one fragment per language identifier,
/// shallow-merged into the language node it names
fn build_localization(catalog: &mut CatalogDocument, package: &Map<String, Value>) {
    for (identifier, fragment) in package {
        let Some(fragment) = fragment.as_object() else {
            warn!("Skipping localization for {}: not an object", identifier);
            continue;
        };
        let language: LanguageRef = match fragment.get("language") {
            Some(value) => match serde_json::from_value(value.clone()) {
                Ok(language) => language,
                Err(e) => {
                    warn!("Skipping localization for {}: {}", identifier, e);
                    continue;
                }
            },
            None => {
                warn!("Skipping localization for {}: missing language", identifier);
                continue;
            }
        };
        catalog.language_mut(&language).merge_localization(fragment);
    }
}

/// Relabel usfm3 formats with a usfm2-tagged duplicate of the same
/// artifact so legacy consumers keep resolving
fn duplicate_usfm_formats(formats: &mut Vec<Format>) {
    let duplicates: Vec<Format> = formats
        .iter()
        .filter(|f| f.format.contains("text/usfm3"))
        .map(|f| {
            let mut duplicate = f.clone();
            duplicate.format = duplicate.format.replace("text/usfm3", "text/usfm");
            duplicate
        })
        .collect();
    formats.extend(duplicates);
}
