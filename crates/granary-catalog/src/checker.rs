//! Consistency checking for submitted package records
//!
//! The checker is the gatekeeper in front of the aggregator: a record
//! that fails here contributes nothing to the catalog but never aborts
//! the run. Structural problems surface as per-record error strings;
//! an unsigned artifact on our own storage is a distinct "pending"
//! condition rather than an error, so a resource waiting on the signing
//! pipeline does not mark the whole run incomplete.

use granary_core::types::{Format, Manifest, PackageRecord, RC_VERSION};
use granary_core::{Error, GranaryConfig};
use granary_stores::WebClient;
use tracing::error;

/// Outcome of checking one format tree
#[derive(Debug, Default)]
pub struct FormatCheck {
    pub errors: Vec<String>,
    /// A local artifact with an empty signature was seen
    pub pending_signature: bool,
}

impl FormatCheck {
    /// Whether the format may be published as-is
    pub fn is_publishable(&self) -> bool {
        self.errors.is_empty() && !self.pending_signature
    }
}

/// Validates package records before they enter the catalog.
///
/// One checker lives for the duration of one aggregation run and
/// accumulates every error it saw in `all_errors`; the aggregator uses
/// that for the incomplete flag and for failure alerting.
pub struct ConsistencyChecker<'a> {
    web: &'a dyn WebClient,
    config: &'a GranaryConfig,
    pub all_errors: Vec<String>,
}

impl<'a> ConsistencyChecker<'a> {
    pub fn new(web: &'a dyn WebClient, config: &'a GranaryConfig) -> Self {
        Self {
            web,
            config,
            all_errors: Vec::new(),
        }
    }

    /// Record a run-level failure that is not tied to one record
    pub fn record_failure(&mut self, message: String) {
        error!("{}", message);
        self.all_errors.push(message);
    }

    fn log_error(&mut self, errors: &mut Vec<String>, message: String) {
        let message = format!("Consistency check failed: {}", message);
        error!("{}", message);
        self.all_errors.push(message.clone());
        errors.push(message);
    }

    /// Validate a serialized manifest's structure and semantics.
    ///
    /// Parsing does the structural work: a missing key fails with a
    /// message naming it. On top of that the resource container version
    /// must match (case-insensitively) and the format placement
    /// invariant must hold: multi-project manifests carry formats at
    /// the resource level, single-project manifests on the project.
    pub fn check_manifest(&self, raw: &str) -> granary_core::Result<Manifest> {
        let manifest = Manifest::from_json(raw)?;

        let conformsto = &manifest.dublin_core.conformsto;
        if conformsto.to_lowercase() != RC_VERSION {
            return Err(Error::unsupported_container_version(conformsto, RC_VERSION));
        }

        if manifest.projects.is_empty() {
            return Err(Error::invalid_manifest("manifest has no projects"));
        }
        if manifest.projects.len() > 1 && manifest.formats.is_none() {
            return Err(Error::invalid_manifest(
                "multi-project manifest missing resource-level \"formats\"",
            ));
        }
        if manifest.projects.len() == 1 && manifest.formats.is_some() {
            return Err(Error::invalid_manifest(
                "single-project manifest must carry \"formats\" on its project",
            ));
        }

        Ok(manifest)
    }

    /// Validate a package record. Returns the parsed manifest, or the
    /// human-readable errors that disqualify the record.
    pub fn check(&mut self, record: &PackageRecord) -> Result<Manifest, Vec<String>> {
        let mut errors = Vec::new();

        if record.repo_name.is_empty() {
            self.log_error(&mut errors, "empty repo_name in table".to_string());
            return Err(errors);
        }
        let repo_name = &record.repo_name;

        if record.commit_id.is_empty() {
            self.log_error(&mut errors, format!("{}: empty 'commit_id'", repo_name));
            return Err(errors);
        }
        if record.package.is_empty() {
            self.log_error(&mut errors, format!("{}: 'package' not found", repo_name));
            return Err(errors);
        }

        match self.check_manifest(&record.package) {
            Ok(manifest) => Ok(manifest),
            Err(e) => {
                self.log_error(&mut errors, format!("{}: {}", repo_name, e));
                Err(errors)
            }
        }
    }

    /// Validate one format: required fields, URL reachability, and the
    /// signature rules. Signatures are only required for artifacts on
    /// hosts we control; third-party hosting is exempt. Recurses into
    /// chapters.
    pub async fn check_format(&mut self, format: &Format, record: &PackageRecord) -> FormatCheck {
        let mut check = FormatCheck::default();
        let repo_name = &record.repo_name;

        if format.format.is_empty() {
            self.log_error(
                &mut check.errors,
                format!("{}: format container is missing 'format'", repo_name),
            );
        }
        if format.size == 0 {
            self.log_error(
                &mut check.errors,
                format!("{}: format container is missing 'size'", repo_name),
            );
        }
        if format.url.is_empty() {
            self.log_error(
                &mut check.errors,
                format!("{}: format has an empty url", repo_name),
            );
            return check;
        }
        if format.modified.is_empty() {
            self.log_error(
                &mut check.errors,
                format!("{}: format '{}' is missing 'modified'", repo_name, format.url),
            );
        }
        if !self.web.exists(&format.url).await {
            self.log_error(
                &mut check.errors,
                format!("{}: url '{}' does not exist", repo_name, format.url),
            );
        }

        // signatures are only required on our own servers
        if self.config.is_local_url(&format.url) {
            if format.signature.is_empty() {
                check.pending_signature = true;
            } else if !self.web.exists(&format.signature).await {
                self.log_error(
                    &mut check.errors,
                    format!(
                        "{}: signature '{}' does not exist",
                        repo_name, format.signature
                    ),
                );
            }
        }

        if let Some(chapters) = &format.chapters {
            for chapter in chapters {
                self.check_chapter(chapter, record, &mut check).await;
            }
        }

        check
    }

    async fn check_chapter(
        &mut self,
        chapter: &Format,
        record: &PackageRecord,
        check: &mut FormatCheck,
    ) {
        let repo_name = &record.repo_name;

        if chapter.identifier.is_none() {
            self.log_error(
                &mut check.errors,
                format!("{}: chapter is missing 'identifier'", repo_name),
            );
        }
        if chapter.length.is_none() {
            self.log_error(
                &mut check.errors,
                format!(
                    "{}: chapter '{}' is missing 'length'",
                    repo_name,
                    chapter.identifier.as_deref().unwrap_or("")
                ),
            );
        }
        if chapter.modified.is_empty() {
            self.log_error(
                &mut check.errors,
                format!(
                    "{}: chapter '{}' is missing 'modified'",
                    repo_name,
                    chapter.identifier.as_deref().unwrap_or("")
                ),
            );
        }
        if chapter.size == 0 {
            self.log_error(
                &mut check.errors,
                format!(
                    "{}: chapter '{}' is missing 'size'",
                    repo_name,
                    chapter.identifier.as_deref().unwrap_or("")
                ),
            );
        }
        if chapter.url.is_empty() {
            self.log_error(
                &mut check.errors,
                format!("{}: chapter has an empty url", repo_name),
            );
            return;
        }
        if !self.web.exists(&chapter.url).await {
            self.log_error(
                &mut check.errors,
                format!("{}: {} does not exist", repo_name, chapter.url),
            );
        }
        if self.config.is_local_url(&chapter.url) {
            if chapter.signature.is_empty() {
                check.pending_signature = true;
            } else if !self.web.exists(&chapter.signature).await {
                self.log_error(
                    &mut check.errors,
                    format!("{}: {} does not exist", repo_name, chapter.signature),
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use granary_stores::StaticWeb;
    use serde_json::json;

    fn test_config() -> GranaryConfig {
        GranaryConfig {
            api_version: "3".to_string(),
            cdn_url: "https://cdn.example.org".to_string(),
            api_url: "https://api.example.org".to_string(),
            cdn_bucket: "example-cdn".to_string(),
            api_bucket: "example-api".to_string(),
            local_hosts: vec!["cdn.example.org".to_string(), "api.example.org".to_string()],
            error_threshold: 4,
            records_dir: None,
            blob_root: None,
            s3_region: None,
            s3_endpoint: None,
            signing: Default::default(),
        }
    }

    fn manifest_value() -> serde_json::Value {
        json!({
            "dublin_core": {
                "conformsto": "rc0.2",
                "contributor": ["Door 43"],
                "creator": "Example Org",
                "description": "Example stories",
                "format": "text/markdown",
                "identifier": "obs",
                "issued": "2017-04-01",
                "language": {"direction": "ltr", "identifier": "en", "title": "English"},
                "modified": "2017-04-01",
                "publisher": "Example Org",
                "relation": [],
                "rights": "CC BY-SA 4.0",
                "source": [{"identifier": "obs", "language": "en", "version": "4"}],
                "subject": "Bible stories",
                "title": "Open Bible Stories",
                "type": "book",
                "version": "5"
            },
            "checking": {"checking_entity": ["Example Org"], "checking_level": "3"},
            "projects": [{
                "categories": [],
                "identifier": "obs",
                "path": "./content",
                "sort": 1,
                "title": "Open Bible Stories",
                "versification": "",
                "formats": [{
                    "format": "application/zip; type=book content=text/markdown",
                    "modified": "2017-04-01T00:00:00Z",
                    "signature": "https://cdn.example.org/en/obs/v5/obs.zip.sig",
                    "size": 123,
                    "url": "https://cdn.example.org/en/obs/v5/obs.zip"
                }]
            }]
        })
    }

    fn record(package: &serde_json::Value) -> PackageRecord {
        PackageRecord {
            repo_name: "en_obs".to_string(),
            commit_id: "abc123".to_string(),
            timestamp: "2017-04-01T00:00:00Z".to_string(),
            package: package.to_string(),
            signed: true,
            dirty: None,
        }
    }

    #[test]
    fn valid_manifest_passes() {
        let config = test_config();
        let web = StaticWeb::new();
        let checker = ConsistencyChecker::new(&web, &config);
        assert!(checker.check_manifest(&manifest_value().to_string()).is_ok());
    }

    #[test]
    fn conformsto_is_case_insensitive() {
        let config = test_config();
        let web = StaticWeb::new();
        let checker = ConsistencyChecker::new(&web, &config);
        let mut value = manifest_value();
        value["dublin_core"]["conformsto"] = json!("RC0.2");
        assert!(checker.check_manifest(&value.to_string()).is_ok());

        value["dublin_core"]["conformsto"] = json!("rc0.1");
        let err = checker.check_manifest(&value.to_string()).unwrap_err();
        assert!(err.to_string().contains("rc0.1"));
    }

    #[test]
    fn missing_checking_level_is_named() {
        let config = test_config();
        let web = StaticWeb::new();
        let checker = ConsistencyChecker::new(&web, &config);
        let mut value = manifest_value();
        value["checking"].as_object_mut().unwrap().remove("checking_level");
        let err = checker.check_manifest(&value.to_string()).unwrap_err();
        assert!(err.to_string().contains("checking_level"), "got: {}", err);
    }

    #[test]
    fn multi_project_requires_resource_formats() {
        let config = test_config();
        let web = StaticWeb::new();
        let checker = ConsistencyChecker::new(&web, &config);
        let mut value = manifest_value();
        let project = value["projects"][0].clone();
        value["projects"].as_array_mut().unwrap().push(project);
        let err = checker.check_manifest(&value.to_string()).unwrap_err();
        assert!(err.to_string().contains("formats"));
    }

    #[test]
    fn single_project_rejects_resource_formats() {
        let config = test_config();
        let web = StaticWeb::new();
        let checker = ConsistencyChecker::new(&web, &config);
        let mut value = manifest_value();
        value["formats"] = json!([{
            "format": "text/usfm",
            "modified": "2017-04-01T00:00:00Z",
            "signature": "",
            "size": 1,
            "url": "https://cdn.example.org/x.usfm"
        }]);
        let err = checker.check_manifest(&value.to_string()).unwrap_err();
        assert!(err.to_string().contains("single-project"));
    }

    #[test]
    fn check_rejects_empty_commit() {
        let config = test_config();
        let web = StaticWeb::new();
        let mut checker = ConsistencyChecker::new(&web, &config);
        let mut rec = record(&manifest_value());
        rec.commit_id = String::new();
        let errors = checker.check(&rec).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("commit_id"));
        assert_eq!(checker.all_errors.len(), 1);
    }

    #[tokio::test]
    async fn reachable_signed_format_is_publishable() {
        let config = test_config();
        let web = StaticWeb::new();
        let mut checker = ConsistencyChecker::new(&web, &config);
        let rec = record(&manifest_value());
        let manifest = Manifest::from_json(&rec.package).unwrap();
        let format = &manifest.projects[0].formats.as_ref().unwrap()[0];
        let check = checker.check_format(format, &rec).await;
        assert!(check.is_publishable(), "errors: {:?}", check.errors);
    }

    #[tokio::test]
    async fn unreachable_url_is_an_error() {
        let config = test_config();
        let web = StaticWeb::new().with_missing("https://cdn.example.org/en/obs/v5/obs.zip");
        let mut checker = ConsistencyChecker::new(&web, &config);
        let rec = record(&manifest_value());
        let manifest = Manifest::from_json(&rec.package).unwrap();
        let format = &manifest.projects[0].formats.as_ref().unwrap()[0];
        let check = checker.check_format(format, &rec).await;
        assert!(!check.errors.is_empty());
    }

    #[tokio::test]
    async fn unsigned_local_format_is_pending_not_error() {
        let config = test_config();
        let web = StaticWeb::new();
        let mut checker = ConsistencyChecker::new(&web, &config);
        let rec = record(&manifest_value());
        let format = Format {
            format: "application/zip".to_string(),
            url: "https://cdn.example.org/en/obs/v5/obs.zip".to_string(),
            modified: "2017-04-01T00:00:00Z".to_string(),
            size: 123,
            ..Format::default()
        };
        let check = checker.check_format(&format, &rec).await;
        assert!(check.errors.is_empty());
        assert!(check.pending_signature);
        assert!(!check.is_publishable());
    }

    #[tokio::test]
    async fn format_without_format_and_size_keys_is_rejected() {
        let config = test_config();
        let web = StaticWeb::new();
        let mut checker = ConsistencyChecker::new(&web, &config);
        let rec = record(&manifest_value());
        let format: Format = serde_json::from_value(json!({
            "modified": "2017-04-01T00:00:00Z",
            "signature": "https://cdn.example.org/en/obs/v5/obs.zip.sig",
            "url": "https://cdn.example.org/en/obs/v5/obs.zip"
        }))
        .unwrap();
        let check = checker.check_format(&format, &rec).await;
        assert!(!check.is_publishable());
        assert!(check.errors.iter().any(|e| e.contains("'format'")));
        assert!(check.errors.iter().any(|e| e.contains("'size'")));
    }

    #[tokio::test]
    async fn chapter_without_modified_and_size_is_rejected() {
        let config = test_config();
        let web = StaticWeb::new();
        let mut checker = ConsistencyChecker::new(&web, &config);
        let rec = record(&manifest_value());
        let format: Format = serde_json::from_value(json!({
            "format": "application/zip; content=audio/mp3",
            "modified": "2017-04-01T00:00:00Z",
            "signature": "https://cdn.example.org/en/obs/v5/media.zip.sig",
            "size": 99,
            "url": "https://cdn.example.org/en/obs/v5/media.zip",
            "chapters": [{
                "identifier": "01",
                "length": 120.5,
                "signature": "https://cdn.example.org/en/obs/v5/01.mp3.sig",
                "url": "https://cdn.example.org/en/obs/v5/01.mp3"
            }]
        }))
        .unwrap();
        let check = checker.check_format(&format, &rec).await;
        assert!(!check.is_publishable());
        assert!(check.errors.iter().any(|e| e.contains("'modified'")));
        assert!(check.errors.iter().any(|e| e.contains("'size'")));
    }

    #[tokio::test]
    async fn external_format_is_exempt_from_signing() {
        let config = test_config();
        let web = StaticWeb::new();
        let mut checker = ConsistencyChecker::new(&web, &config);
        let rec = record(&manifest_value());
        let format = Format {
            format: "video/mp4".to_string(),
            url: "https://thirdparty.example.com/obs.mp4".to_string(),
            modified: "2017-04-01T00:00:00Z".to_string(),
            size: 456,
            ..Format::default()
        };
        let check = checker.check_format(&format, &rec).await;
        assert!(check.is_publishable(), "errors: {:?}", check.errors);
    }
}
