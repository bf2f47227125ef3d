//! End-to-end aggregation runs over in-memory stores

use granary_catalog::{CatalogAggregator, ErrorTracker, LogAlertSink};
use granary_core::types::ErrorReport;
use granary_core::GranaryConfig;
use granary_stores::{MemoryBlobStore, MemoryRecordStore, RecordStore, StaticWeb};
use serde_json::{json, Value};
use std::sync::Arc;

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

struct Harness {
    progress: Arc<MemoryRecordStore>,
    status: Arc<MemoryRecordStore>,
    errors: Arc<MemoryRecordStore>,
    blobs: Arc<MemoryBlobStore>,
    web: Arc<StaticWeb>,
}

impl Harness {
    fn new() -> Self {
        Self::with_web(StaticWeb::new())
    }

    fn with_web(web: StaticWeb) -> Self {
        Self {
            progress: Arc::new(MemoryRecordStore::new("repo_name")),
            status: Arc::new(MemoryRecordStore::new("api_version")),
            errors: Arc::new(MemoryRecordStore::new("reporter")),
            blobs: Arc::new(MemoryBlobStore::new()),
            web: Arc::new(web),
        }
    }

    fn aggregator(&self) -> CatalogAggregator {
        let tracker = ErrorTracker::new(
            self.errors.clone(),
            Arc::new(LogAlertSink),
            "catalog",
            4,
        );
        CatalogAggregator::new(
            test_config(),
            self.progress.clone(),
            self.status.clone(),
            self.blobs.clone(),
            self.web.clone(),
            tracker,
        )
    }

    async fn error_report(&self) -> ErrorReport {
        let value = self.errors.get("catalog").await.unwrap().unwrap();
        ErrorReport::from_value(&value).unwrap()
    }
}

fn resource_manifest(lang: &str, identifier: &str) -> Value {
    let url = format!("https://cdn.example.org/{}/{}/v5/{}.zip", lang, identifier, identifier);
    json!({
        "dublin_core": {
            "conformsto": "rc0.2",
            "contributor": ["Door 43"],
            "creator": "Example Org",
            "description": "Example content",
            "format": "application/zip",
            "identifier": identifier,
            "issued": "2017-04-01",
            "language": {"direction": "ltr", "identifier": lang, "title": lang.to_uppercase()},
            "modified": "2017-04-01",
            "publisher": "Example Org",
            "relation": [],
            "rights": "CC BY-SA 4.0",
            "source": [{"identifier": identifier, "language": "en", "version": "4"}],
            "subject": "Bible stories",
            "title": identifier.to_uppercase(),
            "type": "book",
            "version": "5"
        },
        "checking": {"checking_entity": ["Example Org"], "checking_level": "3"},
        "projects": [{
            "categories": [],
            "identifier": identifier,
            "path": "./content",
            "sort": 1,
            "title": identifier.to_uppercase(),
            "versification": "",
            "formats": [{
                "format": "application/zip; type=book",
                "modified": "2017-04-01T00:00:00Z",
                "signature": format!("{}.sig", url),
                "size": 12345,
                "url": url,
                "build_rules": ["signing.sign_given_url"]
            }]
        }]
    })
}

fn resource_record(repo_name: &str, lang: &str, identifier: &str) -> Value {
    json!({
        "repo_name": repo_name,
        "commit_id": "abc123",
        "timestamp": "2017-04-01T00:00:00Z",
        "package": resource_manifest(lang, identifier).to_string(),
        "signed": true
    })
}

#[tokio::test]
async fn catalogs_block_and_resource_are_merged() {
    let harness = Harness::new();
    harness.progress.seed(json!({
        "repo_name": "catalogs",
        "commit_id": "abc123",
        "package": "{\"a\":1}",
        "signed": true
    }));
    harness.progress.seed(resource_record("en_obs", "en", "obs"));

    let response = harness.aggregator().run().await.unwrap();
    assert!(response.success, "message: {}", response.message);
    assert!(!response.incomplete);

    let catalog = response.catalog.unwrap();
    assert_eq!(catalog.catalogs, Some(json!({"a": 1})));
    assert_eq!(catalog.languages.len(), 1);
    assert_eq!(catalog.languages[0].identifier, "en");
    assert_eq!(catalog.languages[0].resources.len(), 1);

    let resource = &catalog.languages[0].resources[0];
    assert_eq!(resource.identifier, "obs");
    // single-project resource keeps formats on its project
    let formats = resource.projects[0].formats.as_ref().unwrap();
    assert_eq!(formats.len(), 1);
    // transient fields never reach the catalog
    assert!(formats[0].build_rules.is_none());

    assert!(harness.blobs.get_bytes("v3/catalog.json").is_some());
}

#[tokio::test]
async fn invalid_record_is_skipped_but_run_publishes() {
    let harness = Harness::new();
    harness.progress.seed(resource_record("en_obs", "en", "obs"));

    let mut broken = resource_manifest("fr", "tq");
    broken["checking"].as_object_mut().unwrap().remove("checking_level");
    harness.progress.seed(json!({
        "repo_name": "fr_tq",
        "commit_id": "def456",
        "package": broken.to_string(),
        "signed": true
    }));

    let response = harness.aggregator().run().await.unwrap();
    assert!(response.success);
    assert!(response.incomplete);

    let catalog = response.catalog.unwrap();
    assert_eq!(catalog.languages.len(), 1);
    assert_eq!(catalog.languages[0].identifier, "en");

    let report = harness.error_report().await;
    assert_eq!(report.failures, 1);
    assert!(
        report.errors.iter().any(|e| e.message.contains("checking_level")),
        "errors: {:?}",
        report.errors
    );

    // a best-effort publish is recorded as incomplete
    let status = harness.status.get("3").await.unwrap().unwrap();
    assert_eq!(status["state"], "incomplete");
}

#[tokio::test]
async fn unchanged_catalog_is_not_republished() {
    let harness = Harness::new();
    harness.progress.seed(resource_record("en_obs", "en", "obs"));

    let first = harness.aggregator().run().await.unwrap();
    assert!(first.success);
    assert_eq!(harness.blobs.upload_log(), vec!["v3/catalog.json".to_string()]);

    let second = harness.aggregator().run().await.unwrap();
    assert!(second.success);
    assert_eq!(second.message, "No changes detected. Catalog not deployed");
    assert_eq!(harness.blobs.upload_log().len(), 1);
}

#[tokio::test]
async fn new_record_adds_without_disturbing_existing() {
    let harness = Harness::new();
    harness.progress.seed(resource_record("en_obs", "en", "obs"));
    harness.progress.seed(resource_record("en_tq", "en", "tq"));

    let response = harness.aggregator().run().await.unwrap();
    let catalog = response.catalog.unwrap();
    assert_eq!(catalog.languages.len(), 1);

    let identifiers: Vec<&str> = catalog.languages[0]
        .resources
        .iter()
        .map(|r| r.identifier.as_str())
        .collect();
    assert_eq!(identifiers.len(), 2);
    assert!(identifiers.contains(&"obs"));
    assert!(identifiers.contains(&"tq"));

    // a third submission only adds its own resource
    harness.progress.seed(resource_record("en_tn", "en", "tn"));
    let response = harness.aggregator().run().await.unwrap();
    let catalog = response.catalog.unwrap();
    assert_eq!(catalog.languages.len(), 1);
    assert_eq!(catalog.languages[0].resources.len(), 3);
}

#[tokio::test]
async fn languages_without_resources_are_pruned() {
    let harness = Harness::new();
    harness.progress.seed(resource_record("en_obs", "en", "obs"));
    harness.progress.seed(json!({
        "repo_name": "localization",
        "commit_id": "abc123",
        "package": json!({
            "es": {
                "language": {"identifier": "es", "title": "Español", "direction": "ltr"},
                "category_labels": {"bible-ot": "Antiguo Testamento"}
            }
        }).to_string(),
        "signed": true
    }));

    let response = harness.aggregator().run().await.unwrap();
    let catalog = response.catalog.unwrap();
    assert_eq!(catalog.languages.len(), 1);
    assert_eq!(catalog.languages[0].identifier, "en");
}

#[tokio::test]
async fn run_with_no_valid_records_fails() {
    let harness = Harness::new();
    let mut broken = resource_manifest("fr", "tq");
    broken["checking"].as_object_mut().unwrap().remove("checking_level");
    harness.progress.seed(json!({
        "repo_name": "fr_tq",
        "commit_id": "def456",
        "package": broken.to_string(),
        "signed": true
    }));

    let response = harness.aggregator().run().await.unwrap();
    assert!(!response.success);
    assert!(response.catalog.is_none());
    assert!(response.message.contains("There were no formats to process"));
    assert!(harness.blobs.upload_log().is_empty());
}

#[tokio::test]
async fn unreachable_format_excludes_the_resource() {
    let web = StaticWeb::new().with_missing("https://cdn.example.org/en/obs/v5/obs.zip");
    let harness = Harness::with_web(web);
    harness.progress.seed(resource_record("en_obs", "en", "obs"));
    harness.progress.seed(resource_record("en_tq", "en", "tq"));

    let response = harness.aggregator().run().await.unwrap();
    assert!(response.success);
    assert!(response.incomplete);

    let catalog = response.catalog.unwrap();
    let identifiers: Vec<&str> = catalog.languages[0]
        .resources
        .iter()
        .map(|r| r.identifier.as_str())
        .collect();
    assert_eq!(identifiers, vec!["tq"]);
}
