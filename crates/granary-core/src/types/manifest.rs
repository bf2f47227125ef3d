//! Typed resource-container manifest model
//!
//! A submitted package is a JSON manifest conforming to the resource
//! container convention. The model makes required and optional fields
//! explicit at the type level: a structurally broken manifest fails to
//! deserialize with a message naming the missing key, which the
//! consistency checker surfaces as a per-record rejection.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Resource container version every manifest must conform to
pub const RC_VERSION: &str = "rc0.2";

/// Record names reserved for non-resource payloads
pub const SENTINEL_REPOS: &[&str] = &["catalogs", "localization", "versification"];

/// Whether a repo name denotes an auxiliary, non-resource payload
pub fn is_sentinel_repo(repo_name: &str) -> bool {
    SENTINEL_REPOS.contains(&repo_name)
}

/// A submitted resource manifest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub dublin_core: DublinCore,
    pub checking: Checking,
    pub projects: Vec<Project>,

    /// Resource-level formats. Present iff the manifest has more than
    /// one project; single-project resources keep formats on the project.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formats: Option<Vec<Format>>,
}

impl Manifest {
    /// Parse a serialized manifest
    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|e| Error::invalid_manifest(e.to_string()))
    }

    /// Serialize with fully sorted keys for a stable byte representation
    pub fn to_sorted_json(&self) -> Result<String> {
        let value = serde_json::to_value(self)?;
        Ok(serde_json::to_string(&value)?)
    }
}

/// Dublin Core metadata block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DublinCore {
    pub conformsto: String,
    pub contributor: Vec<String>,
    pub creator: String,
    pub description: String,
    pub format: String,
    pub identifier: String,
    pub issued: String,
    pub language: LanguageRef,
    pub modified: String,
    pub publisher: String,
    /// Required key, but submissions may carry an explicit null
    pub relation: Option<Vec<String>>,
    pub rights: String,
    pub source: Vec<SourceRef>,
    pub subject: String,
    pub title: String,
    #[serde(rename = "type")]
    pub resource_type: String,
    pub version: String,
}

/// Language identification carried inside `dublin_core`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LanguageRef {
    pub direction: String,
    pub identifier: String,
    pub title: String,
}

/// Upstream source a resource was translated from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRef {
    pub identifier: String,
    pub language: String,
    pub version: String,
}

/// Checking metadata block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checking {
    pub checking_entity: Vec<String>,
    pub checking_level: String,
}

/// One project (book, story collection, ...) within a resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    /// Required key, but submissions may carry an explicit null
    pub categories: Option<Vec<String>>,
    pub identifier: String,
    pub path: String,
    pub sort: i64,
    pub title: String,
    pub versification: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formats: Option<Vec<Format>>,
}

/// A downloadable artifact descriptor
///
/// Chapters of split media formats share this shape: they carry an
/// `identifier` and `length` and omit the `format` tag.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Format {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,

    /// MIME-like tag, possibly with extra parameters
    /// (`type=`, `content=`, `conformsto=`, `quality=`)
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub format: String,

    #[serde(default)]
    pub url: String,

    /// Location of the detached signature; empty means not yet signed
    #[serde(default)]
    pub signature: String,

    #[serde(default)]
    pub size: u64,

    #[serde(default)]
    pub modified: String,

    /// Playback length for media artifacts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chapters: Option<Vec<Format>>,

    /// Stage-namespaced processing hints, e.g. `signing.sign_given_url`.
    /// Never published to the catalog.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_rules: Option<Vec<String>>,
}

impl Format {
    /// Whether signing has completed for this artifact
    pub fn is_signed(&self) -> bool {
        !self.signature.is_empty()
    }

    /// Build rules scoped to one consuming stage, with the `<stage>.`
    /// prefix stripped
    pub fn build_rules_for(&self, scope: &str) -> Vec<String> {
        let prefix = format!("{}.", scope);
        self.build_rules
            .as_deref()
            .unwrap_or_default()
            .iter()
            .filter_map(|rule| rule.strip_prefix(&prefix))
            .map(String::from)
            .collect()
    }

    /// Whether this format is a USFM bundle
    pub fn is_usfm_bundle(&self) -> bool {
        self.format.contains("text/usfm") && self.format.contains("type=bundle")
    }

    /// A copy with transient build rules removed, recursively
    pub fn stripped(&self) -> Format {
        let mut out = self.clone();
        out.build_rules = None;
        out.chapters = self
            .chapters
            .as_ref()
            .map(|chapters| chapters.iter().map(Format::stripped).collect());
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    pub(crate) fn minimal_manifest_json() -> serde_json::Value {
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
                "formats": []
            }]
        })
    }

    #[test]
    fn parses_minimal_manifest() {
        let manifest = Manifest::from_json(&minimal_manifest_json().to_string()).unwrap();
        assert_eq!(manifest.dublin_core.identifier, "obs");
        assert_eq!(manifest.dublin_core.language.identifier, "en");
        assert_eq!(manifest.projects.len(), 1);
        assert!(manifest.formats.is_none());
    }

    #[test]
    fn missing_key_names_the_field() {
        let mut value = minimal_manifest_json();
        value["checking"].as_object_mut().unwrap().remove("checking_level");
        let err = Manifest::from_json(&value.to_string()).expect_err("should fail");
        assert!(err.to_string().contains("checking_level"), "got: {}", err);
    }

    #[test]
    fn null_relation_is_tolerated() {
        let mut value = minimal_manifest_json();
        value["dublin_core"]["relation"] = serde_json::Value::Null;
        let manifest = Manifest::from_json(&value.to_string()).unwrap();
        assert!(manifest.dublin_core.relation.is_none());
    }

    #[test]
    fn build_rules_are_scope_filtered() {
        let format = Format {
            build_rules: Some(vec![
                "signing.sign_given_url".to_string(),
                "webhook.skip".to_string(),
            ]),
            ..empty_format()
        };
        assert_eq!(format.build_rules_for("signing"), vec!["sign_given_url"]);
        assert!(format.build_rules_for("catalog").is_empty());
    }

    #[test]
    fn stripped_removes_rules_recursively() {
        let format = Format {
            build_rules: Some(vec!["signing.sign_given_url".to_string()]),
            chapters: Some(vec![Format {
                build_rules: Some(vec!["signing.sign_given_url".to_string()]),
                ..empty_format()
            }]),
            ..empty_format()
        };
        let stripped = format.stripped();
        assert!(stripped.build_rules.is_none());
        assert!(stripped.chapters.unwrap()[0].build_rules.is_none());
    }

    #[test]
    fn usfm_bundle_detection() {
        let format = Format {
            format: "text/usfm; type=bundle".to_string(),
            ..empty_format()
        };
        assert!(format.is_usfm_bundle());
        let plain = Format {
            format: "text/usfm".to_string(),
            ..empty_format()
        };
        assert!(!plain.is_usfm_bundle());
    }

    fn empty_format() -> Format {
        Format {
            identifier: None,
            format: String::new(),
            url: String::new(),
            signature: String::new(),
            size: 0,
            modified: String::new(),
            length: None,
            quality: None,
            chapters: None,
            build_rules: None,
        }
    }
}
