//! Catalog document model
//!
//! The aggregation output: one merged tree of languages and their
//! resources, plus an opaque passthrough block for auxiliary catalogs.
//! Internal ordering follows record iteration order and is not
//! semantically meaningful; only membership by identifier is guaranteed.

use super::manifest::{Checking, Format, LanguageRef, Project, SourceRef};
use crate::error::Result;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The merged, publishable catalog
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogDocument {
    /// Opaque passthrough from the `catalogs` sentinel record
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalogs: Option<Value>,

    #[serde(default)]
    pub languages: Vec<LanguageEntry>,
}

impl CatalogDocument {
    /// Get the existing language node or create a new one
    pub fn language_mut(&mut self, language: &LanguageRef) -> &mut LanguageEntry {
        let position = self
            .languages
            .iter()
            .position(|l| l.identifier == language.identifier);
        match position {
            Some(i) => &mut self.languages[i],
            None => {
                self.languages.push(LanguageEntry::from_ref(language));
                self.languages.last_mut().expect("just pushed")
            }
        }
    }

    /// Drop language nodes that gathered no resources
    pub fn prune_empty_languages(&mut self) {
        self.languages.retain(|l| !l.resources.is_empty());
    }

    /// Serialize with fully sorted keys for a stable byte representation
    pub fn to_sorted_json(&self) -> Result<String> {
        let value = serde_json::to_value(self)?;
        Ok(serde_json::to_string(&value)?)
    }
}

/// One language node in the catalog
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LanguageEntry {
    pub identifier: String,
    pub title: String,
    pub direction: String,

    /// Localized metadata merged in from the `localization` sentinel
    #[serde(flatten)]
    pub extra: Map<String, Value>,

    #[serde(default)]
    pub resources: Vec<Resource>,
}

impl LanguageEntry {
    pub fn from_ref(language: &LanguageRef) -> Self {
        Self {
            identifier: language.identifier.clone(),
            title: language.title.clone(),
            direction: language.direction.clone(),
            extra: Map::new(),
            resources: Vec::new(),
        }
    }

    /// Shallow-merge a localization fragment's keys into this node.
    /// The fragment's embedded `language` object only carries the
    /// identifier and is never merged.
    pub fn merge_localization(&mut self, fragment: &Map<String, Value>) {
        for (key, value) in fragment {
            match key.as_str() {
                "language" => {}
                "title" => {
                    if let Some(title) = value.as_str() {
                        self.title = title.to_string();
                    }
                }
                "direction" => {
                    if let Some(direction) = value.as_str() {
                        self.direction = direction.to_string();
                    }
                }
                _ => {
                    self.extra.insert(key.clone(), value.clone());
                }
            }
        }
    }
}

/// One published resource within a language
///
/// Built from a manifest's `dublin_core` minus the fields that only make
/// sense on the submission side (`language`, `type`, `format`,
/// `conformsto`), plus checking, projects and formats.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resource {
    pub checking: Checking,
    pub comment: String,
    pub contributor: Vec<String>,
    pub creator: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formats: Option<Vec<Format>>,
    pub identifier: String,
    pub issued: String,
    pub modified: String,
    pub projects: Vec<CatalogProject>,
    pub publisher: String,
    pub relation: Vec<String>,
    pub rights: String,
    pub source: Vec<SourceRef>,
    pub subject: String,
    pub title: String,
    pub version: String,
}

/// One published project, with its internal `path` stripped
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogProject {
    pub categories: Vec<String>,
    pub identifier: String,
    pub sort: i64,
    pub title: String,
    pub versification: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formats: Option<Vec<Format>>,
}

impl CatalogProject {
    /// Publishable view of a manifest project
    pub fn from_project(project: &Project) -> Self {
        Self {
            categories: project.categories.clone().unwrap_or_default(),
            identifier: project.identifier.clone(),
            sort: project.sort,
            title: project.title.clone(),
            versification: project.versification.clone(),
            formats: project
                .formats
                .as_ref()
                .map(|formats| formats.iter().map(Format::stripped).collect()),
        }
    }
}
