//! Record store document types
//!
//! The record store speaks loose JSON documents; these are the typed
//! views the pipeline works with. Conversion to and from
//! `serde_json::Value` goes through serde so unknown fields on a stored
//! document are tolerated.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One submitted package, keyed by `repo_name`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageRecord {
    pub repo_name: String,

    /// Short hash of the source commit, used in immutable staging paths
    #[serde(default)]
    pub commit_id: String,

    /// When the source commit was made (ISO-8601)
    #[serde(default)]
    pub timestamp: String,

    /// Serialized manifest payload, opaque to the record store
    #[serde(default)]
    pub package: String,

    /// Whether every signable artifact currently carries a signature.
    /// Mutated only by the signing orchestrator.
    #[serde(default)]
    pub signed: bool,

    /// Operator-settable flag forcing re-processing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dirty: Option<bool>,
}

impl PackageRecord {
    /// Deserialize from a stored document
    pub fn from_value(value: &Value) -> Result<Self> {
        Ok(serde_json::from_value(value.clone())?)
    }

    /// Serialize to a storable document
    pub fn to_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }
}

/// Published-catalog status marker, keyed by `api_version`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusRecord {
    pub api_version: String,
    pub state: String,
    pub timestamp: String,
    pub catalog_url: String,
}

impl StatusRecord {
    pub const STATE_COMPLETE: &'static str = "complete";
    pub const STATE_INCOMPLETE: &'static str = "incomplete";

    pub fn from_value(value: &Value) -> Result<Self> {
        Ok(serde_json::from_value(value.clone())?)
    }

    pub fn to_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn is_complete(&self) -> bool {
        self.state == Self::STATE_COMPLETE
    }
}

/// One accumulated failure message with its observation time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedError {
    pub message: String,
    pub timestamp: String,
}

/// Rolling failure report, keyed by `reporter`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorReport {
    pub reporter: String,

    /// Consecutive runs that produced errors
    #[serde(default)]
    pub failures: u32,

    #[serde(default)]
    pub errors: Vec<TrackedError>,
}

impl ErrorReport {
    pub fn new(reporter: impl Into<String>) -> Self {
        Self {
            reporter: reporter.into(),
            failures: 0,
            errors: Vec::new(),
        }
    }

    pub fn from_value(value: &Value) -> Result<Self> {
        Ok(serde_json::from_value(value.clone())?)
    }

    pub fn to_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }
}
