//! Error types for granary-core

use thiserror::Error;

/// Result type alias using granary-core's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for Granary
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    /// Invalid configuration
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// YAML parsing error
    #[error("YAML parsing error: {0}")]
    YamlParse(#[from] serde_yaml_ng::Error),

    /// JSON parsing error
    #[error("JSON parsing error: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Missing required field
    #[error("missing key \"{field}\"")]
    MissingField { field: String },

    /// Manifest failed structural or semantic validation
    #[error("invalid manifest: {message}")]
    InvalidManifest { message: String },

    /// Resource container version mismatch
    #[error("unsupported resource container version {found}. Expected {expected}")]
    UnsupportedContainerVersion { found: String, expected: String },

    /// Blob store key does not exist
    #[error("blob not found: {key}")]
    BlobNotFound { key: String },

    /// Record store key does not exist
    #[error("record not found: {key}")]
    RecordNotFound { key: String },

    /// Signing subprocess failure
    #[error("signing failed: {message}")]
    Signing { message: String },

    /// Detached signature did not verify against its content
    #[error("signature verification failed")]
    VerificationFailed,
}

impl Error {
    /// Create a config not found error
    pub fn config_not_found(path: impl Into<String>) -> Self {
        Self::ConfigNotFound { path: path.into() }
    }

    /// Create an invalid config error
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Create a missing field error
    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
        }
    }

    /// Create an invalid manifest error
    pub fn invalid_manifest(message: impl Into<String>) -> Self {
        Self::InvalidManifest {
            message: message.into(),
        }
    }

    /// Create a container version mismatch error
    pub fn unsupported_container_version(
        found: impl Into<String>,
        expected: impl Into<String>,
    ) -> Self {
        Self::UnsupportedContainerVersion {
            found: found.into(),
            expected: expected.into(),
        }
    }

    /// Create a blob not found error
    pub fn blob_not_found(key: impl Into<String>) -> Self {
        Self::BlobNotFound { key: key.into() }
    }

    /// Create a record not found error
    pub fn record_not_found(key: impl Into<String>) -> Self {
        Self::RecordNotFound { key: key.into() }
    }

    /// Create a signing error
    pub fn signing(message: impl Into<String>) -> Self {
        Self::Signing {
            message: message.into(),
        }
    }
}
