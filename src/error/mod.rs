//! Error types for kubehealth

use thiserror::Error;

/// Main error type for kubehealth
#[derive(Debug, Error)]
pub enum KhError {
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("failed to query api discovery: {0}")]
    Discovery(String),

    #[error("listing resources failed ({resource}): {source}")]
    List {
        resource: String,
        #[source]
        source: kube::Error,
    },

    #[error("no resource mapping found for '{0}'")]
    UnknownResource(String),

    #[error("object not found: {kind}/{name}")]
    NotFound { kind: String, name: String },

    #[error("failed to read object: {0}")]
    Object(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for KhError {
    fn from(e: serde_json::Error) -> Self {
        KhError::Serialization(e.to_string())
    }
}

impl From<serde_yaml::Error> for KhError {
    fn from(e: serde_yaml::Error) -> Self {
        KhError::Serialization(e.to_string())
    }
}

/// Result type alias for kubehealth
pub type Result<T> = std::result::Result<T, KhError>;
