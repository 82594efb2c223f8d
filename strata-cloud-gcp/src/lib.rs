//! # Strata Cloud GCP
//!
//! Google Cloud adapters for Strata: Cloud Storage object storage with one
//! bucket per region, and a Cloud KMS key wrapper for envelope encryption.

pub mod auth;
pub mod classify;
pub mod client;
pub mod config;
pub mod gcs;
pub mod kms;
pub mod metrics;

// Re-export commonly used types
pub use auth::GcpAuth;
pub use config::{GcsConfig, KmsConfig};
pub use gcs::GcsObjectStorage;
pub use kms::CloudKmsKeyWrapper;

/// Result type for GCP operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for GCP operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("GCP API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether retrying the same request later could succeed
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Api { status, .. } => classify::is_transient_status(*status),
            Error::Http(e) => classify::is_network_error(e),
            Error::Auth(_) | Error::Configuration(_) | Error::Internal(_) => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Api { status: 404, .. })
    }
}
