//! GCP adapter configuration loading and validation.

use crate::{Error, Result};
use std::collections::HashMap;

pub const DEFAULT_STORAGE_ENDPOINT: &str = "https://storage.googleapis.com";
pub const DEFAULT_KMS_ENDPOINT: &str = "https://cloudkms.googleapis.com";

/// Cloud Storage buckets, one per region.
#[derive(Debug, Clone)]
pub struct GcsConfig {
    /// region -> bucket
    pub buckets: HashMap<String, String>,
    /// Bucket region used for keys that carry no region prefix
    pub default_region: String,
    pub endpoint: String,
}

impl GcsConfig {
    /// Parse `"us-east-1=strata-backups-east,us-west-2=strata-backups-west"`.
    pub fn parse(spec: &str, default_region: &str) -> Result<Self> {
        let cfg = Self {
            buckets: parse_pairs(spec, "STRATA_GCS_BUCKETS")?,
            default_region: default_region.to_string(),
            endpoint: DEFAULT_STORAGE_ENDPOINT.to_string(),
        };
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_env() -> Result<Self> {
        let buckets = std::env::var("STRATA_GCS_BUCKETS")
            .map_err(|_| Error::Configuration("STRATA_GCS_BUCKETS not set".into()))?;
        let default_region =
            std::env::var("STRATA_PRIMARY_REGION").unwrap_or_else(|_| "us-east-1".to_string());
        let mut cfg = Self::parse(&buckets, &default_region)?;
        if let Ok(endpoint) = std::env::var("STRATA_GCS_ENDPOINT") {
            cfg.endpoint = endpoint;
            cfg.validate()?;
        }
        Ok(cfg)
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.buckets.is_empty() {
            return Err(Error::Configuration("at least one bucket is required".into()));
        }
        if !self.buckets.contains_key(&self.default_region) {
            return Err(Error::Configuration(format!(
                "no bucket configured for default region '{}'",
                self.default_region
            )));
        }
        validate_endpoint(&self.endpoint)
    }

    pub fn bucket_for(&self, region: &str) -> Option<&str> {
        self.buckets.get(region).map(String::as_str)
    }
}

/// Cloud KMS crypto keys addressed by the key ids stored in envelope headers.
#[derive(Debug, Clone)]
pub struct KmsConfig {
    /// key id -> `projects/*/locations/*/keyRings/*/cryptoKeys/*`
    pub keys: HashMap<String, String>,
    pub endpoint: String,
}

impl KmsConfig {
    /// Parse `"backup-master-key=projects/p/locations/l/keyRings/r/cryptoKeys/k"`.
    pub fn parse(spec: &str) -> Result<Self> {
        let cfg = Self {
            keys: parse_pairs(spec, "STRATA_KMS_KEYS")?,
            endpoint: DEFAULT_KMS_ENDPOINT.to_string(),
        };
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_env() -> Result<Self> {
        let keys = std::env::var("STRATA_KMS_KEYS")
            .map_err(|_| Error::Configuration("STRATA_KMS_KEYS not set".into()))?;
        let mut cfg = Self::parse(&keys)?;
        if let Ok(endpoint) = std::env::var("STRATA_KMS_ENDPOINT") {
            cfg.endpoint = endpoint;
            cfg.validate()?;
        }
        Ok(cfg)
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.keys.is_empty() {
            return Err(Error::Configuration("at least one KMS key is required".into()));
        }
        for (id, resource) in &self.keys {
            if !resource.starts_with("projects/") || !resource.contains("/cryptoKeys/") {
                return Err(Error::Configuration(format!(
                    "KMS key '{}' must be a cryptoKeys resource name, got '{}'",
                    id, resource
                )));
            }
        }
        validate_endpoint(&self.endpoint)
    }
}

fn parse_pairs(spec: &str, name: &str) -> Result<HashMap<String, String>> {
    let mut pairs = HashMap::new();
    for entry in spec.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let (key, value) = entry.split_once('=').ok_or_else(|| {
            Error::Configuration(format!("{}: expected key=value, got '{}'", name, entry))
        })?;
        let (key, value) = (key.trim(), value.trim());
        if key.is_empty() || value.is_empty() {
            return Err(Error::Configuration(format!(
                "{}: empty key or value in '{}'",
                name, entry
            )));
        }
        pairs.insert(key.to_string(), value.to_string());
    }
    Ok(pairs)
}

fn validate_endpoint(endpoint: &str) -> Result<()> {
    if !endpoint.starts_with("https://") && !endpoint.starts_with("http://") {
        return Err(Error::Configuration(
            "endpoint must be a valid HTTP(S) URL".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_buckets() {
        let cfg = GcsConfig::parse(
            "us-east-1=strata-east, us-west-2=strata-west",
            "us-east-1",
        )
        .unwrap();
        assert_eq!(cfg.bucket_for("us-east-1"), Some("strata-east"));
        assert_eq!(cfg.bucket_for("us-west-2"), Some("strata-west"));
        assert_eq!(cfg.bucket_for("eu-west-1"), None);
        assert_eq!(cfg.endpoint, DEFAULT_STORAGE_ENDPOINT);
    }

    #[test]
    fn test_default_region_needs_bucket() {
        let err = GcsConfig::parse("us-west-2=strata-west", "us-east-1").unwrap_err();
        assert!(err.to_string().contains("us-east-1"));
    }

    #[test]
    fn test_malformed_pairs() {
        assert!(GcsConfig::parse("us-east-1", "us-east-1").is_err());
        assert!(GcsConfig::parse("=bucket", "us-east-1").is_err());
        assert!(GcsConfig::parse("", "us-east-1").is_err());
    }

    #[test]
    fn test_endpoint_validation() {
        let cfg = GcsConfig::parse("us-east-1=b", "us-east-1")
            .unwrap()
            .with_endpoint("localhost:4443");
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_parse_kms_keys() {
        let cfg = KmsConfig::parse(
            "backup-master-key=projects/p/locations/global/keyRings/strata/cryptoKeys/backups",
        )
        .unwrap();
        assert_eq!(
            cfg.keys["backup-master-key"],
            "projects/p/locations/global/keyRings/strata/cryptoKeys/backups"
        );

        assert!(KmsConfig::parse("backup-master-key=not-a-resource").is_err());
    }
}
