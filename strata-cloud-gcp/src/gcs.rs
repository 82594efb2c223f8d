//! Cloud Storage object storage
//!
//! Each region has its own bucket. Object keys written by the backup
//! pipeline start with `backups/{region}/` and replicas with
//! `replicas/{region}/`, so the bucket is derived from the key itself.

use crate::auth::GcpAuth;
use crate::classify::storage_error;
use crate::client::ApiClient;
use crate::config::GcsConfig;
use crate::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use serde::Deserialize;
use std::sync::Arc;
use strata_runtime::services::ObjectStorage;
use tracing::{debug, instrument};

/// Safety valve for rewrite loops that never report `done`
const MAX_REWRITE_ROUNDS: usize = 64;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RewriteResponse {
    done: bool,
    #[serde(default)]
    rewrite_token: Option<String>,
    #[serde(default)]
    total_bytes_rewritten: Option<String>,
}

pub struct GcsObjectStorage {
    client: ApiClient,
    config: GcsConfig,
}

impl GcsObjectStorage {
    pub fn new(auth: Arc<GcpAuth>, config: GcsConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            client: ApiClient::new(auth)?,
            config,
        })
    }

    pub fn with_client(client: ApiClient, config: GcsConfig) -> Self {
        Self { client, config }
    }

    /// Bucket that holds `key`
    pub fn bucket_for_key(&self, key: &str) -> Result<&str> {
        let region = key_region(key).unwrap_or(&self.config.default_region);
        self.bucket_for_region(region)
    }

    fn bucket_for_region(&self, region: &str) -> Result<&str> {
        self.config.bucket_for(region).ok_or_else(|| {
            Error::Configuration(format!("no bucket configured for region '{}'", region))
        })
    }

    fn object_url(&self, bucket: &str, key: &str) -> String {
        format!(
            "{}/storage/v1/b/{}/o/{}",
            self.config.endpoint,
            bucket,
            urlencoding::encode(key)
        )
    }

    async fn put_object(&self, key: &str, bytes: Bytes, content_type: &str) -> Result<()> {
        let bucket = self.bucket_for_key(key)?;
        let url = format!(
            "{}/upload/storage/v1/b/{}/o?uploadType=media&name={}",
            self.config.endpoint,
            bucket,
            urlencoding::encode(key)
        );
        self.client
            .send("gcs_put", |http| {
                http.post(&url)
                    .header("Content-Type", content_type)
                    .body(bytes.clone())
            })
            .await?;
        Ok(())
    }

    async fn get_object(&self, key: &str) -> Result<Bytes> {
        let url = format!("{}?alt=media", self.object_url(self.bucket_for_key(key)?, key));
        let response = self.client.send("gcs_get", |http| http.get(&url)).await?;
        Ok(response.bytes().await?)
    }

    async fn rewrite_object(&self, src_key: &str, dest_region: &str) -> Result<String> {
        let src_bucket = self.bucket_for_key(src_key)?;
        let dest_bucket = self.bucket_for_region(dest_region)?;
        let dest_key = replica_key(dest_region, src_key);
        let base_url = format!(
            "{}/rewriteTo/b/{}/o/{}",
            self.object_url(src_bucket, src_key),
            dest_bucket,
            urlencoding::encode(&dest_key)
        );

        let mut token: Option<String> = None;
        for _ in 0..MAX_REWRITE_ROUNDS {
            let url = match &token {
                Some(t) => format!("{}?rewriteToken={}", base_url, urlencoding::encode(t)),
                None => base_url.clone(),
            };
            let response = self
                .client
                .send("gcs_copy", |http| http.post(&url).json(&serde_json::json!({})))
                .await?;
            let progress: RewriteResponse = response.json().await?;
            if progress.done {
                debug!(
                    src = src_key,
                    dest = %dest_key,
                    bytes = ?progress.total_bytes_rewritten,
                    "Object rewrite complete"
                );
                return Ok(dest_key);
            }
            token = progress.rewrite_token;
            if token.is_none() {
                return Err(Error::Internal(
                    "rewrite not done but no rewriteToken returned".into(),
                ));
            }
        }
        Err(Error::Internal(format!(
            "rewrite of {} did not finish after {} rounds",
            src_key, MAX_REWRITE_ROUNDS
        )))
    }

    async fn delete_object(&self, key: &str) -> Result<()> {
        let url = self.object_url(self.bucket_for_key(key)?, key);
        self.client.send("gcs_delete", |http| http.delete(&url)).await?;
        Ok(())
    }
}

/// Region named by a `backups/{region}/...` or `replicas/{region}/...` key
fn key_region(key: &str) -> Option<&str> {
    let mut parts = key.splitn(3, '/');
    match (parts.next(), parts.next(), parts.next()) {
        (Some("backups") | Some("replicas"), Some(region), Some(_)) if !region.is_empty() => {
            Some(region)
        }
        _ => None,
    }
}

fn replica_key(dest_region: &str, src_key: &str) -> String {
    format!("replicas/{}/{}", dest_region, src_key)
}

#[async_trait]
impl ObjectStorage for GcsObjectStorage {
    #[instrument(skip(self, bytes), fields(size = bytes.len()))]
    async fn put(
        &self,
        key: &str,
        bytes: Bytes,
        content_type: &str,
    ) -> strata_runtime::Result<String> {
        self.put_object(key, bytes, content_type)
            .await
            .map_err(storage_error)?;
        Ok(key.to_string())
    }

    #[instrument(skip(self))]
    async fn get(&self, key: &str) -> strata_runtime::Result<Bytes> {
        self.get_object(key).await.map_err(storage_error)
    }

    #[instrument(skip(self))]
    async fn copy(&self, src_key: &str, dest_region: &str) -> strata_runtime::Result<String> {
        self.rewrite_object(src_key, dest_region)
            .await
            .map_err(storage_error)
    }

    #[instrument(skip(self))]
    async fn delete(&self, key: &str) -> strata_runtime::Result<()> {
        self.delete_object(key).await.map_err(storage_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_region() {
        assert_eq!(
            key_region("backups/us-east-1/teachlink/abc.enc"),
            Some("us-east-1")
        );
        assert_eq!(
            key_region("replicas/us-west-2/backups/us-east-1/teachlink/abc.enc"),
            Some("us-west-2")
        );
        assert_eq!(key_region("manifests/latest.json"), None);
        assert_eq!(key_region("backups/us-east-1"), None);
    }

    #[test]
    fn test_bucket_resolution() {
        let config =
            GcsConfig::parse("us-east-1=strata-east,us-west-2=strata-west", "us-east-1").unwrap();
        let storage =
            GcsObjectStorage::new(Arc::new(GcpAuth::from_static_token("t")), config).unwrap();

        assert_eq!(
            storage.bucket_for_key("replicas/us-west-2/backups/us-east-1/db/x.enc").unwrap(),
            "strata-west"
        );
        assert_eq!(storage.bucket_for_key("other/key").unwrap(), "strata-east");
        assert!(storage.bucket_for_key("backups/eu-west-1/db/x").is_err());
    }

    #[test]
    fn test_replica_key_layout() {
        assert_eq!(
            replica_key("us-west-2", "backups/us-east-1/teachlink/1.enc"),
            "replicas/us-west-2/backups/us-east-1/teachlink/1.enc"
        );
    }
}
