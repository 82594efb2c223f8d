//! Cloud KMS key wrapper
//!
//! Data keys are wrapped with the symmetric `encrypt`/`decrypt` endpoints.
//! The key id is bound as additional authenticated data so a wrapped key
//! cannot be unwrapped under a different id.

use crate::auth::GcpAuth;
use crate::classify::encryption_error;
use crate::client::ApiClient;
use crate::config::KmsConfig;
use crate::{Error, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use strata_runtime::KeyWrapper;
use tracing::instrument;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EncryptRequest {
    plaintext: String,
    additional_authenticated_data: String,
}

#[derive(Deserialize)]
struct EncryptResponse {
    ciphertext: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DecryptRequest {
    ciphertext: String,
    additional_authenticated_data: String,
}

#[derive(Deserialize)]
struct DecryptResponse {
    plaintext: String,
}

pub struct CloudKmsKeyWrapper {
    client: ApiClient,
    config: KmsConfig,
}

impl CloudKmsKeyWrapper {
    pub fn new(auth: Arc<GcpAuth>, config: KmsConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            client: ApiClient::new(auth)?,
            config,
        })
    }

    pub fn with_client(client: ApiClient, config: KmsConfig) -> Self {
        Self { client, config }
    }

    fn resource(&self, key_id: &str) -> strata_runtime::Result<&str> {
        self.config
            .keys
            .get(key_id)
            .map(String::as_str)
            .ok_or_else(|| {
                strata_runtime::Error::encryption_permanent(format!(
                    "Unknown KMS key id: {}",
                    key_id
                ))
            })
    }

    async fn encrypt(&self, resource: &str, key_id: &str, data_key: &[u8]) -> Result<Vec<u8>> {
        let url = format!("{}/v1/{}:encrypt", self.config.endpoint, resource);
        let body = EncryptRequest {
            plaintext: STANDARD.encode(data_key),
            additional_authenticated_data: STANDARD.encode(key_id),
        };
        let response = self
            .client
            .send("kms_encrypt", |http| http.post(&url).json(&body))
            .await?;
        let parsed: EncryptResponse = response.json().await?;
        decode(&parsed.ciphertext, "ciphertext")
    }

    async fn decrypt(&self, resource: &str, key_id: &str, wrapped: &[u8]) -> Result<Vec<u8>> {
        let url = format!("{}/v1/{}:decrypt", self.config.endpoint, resource);
        let body = DecryptRequest {
            ciphertext: STANDARD.encode(wrapped),
            additional_authenticated_data: STANDARD.encode(key_id),
        };
        let response = self
            .client
            .send("kms_decrypt", |http| http.post(&url).json(&body))
            .await?;
        let parsed: DecryptResponse = response.json().await?;
        decode(&parsed.plaintext, "plaintext")
    }
}

fn decode(value: &str, field: &str) -> Result<Vec<u8>> {
    STANDARD
        .decode(value)
        .map_err(|e| Error::Internal(format!("KMS returned invalid base64 {}: {}", field, e)))
}

#[async_trait]
impl KeyWrapper for CloudKmsKeyWrapper {
    #[instrument(skip(self, data_key))]
    async fn wrap(&self, key_id: &str, data_key: &[u8]) -> strata_runtime::Result<Vec<u8>> {
        let resource = self.resource(key_id)?;
        self.encrypt(resource, key_id, data_key)
            .await
            .map_err(encryption_error)
    }

    #[instrument(skip(self, wrapped))]
    async fn unwrap(&self, key_id: &str, wrapped: &[u8]) -> strata_runtime::Result<Vec<u8>> {
        let resource = self.resource(key_id)?;
        self.decrypt(resource, key_id, wrapped)
            .await
            .map_err(encryption_error)
    }
}
