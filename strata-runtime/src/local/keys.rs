use crate::envelope::KeyWrapper;
use crate::{Error, Result};
use async_trait::async_trait;
use base64::Engine;
use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::ChaCha20Poly1305;
use rand::rngs::OsRng;
use rand::RngCore;
use std::collections::HashMap;

const NONCE_SIZE: usize = 12;

/// Wraps data keys with locally held 256-bit master keys.
///
/// Wrapped form is `nonce || ChaCha20-Poly1305(master, data_key)` with the
/// key id as associated data.
pub struct LocalKeyWrapper {
    keys: HashMap<String, [u8; 32]>,
}

impl LocalKeyWrapper {
    pub fn new(keys: impl IntoIterator<Item = (String, [u8; 32])>) -> Self {
        Self {
            keys: keys.into_iter().collect(),
        }
    }

    /// Parse `keyId=<base64 32 bytes>,...`
    pub fn from_spec(spec: &str) -> Result<Self> {
        let mut keys = HashMap::new();
        for entry in spec.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let (key_id, encoded) = entry.split_once('=').ok_or_else(|| {
                Error::encryption_permanent("Malformed master key entry, expected keyId=base64")
            })?;
            let raw = base64::engine::general_purpose::STANDARD
                .decode(encoded.trim())
                .map_err(|e| {
                    Error::encryption_permanent(format!("Master key {} is not base64: {}", key_id, e))
                })?;
            let key: [u8; 32] = raw.try_into().map_err(|_| {
                Error::encryption_permanent(format!("Master key {} must be 32 bytes", key_id))
            })?;
            keys.insert(key_id.trim().to_string(), key);
        }
        if keys.is_empty() {
            return Err(Error::encryption_permanent("No master keys configured"));
        }
        Ok(Self { keys })
    }

    pub fn has_key(&self, key_id: &str) -> bool {
        self.keys.contains_key(key_id)
    }

    fn cipher(&self, key_id: &str) -> Result<ChaCha20Poly1305> {
        let key = self.keys.get(key_id).ok_or_else(|| {
            Error::encryption_permanent(format!("Unknown master key: {}", key_id))
        })?;
        Ok(ChaCha20Poly1305::new(key.into()))
    }
}

#[async_trait]
impl KeyWrapper for LocalKeyWrapper {
    async fn wrap(&self, key_id: &str, data_key: &[u8]) -> Result<Vec<u8>> {
        let cipher = self.cipher(key_id)?;
        let mut nonce = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce);

        let sealed = cipher
            .encrypt(
                (&nonce).into(),
                Payload {
                    msg: data_key,
                    aad: key_id.as_bytes(),
                },
            )
            .map_err(|e| Error::encryption_permanent(format!("Key wrap failed: {}", e)))?;

        let mut out = Vec::with_capacity(NONCE_SIZE + sealed.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&sealed);
        Ok(out)
    }

    async fn unwrap(&self, key_id: &str, wrapped: &[u8]) -> Result<Vec<u8>> {
        let cipher = self.cipher(key_id)?;
        if wrapped.len() <= NONCE_SIZE {
            return Err(Error::Integrity("Wrapped data key is truncated".to_string()));
        }
        let (nonce, sealed) = wrapped.split_at(NONCE_SIZE);

        cipher
            .decrypt(
                nonce.into(),
                Payload {
                    msg: sealed,
                    aad: key_id.as_bytes(),
                },
            )
            .map_err(|_| Error::Integrity(format!("Failed to unwrap data key under {}", key_id)))
    }
}
