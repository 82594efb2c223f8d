//! Envelope encryption
//!
//! Each payload is sealed with a fresh 256-bit data key under
//! ChaCha20-Poly1305. The data key is wrapped by a [`KeyWrapper`] (local
//! master key or Cloud KMS) and stored in the header next to the key id:
//!
//! ```text
//! "STRE" | version:u8 | key_id_len:u16 | key_id | wrapped_len:u16 | wrapped_key | nonce:12 | ciphertext
//! ```
//!
//! Everything before the nonce is authenticated as associated data.

use crate::services::EncryptionService;
use crate::{Error, Result};
use async_trait::async_trait;
use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::ChaCha20Poly1305;
use rand::rngs::OsRng;
use rand::RngCore;

const MAGIC: &[u8; 4] = b"STRE";
const VERSION: u8 = 1;
const NONCE_SIZE: usize = 12;
const DATA_KEY_SIZE: usize = 32;
const TAG_SIZE: usize = 16;

/// Wraps and unwraps data keys under a named master key
#[async_trait]
pub trait KeyWrapper: Send + Sync {
    async fn wrap(&self, key_id: &str, data_key: &[u8]) -> Result<Vec<u8>>;

    async fn unwrap(&self, key_id: &str, wrapped: &[u8]) -> Result<Vec<u8>>;
}

pub struct EnvelopeEncryption<W> {
    wrapper: W,
}

impl<W: KeyWrapper> EnvelopeEncryption<W> {
    pub fn new(wrapper: W) -> Self {
        Self { wrapper }
    }
}

struct Header<'a> {
    key_id: &'a str,
    wrapped_key: &'a [u8],
    /// Header bytes up to (not including) the nonce
    aad: &'a [u8],
    nonce: &'a [u8],
    ciphertext: &'a [u8],
}

fn encode_header(key_id: &str, wrapped_key: &[u8]) -> Result<Vec<u8>> {
    let key_id_len = u16::try_from(key_id.len())
        .map_err(|_| Error::encryption_permanent("Key id too long"))?;
    let wrapped_len = u16::try_from(wrapped_key.len())
        .map_err(|_| Error::encryption_permanent("Wrapped key too long"))?;

    let mut out = Vec::with_capacity(4 + 1 + 2 + key_id.len() + 2 + wrapped_key.len());
    out.extend_from_slice(MAGIC);
    out.push(VERSION);
    out.extend_from_slice(&key_id_len.to_be_bytes());
    out.extend_from_slice(key_id.as_bytes());
    out.extend_from_slice(&wrapped_len.to_be_bytes());
    out.extend_from_slice(wrapped_key);
    Ok(out)
}

fn truncated() -> Error {
    Error::Integrity("Encrypted envelope is truncated".to_string())
}

fn read_u16(data: &[u8], at: usize) -> Result<usize> {
    let bytes = data.get(at..at + 2).ok_or_else(truncated)?;
    Ok(u16::from_be_bytes([bytes[0], bytes[1]]) as usize)
}

fn parse_header(data: &[u8]) -> Result<Header<'_>> {
    if data.len() < MAGIC.len() + 1 || &data[..MAGIC.len()] != MAGIC {
        return Err(Error::Integrity(
            "Encrypted envelope has an unknown format".to_string(),
        ));
    }
    if data[4] != VERSION {
        return Err(Error::Integrity(format!(
            "Unsupported envelope version {}",
            data[4]
        )));
    }

    let mut pos = 5;
    let key_id_len = read_u16(data, pos)?;
    pos += 2;
    let key_id = data.get(pos..pos + key_id_len).ok_or_else(truncated)?;
    let key_id = std::str::from_utf8(key_id)
        .map_err(|_| Error::Integrity("Envelope key id is not UTF-8".to_string()))?;
    pos += key_id_len;

    let wrapped_len = read_u16(data, pos)?;
    pos += 2;
    let wrapped_key = data.get(pos..pos + wrapped_len).ok_or_else(truncated)?;
    pos += wrapped_len;

    let aad = &data[..pos];
    let nonce = data.get(pos..pos + NONCE_SIZE).ok_or_else(truncated)?;
    pos += NONCE_SIZE;

    let ciphertext = &data[pos..];
    if ciphertext.len() < TAG_SIZE {
        return Err(truncated());
    }

    Ok(Header {
        key_id,
        wrapped_key,
        aad,
        nonce,
        ciphertext,
    })
}

#[async_trait]
impl<W: KeyWrapper> EncryptionService for EnvelopeEncryption<W> {
    async fn encrypt(&self, key_id: &str, plaintext: &[u8]) -> Result<Vec<u8>> {
        let mut data_key = [0u8; DATA_KEY_SIZE];
        let mut nonce = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut data_key);
        OsRng.fill_bytes(&mut nonce);

        let wrapped = self.wrapper.wrap(key_id, &data_key).await?;
        let header = encode_header(key_id, &wrapped)?;

        let cipher = ChaCha20Poly1305::new((&data_key).into());
        let sealed = cipher
            .encrypt(
                (&nonce).into(),
                Payload {
                    msg: plaintext,
                    aad: &header,
                },
            )
            .map_err(|e| Error::encryption_permanent(format!("Encryption failed: {}", e)))?;

        let mut out = header;
        out.reserve(NONCE_SIZE + sealed.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&sealed);
        Ok(out)
    }

    async fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>> {
        let header = parse_header(ciphertext)?;
        let data_key = self.wrapper.unwrap(header.key_id, header.wrapped_key).await?;
        if data_key.len() != DATA_KEY_SIZE {
            return Err(Error::Integrity(format!(
                "Unwrapped data key has length {}",
                data_key.len()
            )));
        }

        let cipher = ChaCha20Poly1305::new(data_key.as_slice().into());
        cipher
            .decrypt(
                header.nonce.into(),
                Payload {
                    msg: header.ciphertext,
                    aad: header.aad,
                },
            )
            .map_err(|_| {
                Error::Integrity("Decryption failed: envelope is corrupted or tampered".to_string())
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local::LocalKeyWrapper;

    fn envelope() -> EnvelopeEncryption<LocalKeyWrapper> {
        EnvelopeEncryption::new(LocalKeyWrapper::new([(
            "backup-master-key".to_string(),
            [7u8; 32],
        )]))
    }

    #[tokio::test]
    async fn test_decrypt_recovers_plaintext() {
        let enc = envelope();
        let sealed = enc.encrypt("backup-master-key", b"pg_dump archive").await.unwrap();
        assert_eq!(&sealed[..4], b"STRE");
        assert_eq!(enc.decrypt(&sealed).await.unwrap(), b"pg_dump archive");
    }

    #[tokio::test]
    async fn test_fresh_data_key_per_payload() {
        let enc = envelope();
        let a = enc.encrypt("backup-master-key", b"same").await.unwrap();
        let b = enc.encrypt("backup-master-key", b"same").await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_tampered_ciphertext_is_integrity_error() {
        let enc = envelope();
        let mut sealed = enc.encrypt("backup-master-key", b"payload").await.unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0x01;
        assert!(matches!(
            enc.decrypt(&sealed).await,
            Err(Error::Integrity(_))
        ));
    }

    #[tokio::test]
    async fn test_truncated_envelope_is_integrity_error() {
        let enc = envelope();
        let sealed = enc.encrypt("backup-master-key", b"payload").await.unwrap();
        for len in [0, 3, 10, sealed.len() - 17] {
            assert!(matches!(
                enc.decrypt(&sealed[..len]).await,
                Err(Error::Integrity(_))
            ));
        }
    }

    #[tokio::test]
    async fn test_unknown_key_id_is_rejected() {
        let enc = envelope();
        let err = enc.encrypt("other-key", b"payload").await.unwrap_err();
        assert!(!err.is_retryable());
    }
}
