//! MD5 and SHA-256 content digests

use md5::Md5;
use sha2::{Digest, Sha256};
use std::path::Path;
use tokio::io::AsyncReadExt;

const READ_CHUNK: usize = 64 * 1024;

/// Hex-encoded digests of one payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checksums {
    pub md5: String,
    pub sha256: String,
}

impl Checksums {
    pub fn compute(data: &[u8]) -> Self {
        Self {
            md5: hex::encode(Md5::digest(data)),
            sha256: hex::encode(Sha256::digest(data)),
        }
    }

    /// Stream a file through both digests
    pub async fn compute_file(path: &Path) -> crate::Result<Self> {
        let mut file = tokio::fs::File::open(path).await?;
        let mut md5 = Md5::new();
        let mut sha256 = Sha256::new();
        let mut buf = vec![0u8; READ_CHUNK];

        loop {
            let n = file.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            md5.update(&buf[..n]);
            sha256.update(&buf[..n]);
        }

        Ok(Self {
            md5: hex::encode(md5.finalize()),
            sha256: hex::encode(sha256.finalize()),
        })
    }

    /// Compare against stored digests. Missing or empty expectations fail.
    pub fn verify(&self, expected_md5: Option<&str>, expected_sha256: Option<&str>) -> crate::Result<()> {
        let (expected_md5, expected_sha256) = match (expected_md5, expected_sha256) {
            (Some(md5), Some(sha)) if !md5.is_empty() && !sha.is_empty() => (md5, sha),
            _ => {
                return Err(crate::Error::Integrity(
                    "Stored checksums are missing".to_string(),
                ))
            }
        };

        let mut mismatches = Vec::new();
        if !self.md5.eq_ignore_ascii_case(expected_md5) {
            mismatches.push(format!("md5 expected {} got {}", expected_md5, self.md5));
        }
        if !self.sha256.eq_ignore_ascii_case(expected_sha256) {
            mismatches.push(format!(
                "sha256 expected {} got {}",
                expected_sha256, self.sha256
            ));
        }

        if mismatches.is_empty() {
            Ok(())
        } else {
            Err(crate::Error::Integrity(format!(
                "Checksum mismatch: {}",
                mismatches.join("; ")
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_digests() {
        let sums = Checksums::compute(b"abc");
        assert_eq!(sums.md5, "900150983cd24fb0d6963f7d28e17f72");
        assert_eq!(
            sums.sha256,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[tokio::test]
    async fn test_file_matches_in_memory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dump");
        let data: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        tokio::fs::write(&path, &data).await.unwrap();

        let from_file = Checksums::compute_file(&path).await.unwrap();
        assert_eq!(from_file, Checksums::compute(&data));
    }

    #[test]
    fn test_verify_reports_mismatch() {
        let sums = Checksums::compute(b"payload");
        assert!(sums.verify(Some(&sums.md5), Some(&sums.sha256)).is_ok());

        let other = Checksums::compute(b"tampered");
        let err = sums
            .verify(Some(&sums.md5), Some(&other.sha256))
            .unwrap_err();
        assert!(matches!(err, crate::Error::Integrity(ref m) if m.contains("sha256")));
    }

    #[test]
    fn test_verify_requires_stored_digests() {
        let sums = Checksums::compute(b"payload");
        assert!(sums.verify(None, Some(&sums.sha256)).is_err());
        assert!(sums.verify(Some(""), Some(&sums.sha256)).is_err());
    }
}
