//! Custom assertions for pipeline invariants and REST responses

use axum::body::Body;
use chrono::Duration;
use http::Response;
use http_body_util::BodyExt;
use serde_json::Value;
use strata_storage::models::backup_status;
use strata_storage::BackupRecordModel;

/// `integrity_verified ⇒ COMPLETED with non-empty checksums`
pub fn assert_verification_gating(records: &[BackupRecordModel]) {
    for record in records {
        if !record.integrity_verified {
            continue;
        }
        assert_eq!(
            record.status,
            backup_status::COMPLETED,
            "Verified backup {} has status {}",
            record.id,
            record.status
        );
        assert!(
            record.checksum_md5.as_deref().map_or(false, |s| !s.is_empty()),
            "Verified backup {} has no MD5",
            record.id
        );
        assert!(
            record
                .checksum_sha256
                .as_deref()
                .map_or(false, |s| !s.is_empty()),
            "Verified backup {} has no SHA-256",
            record.id
        );
    }
}

/// `expires_at == created_at + retention_days`
pub fn assert_retention_invariant(record: &BackupRecordModel, retention_days: i64) {
    assert_eq!(
        record.expires_at,
        record.created_at + Duration::days(retention_days),
        "Backup {} expiry does not match its retention window",
        record.id
    );
}

/// No key in `keys` mentions the backup id
pub fn assert_no_objects_for(keys: &[String], record: &BackupRecordModel) {
    let id = record.id.to_string();
    let leftovers: Vec<_> = keys.iter().filter(|k| k.contains(&id)).collect();
    assert!(
        leftovers.is_empty(),
        "Objects left behind for backup {}: {:?}",
        record.id,
        leftovers
    );
}

/// Response assertion helpers
pub struct ResponseAssertions {
    response: Response<Body>,
}

impl ResponseAssertions {
    pub fn new(response: Response<Body>) -> Self {
        Self { response }
    }

    pub fn status(&self) -> http::StatusCode {
        self.response.status()
    }

    /// Assert the status code equals expected
    pub fn assert_status(self, expected: http::StatusCode) -> Self {
        assert_eq!(
            self.response.status(),
            expected,
            "Expected status {} but got {}",
            expected,
            self.response.status()
        );
        self
    }

    pub fn assert_ok(self) -> Self {
        self.assert_status(http::StatusCode::OK)
    }

    pub fn assert_accepted(self) -> Self {
        self.assert_status(http::StatusCode::ACCEPTED)
    }

    pub fn assert_bad_request(self) -> Self {
        self.assert_status(http::StatusCode::BAD_REQUEST)
    }

    pub fn assert_not_found(self) -> Self {
        self.assert_status(http::StatusCode::NOT_FOUND)
    }

    pub fn assert_conflict(self) -> Self {
        self.assert_status(http::StatusCode::CONFLICT)
    }

    /// Consume the response and parse its body as JSON
    pub async fn into_json(self) -> Value {
        let bytes = self
            .response
            .into_body()
            .collect()
            .await
            .expect("Failed to read body")
            .to_bytes();
        serde_json::from_slice(&bytes).expect("Response body is not JSON")
    }
}

/// Assert a string is a valid UUID
pub fn assert_valid_uuid(s: &str) {
    assert!(uuid::Uuid::parse_str(s).is_ok(), "Invalid UUID: {}", s);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builders::BackupRecordBuilder;

    #[test]
    fn test_gating_accepts_verified_completed() {
        let record = BackupRecordBuilder::new().verified_with(b"dump").build();
        assert_verification_gating(&[record]);
    }

    #[test]
    #[should_panic(expected = "has status")]
    fn test_gating_rejects_verified_failed() {
        let record = BackupRecordBuilder::new()
            .verified_with(b"dump")
            .status(backup_status::FAILED)
            .build();
        assert_verification_gating(&[record]);
    }
}
