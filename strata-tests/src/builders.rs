//! Builders for constructing test objects
//!
//! Fluent API for backup records and REST requests.

use axum::body::Body;
use chrono::{DateTime, Duration, Utc};
use http::{header, Request};
use serde_json::json;
use strata_runtime::Checksums;
use strata_storage::models::{backup_status, backup_type};
use strata_storage::BackupRecordModel;
use uuid::Uuid;

/// Builder for backup records in arbitrary states
pub struct BackupRecordBuilder {
    record: BackupRecordModel,
    retention_days: i64,
}

impl BackupRecordBuilder {
    /// Pending full backup of `teachlink` in `us-east-1`, 30-day retention
    pub fn new() -> Self {
        Self {
            record: BackupRecordModel::pending(backup_type::FULL, "teachlink", "us-east-1", 30),
            retention_days: 30,
        }
    }

    pub fn id(mut self, id: Uuid) -> Self {
        self.record.id = id;
        self
    }

    pub fn incremental(mut self) -> Self {
        self.record.backup_type = backup_type::INCREMENTAL.to_string();
        self
    }

    pub fn database(mut self, name: &str) -> Self {
        self.record.database_name = name.to_string();
        self
    }

    pub fn region(mut self, region: &str) -> Self {
        self.record.region = region.to_string();
        self
    }

    pub fn status(mut self, status: &str) -> Self {
        self.record.status = status.to_string();
        self
    }

    pub fn retention_days(mut self, days: i64) -> Self {
        self.retention_days = days;
        self.record.expires_at = self.record.created_at + Duration::days(days);
        self
    }

    /// Move creation time, keeping `expires_at = created_at + retention`
    pub fn created_at(mut self, at: DateTime<Utc>) -> Self {
        self.record.created_at = at;
        self.record.updated_at = at;
        self.record.expires_at = at + Duration::days(self.retention_days);
        self
    }

    pub fn updated_at(mut self, at: DateTime<Utc>) -> Self {
        self.record.updated_at = at;
        self
    }

    /// COMPLETED with checksums of `data`, not yet verified
    pub fn completed_with(mut self, data: &[u8]) -> Self {
        let checksums = Checksums::compute(data);
        self.record.status = backup_status::COMPLETED.to_string();
        self.record.checksum_md5 = Some(checksums.md5);
        self.record.checksum_sha256 = Some(checksums.sha256);
        self.record.backup_size_bytes = Some(data.len() as i64);
        self.record.completed_at = Some(self.record.created_at);
        self
    }

    /// COMPLETED and verified with checksums of `data`
    pub fn verified_with(self, data: &[u8]) -> Self {
        let mut builder = self.completed_with(data);
        builder.record.integrity_verified = true;
        builder.record.verified_at = builder.record.completed_at;
        builder
    }

    pub fn completed_at(mut self, at: DateTime<Utc>) -> Self {
        self.record.completed_at = Some(at);
        self
    }

    pub fn encrypted_key(mut self, key: &str) -> Self {
        self.record.encrypted_storage_key = Some(key.to_string());
        self
    }

    pub fn replicated_key(mut self, key: &str) -> Self {
        self.record.replicated_storage_key = Some(key.to_string());
        self
    }

    pub fn storage_key(mut self, key: &str) -> Self {
        self.record.storage_key = Some(key.to_string());
        self
    }

    pub fn build(self) -> BackupRecordModel {
        self.record
    }
}

impl Default for BackupRecordBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for requests against the REST surface
pub struct ApiRequestBuilder {
    method: http::Method,
    uri: String,
    body: Option<serde_json::Value>,
}

impl ApiRequestBuilder {
    pub fn get(uri: &str) -> Self {
        Self {
            method: http::Method::GET,
            uri: uri.to_string(),
            body: None,
        }
    }

    pub fn post(uri: &str) -> Self {
        Self {
            method: http::Method::POST,
            uri: uri.to_string(),
            body: None,
        }
    }

    /// `POST /backup/restore {backupRecordId}`
    pub fn restore(backup_id: Uuid) -> Self {
        Self::post("/backup/restore").json(json!({ "backupRecordId": backup_id }))
    }

    /// `POST /backup/test {backupRecordId}`
    pub fn recovery_test(backup_id: Uuid) -> Self {
        Self::post("/backup/test").json(json!({ "backupRecordId": backup_id }))
    }

    pub fn json(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn build(self) -> Request<Body> {
        let builder = Request::builder().method(self.method).uri(self.uri);
        match self.body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .expect("Failed to build request"),
            None => builder.body(Body::empty()).expect("Failed to build request"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_created_at_keeps_retention_invariant() {
        let at = Utc::now() - Duration::days(45);
        let record = BackupRecordBuilder::new().created_at(at).build();
        assert_eq!(record.expires_at, at + Duration::days(30));
    }

    #[test]
    fn test_verified_sets_checksums() {
        let record = BackupRecordBuilder::new().verified_with(b"dump").build();
        assert_eq!(record.status, backup_status::COMPLETED);
        assert!(record.integrity_verified);
        assert!(record.checksum_sha256.is_some());
        assert_eq!(record.backup_size_bytes, Some(4));
    }
}
