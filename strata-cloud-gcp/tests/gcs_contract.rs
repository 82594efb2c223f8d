//! Cloud Storage contract tests
//!
//! Verify the JSON API requests the adapter makes (bucket per region,
//! percent-encoded object names, rewrite continuation) and how responses
//! are classified for the pipeline's retry logic.

use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use strata_cloud_gcp::client::ApiClient;
use strata_cloud_gcp::{GcpAuth, GcsConfig, GcsObjectStorage};
use strata_runtime::ObjectStorage;
use wiremock::matchers::{body_bytes, header, method, path, path_regex, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ENCRYPTED_KEY: &str = "backups/us-east-1/teachlink/5f0c.enc";

fn storage(server: &MockServer) -> GcsObjectStorage {
    let config = GcsConfig::parse("us-east-1=strata-east,us-west-2=strata-west", "us-east-1")
        .unwrap()
        .with_endpoint(server.uri());
    let client = ApiClient::new(Arc::new(GcpAuth::from_static_token("test-token")))
        .unwrap()
        .with_retries(3, Duration::from_millis(1));
    GcsObjectStorage::with_client(client, config)
}

#[tokio::test]
async fn test_put_uploads_to_region_bucket() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/upload/storage/v1/b/strata-east/o"))
        .and(query_param("uploadType", "media"))
        .and(query_param("name", ENCRYPTED_KEY))
        .and(header("authorization", "Bearer test-token"))
        .and(header("content-type", "application/octet-stream"))
        .and(body_bytes(b"sealed".to_vec()))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "bucket": "strata-east",
            "name": ENCRYPTED_KEY
        })))
        .expect(1)
        .mount(&server)
        .await;

    let key = storage(&server)
        .put(ENCRYPTED_KEY, Bytes::from_static(b"sealed"), "application/octet-stream")
        .await
        .unwrap();
    assert_eq!(key, ENCRYPTED_KEY);
}

#[tokio::test]
async fn test_get_downloads_media() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/storage/v1/b/strata-east/o/backups%2F.*5f0c\.enc$"))
        .and(query_param("alt", "media"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"sealed".to_vec()))
        .mount(&server)
        .await;

    let bytes = storage(&server).get(ENCRYPTED_KEY).await.unwrap();
    assert_eq!(bytes, Bytes::from_static(b"sealed"));
}

#[tokio::test]
async fn test_missing_object_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404).set_body_string("No such object"))
        .expect(1)
        .mount(&server)
        .await;

    let err = storage(&server).get(ENCRYPTED_KEY).await.unwrap_err();
    assert!(err.is_not_found());
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_copy_rewrites_into_secondary_bucket() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path_regex(
            r"^/storage/v1/b/strata-east/o/backups%2F.*/rewriteTo/b/strata-west/o/replicas%2Fus-west-2%2Fbackups%2F.*$",
        ))
        .and(query_param("rewriteToken", "round-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "done": true,
            "totalBytesRewritten": "6"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path_regex(r"/rewriteTo/b/strata-west/o/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "done": false,
            "rewriteToken": "round-1"
        })))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;

    let replica = storage(&server)
        .copy(ENCRYPTED_KEY, "us-west-2")
        .await
        .unwrap();
    assert_eq!(replica, format!("replicas/us-west-2/{}", ENCRYPTED_KEY));
}

#[tokio::test]
async fn test_copy_to_unconfigured_region_is_permanent() {
    let server = MockServer::start().await;

    let err = storage(&server)
        .copy(ENCRYPTED_KEY, "eu-west-1")
        .await
        .unwrap_err();
    assert!(!err.is_retryable());
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_server_errors_are_retried() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .respond_with(ResponseTemplate::new(503).set_body_string("backend error"))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    storage(&server).delete(ENCRYPTED_KEY).await.unwrap();
}

#[tokio::test]
async fn test_exhausted_retries_stay_retryable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;

    let err = storage(&server).get(ENCRYPTED_KEY).await.unwrap_err();
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_rate_limit_honors_retry_after() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "0"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"sealed".to_vec()))
        .mount(&server)
        .await;

    let bytes = storage(&server).get(ENCRYPTED_KEY).await.unwrap();
    assert_eq!(bytes.len(), 6);
}

#[tokio::test]
async fn test_permission_denied_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(403).set_body_string("storage.objects.create denied"))
        .expect(1)
        .mount(&server)
        .await;

    let err = storage(&server)
        .put(ENCRYPTED_KEY, Bytes::from_static(b"x"), "application/octet-stream")
        .await
        .unwrap_err();
    assert!(!err.is_retryable());
    assert!(err.to_string().contains("denied"));
}
