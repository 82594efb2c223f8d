//! Cloud KMS contract tests

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::sync::Arc;
use std::time::Duration;
use strata_cloud_gcp::client::ApiClient;
use strata_cloud_gcp::{CloudKmsKeyWrapper, GcpAuth, KmsConfig};
use strata_runtime::KeyWrapper;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const KEY_ID: &str = "backup-master-key";
const RESOURCE: &str = "projects/strata/locations/global/keyRings/backups/cryptoKeys/master";

fn wrapper(server: &MockServer) -> CloudKmsKeyWrapper {
    let config = KmsConfig::parse(&format!("{}={}", KEY_ID, RESOURCE))
        .unwrap()
        .with_endpoint(server.uri());
    let client = ApiClient::new(Arc::new(GcpAuth::from_static_token("test-token")))
        .unwrap()
        .with_retries(3, Duration::from_millis(1));
    CloudKmsKeyWrapper::with_client(client, config)
}

#[tokio::test]
async fn test_wrap_binds_key_id_as_aad() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/v1/{}:encrypt", RESOURCE)))
        .and(header("authorization", "Bearer test-token"))
        .and(body_partial_json(serde_json::json!({
            "plaintext": STANDARD.encode([9u8; 32]),
            "additionalAuthenticatedData": STANDARD.encode(KEY_ID),
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "name": RESOURCE,
            "ciphertext": STANDARD.encode(b"wrapped-key"),
        })))
        .expect(1)
        .mount(&server)
        .await;

    let wrapped = wrapper(&server).wrap(KEY_ID, &[9u8; 32]).await.unwrap();
    assert_eq!(wrapped, b"wrapped-key");
}

#[tokio::test]
async fn test_unwrap_decodes_plaintext() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/v1/{}:decrypt", RESOURCE)))
        .and(body_partial_json(serde_json::json!({
            "ciphertext": STANDARD.encode(b"wrapped-key"),
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "plaintext": STANDARD.encode([9u8; 32]),
        })))
        .mount(&server)
        .await;

    let data_key = wrapper(&server).unwrap(KEY_ID, b"wrapped-key").await.unwrap();
    assert_eq!(data_key, vec![9u8; 32]);
}

#[tokio::test]
async fn test_unknown_key_id_fails_without_calling_kms() {
    let server = MockServer::start().await;

    let err = wrapper(&server).wrap("retired-key", &[0u8; 32]).await.unwrap_err();
    assert!(!err.is_retryable());
    assert!(err.to_string().contains("retired-key"));
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_permission_denied_is_permanent() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(403).set_body_string("cloudkms.cryptoKeyVersions.useToEncrypt denied"))
        .expect(1)
        .mount(&server)
        .await;

    let err = wrapper(&server).wrap(KEY_ID, &[0u8; 32]).await.unwrap_err();
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_unavailable_kms_is_retryable() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let err = wrapper(&server).unwrap(KEY_ID, b"wrapped").await.unwrap_err();
    assert!(err.is_retryable());
}
