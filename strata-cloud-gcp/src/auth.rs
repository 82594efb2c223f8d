//! GCP authentication and OAuth2 access tokens
//!
//! Supports three authentication modes:
//! - **Workload Identity** (recommended on GCE/GKE/Cloud Run): uses the metadata server
//! - **Service Account JSON**: signs a JWT assertion with a key file (local development)
//! - **Static token**: a fixed bearer token for storage emulators

use crate::metrics::TOKEN_ACQUISITION_DURATION;
use crate::{Error, Result};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Scope covering Cloud Storage and Cloud KMS
pub const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";

/// GCE metadata server URL for Workload Identity
const METADATA_SERVER_URL: &str = "http://metadata.google.internal";

const DEFAULT_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Header required for metadata server requests
const METADATA_FLAVOR_HEADER: &str = "Metadata-Flavor";
const METADATA_FLAVOR_VALUE: &str = "Google";

/// Tokens are refreshed this long before they expire
const EXPIRY_MARGIN_SECS: u64 = 300;

/// Service account credentials from GCP
#[derive(Debug, Clone, Deserialize)]
struct ServiceAccountCredentials {
    #[serde(rename = "type")]
    account_type: String,
    private_key_id: String,
    private_key: String,
    client_email: String,
    #[serde(default)]
    token_uri: Option<String>,
}

/// OAuth2 access token with expiration
#[derive(Debug, Clone)]
struct AccessToken {
    token: String,
    expires_at: Instant,
}

impl AccessToken {
    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// Response from OAuth2 token endpoint
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
    token_type: String,
}

/// JWT claims for OAuth2 service account assertion
#[derive(Debug, Serialize)]
struct OAuth2Claims {
    iss: String,
    scope: String,
    aud: String,
    exp: u64,
    iat: u64,
}

#[derive(Debug, Clone)]
enum AuthMode {
    ServiceAccount(ServiceAccountCredentials),
    MetadataServer {
        base_url: String,
        service_account_email: String,
    },
    Static(String),
}

/// OAuth2 access tokens for calling Cloud Storage and Cloud KMS
pub struct GcpAuth {
    auth_mode: AuthMode,
    http_client: reqwest::Client,
    access_token_cache: RwLock<Option<AccessToken>>,
}

impl GcpAuth {
    /// Create a new GCP auth from service account JSON
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON cannot be parsed or is not a service account key
    pub fn from_service_account_json(service_account_json: &str) -> Result<Self> {
        let credentials: ServiceAccountCredentials = serde_json::from_str(service_account_json)
            .map_err(|e| Error::Auth(format!("Failed to parse service account JSON: {}", e)))?;

        if credentials.account_type != "service_account" {
            return Err(Error::Auth(format!(
                "Invalid account type: expected 'service_account', got '{}'",
                credentials.account_type
            )));
        }

        Ok(Self {
            auth_mode: AuthMode::ServiceAccount(credentials),
            http_client: http_client(Duration::from_secs(30))?,
            access_token_cache: RwLock::new(None),
        })
    }

    /// Create a new GCP auth using the GCE metadata server (Workload Identity)
    ///
    /// # Errors
    ///
    /// Returns an error if the metadata server is not available
    pub async fn from_metadata_server() -> Result<Self> {
        Self::from_metadata_server_at(METADATA_SERVER_URL).await
    }

    /// Metadata-server auth against an explicit base URL
    pub async fn from_metadata_server_at(base_url: &str) -> Result<Self> {
        let http_client = http_client(Duration::from_secs(5))?;
        let base_url = base_url.trim_end_matches('/').to_string();

        let email_url = format!(
            "{}/computeMetadata/v1/instance/service-accounts/default/email",
            base_url
        );
        let response = http_client
            .get(&email_url)
            .header(METADATA_FLAVOR_HEADER, METADATA_FLAVOR_VALUE)
            .send()
            .await
            .map_err(|e| {
                Error::Auth(format!(
                    "Failed to connect to metadata server (not running on GCP?): {}",
                    e
                ))
            })?;

        if !response.status().is_success() {
            return Err(Error::Auth(format!(
                "Metadata server returned status {}",
                response.status()
            )));
        }

        let service_account_email = response.text().await.map_err(|e| {
            Error::Auth(format!(
                "Failed to read service account email from metadata: {}",
                e
            ))
        })?;

        info!(
            service_account = %service_account_email,
            "Initialized GCP auth via metadata server (Workload Identity)"
        );

        Ok(Self {
            auth_mode: AuthMode::MetadataServer {
                base_url,
                service_account_email,
            },
            http_client,
            access_token_cache: RwLock::new(None),
        })
    }

    /// Fixed bearer token, for storage emulators that accept any token
    pub fn from_static_token(token: impl Into<String>) -> Self {
        Self {
            auth_mode: AuthMode::Static(token.into()),
            http_client: reqwest::Client::new(),
            access_token_cache: RwLock::new(None),
        }
    }

    /// Auto-detect authentication method
    ///
    /// Tries the following in order:
    /// 1. GCE metadata server (Workload Identity)
    /// 2. Service account JSON from `GCP_SERVICE_ACCOUNT_KEY_JSON` env var
    /// 3. Service account JSON from `GOOGLE_APPLICATION_CREDENTIALS` file
    pub async fn auto() -> Result<Self> {
        debug!("Attempting GCP auth via metadata server");
        match Self::from_metadata_server().await {
            Ok(auth) => {
                info!("Using GCP Workload Identity (metadata server)");
                return Ok(auth);
            }
            Err(e) => {
                debug!(error = %e, "Metadata server not available, trying service account");
            }
        }

        if let Ok(json) = std::env::var("GCP_SERVICE_ACCOUNT_KEY_JSON") {
            debug!("Attempting GCP auth via GCP_SERVICE_ACCOUNT_KEY_JSON env var");
            match Self::from_service_account_json(&json) {
                Ok(auth) => {
                    info!("Using GCP service account from GCP_SERVICE_ACCOUNT_KEY_JSON");
                    return Ok(auth);
                }
                Err(e) => {
                    warn!(error = %e, "Failed to parse GCP_SERVICE_ACCOUNT_KEY_JSON");
                }
            }
        }

        if let Ok(path) = std::env::var("GOOGLE_APPLICATION_CREDENTIALS") {
            debug!(path = %path, "Attempting GCP auth via GOOGLE_APPLICATION_CREDENTIALS file");
            match std::fs::read_to_string(&path) {
                Ok(json) => match Self::from_service_account_json(&json) {
                    Ok(auth) => {
                        info!(path = %path, "Using GCP service account from GOOGLE_APPLICATION_CREDENTIALS");
                        return Ok(auth);
                    }
                    Err(e) => {
                        warn!(error = %e, path = %path, "Failed to parse service account file");
                    }
                },
                Err(e) => {
                    warn!(error = %e, path = %path, "Failed to read GOOGLE_APPLICATION_CREDENTIALS file");
                }
            }
        }

        Err(Error::Auth(
            "No GCP authentication available. On GCP, ensure the workload has a service account. \
             For local development, set GCP_SERVICE_ACCOUNT_KEY_JSON or GOOGLE_APPLICATION_CREDENTIALS."
                .to_string(),
        ))
    }

    /// The identity requests are made as, if known
    pub fn service_account_email(&self) -> Option<&str> {
        match &self.auth_mode {
            AuthMode::ServiceAccount(creds) => Some(&creds.client_email),
            AuthMode::MetadataServer {
                service_account_email,
                ..
            } => Some(service_account_email),
            AuthMode::Static(_) => None,
        }
    }

    /// Get an OAuth2 access token for calling GCP APIs
    ///
    /// Uses the cached token until five minutes before it expires.
    pub async fn get_access_token(&self, scope: &str) -> Result<String> {
        if let AuthMode::Static(token) = &self.auth_mode {
            return Ok(token.clone());
        }

        {
            let cache = self.access_token_cache.read().await;
            if let Some(token) = cache.as_ref() {
                if !token.is_expired() {
                    let _timer = TOKEN_ACQUISITION_DURATION
                        .with_label_values(&["true"])
                        .start_timer();
                    return Ok(token.token.clone());
                }
            }
        }

        let _timer = TOKEN_ACQUISITION_DURATION
            .with_label_values(&["false"])
            .start_timer();

        debug!(scope = %scope, "Fetching new OAuth2 access token");
        let token = match &self.auth_mode {
            AuthMode::ServiceAccount(creds) => self.fetch_access_token_via_jwt(creds, scope).await?,
            AuthMode::MetadataServer { base_url, .. } => {
                self.fetch_access_token_from_metadata(base_url).await?
            }
            AuthMode::Static(token) => return Ok(token.clone()),
        };

        *self.access_token_cache.write().await = Some(token.clone());
        Ok(token.token)
    }

    /// Metadata server ignores scopes and returns a token with everything
    /// granted to the attached service account
    async fn fetch_access_token_from_metadata(&self, base_url: &str) -> Result<AccessToken> {
        let url = format!(
            "{}/computeMetadata/v1/instance/service-accounts/default/token",
            base_url
        );

        let response = self
            .http_client
            .get(&url)
            .header(METADATA_FLAVOR_HEADER, METADATA_FLAVOR_VALUE)
            .send()
            .await
            .map_err(|e| Error::Auth(format!("Failed to fetch access token from metadata: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::Auth(format!(
                "Metadata server returned status {} for access token",
                response.status()
            )));
        }

        let token_response: TokenResponse = response.json().await.map_err(|e| {
            Error::Auth(format!(
                "Failed to parse token response from metadata: {}",
                e
            ))
        })?;
        Ok(into_access_token(token_response, "metadata server"))
    }

    async fn fetch_access_token_via_jwt(
        &self,
        credentials: &ServiceAccountCredentials,
        scope: &str,
    ) -> Result<AccessToken> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| Error::Internal(format!("System time error: {}", e)))?
            .as_secs();
        let token_url = credentials
            .token_uri
            .clone()
            .unwrap_or_else(|| DEFAULT_TOKEN_URL.to_string());

        let claims = OAuth2Claims {
            iss: credentials.client_email.clone(),
            scope: scope.to_string(),
            aud: token_url.clone(),
            iat: now,
            exp: now + 3600,
        };

        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(credentials.private_key_id.clone());

        let encoding_key = EncodingKey::from_rsa_pem(credentials.private_key.as_bytes())
            .map_err(|e| Error::Auth(format!("Failed to parse private key: {}", e)))?;

        let assertion = encode(&header, &claims, &encoding_key)
            .map_err(|e| Error::Auth(format!("Failed to encode JWT assertion: {}", e)))?;

        let params = [
            ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
            ("assertion", assertion.as_str()),
        ];
        let response = self
            .http_client
            .post(&token_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| Error::Auth(format!("Failed to request access token: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Auth(format!(
                "Token endpoint returned {}: {}",
                status, body
            )));
        }

        let token_response: TokenResponse = response
            .json()
            .await
            .map_err(|e| Error::Auth(format!("Failed to parse token response: {}", e)))?;
        Ok(into_access_token(token_response, "JWT assertion"))
    }
}

fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| Error::Auth(format!("Failed to create HTTP client: {}", e)))
}

fn into_access_token(response: TokenResponse, source: &str) -> AccessToken {
    let expires_in = response.expires_in.saturating_sub(EXPIRY_MARGIN_SECS);
    debug!(
        token_type = %response.token_type,
        expires_in_seconds = expires_in,
        source = source,
        "OAuth2 access token acquired"
    );
    AccessToken {
        token: response.access_token,
        expires_at: Instant::now() + Duration::from_secs(expires_in),
    }
}
