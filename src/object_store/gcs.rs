use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;

use super::{validate_key, ObjectStore, ObjectStoreError};

const STORAGE_HOST: &str = "storage.googleapis.com";

/// Longest lifetime GCS accepts for a V4 signed URL.
const MAX_SIGNED_URL_TTL: Duration = Duration::from_secs(7 * 24 * 3600);

/// Google Cloud Storage object store backend.
pub struct GcsStore {
    client: Client,
    access_token: tokio::sync::RwLock<String>,
    service_account: Option<ServiceAccountKey>,
}

#[derive(Clone, Deserialize)]
struct ServiceAccountKey {
    client_email: String,
    private_key: String,
    token_uri: String,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

impl GcsStore {
    pub async fn new(credentials_file: Option<&str>) -> Result<Self, anyhow::Error> {
        let client = Client::builder().build()?;

        let service_account = match credentials_file {
            Some(path) => {
                let key_json = tokio::fs::read_to_string(path).await?;
                Some(serde_json::from_str::<ServiceAccountKey>(&key_json)?)
            }
            None => None,
        };

        let store = Self {
            client,
            access_token: tokio::sync::RwLock::new(String::new()),
            service_account,
        };

        store.refresh_token().await?;
        Ok(store)
    }

    async fn refresh_token(&self) -> Result<(), anyhow::Error> {
        let token = if let Some(ref key) = self.service_account {
            self.token_from_service_account(key).await?
        } else {
            self.token_from_metadata_server().await?
        };

        let mut lock = self.access_token.write().await;
        *lock = token;
        Ok(())
    }

    async fn token_from_service_account(
        &self,
        key: &ServiceAccountKey,
    ) -> Result<String, anyhow::Error> {
        let now = chrono::Utc::now().timestamp();
        let claims = serde_json::json!({
            "iss": key.client_email,
            "scope": "https://www.googleapis.com/auth/devstorage.read_write",
            "aud": key.token_uri,
            "iat": now,
            "exp": now + 3600,
        });

        // Build JWT (header.claims.signature)
        let header = base64_url_encode(&serde_json::to_vec(&serde_json::json!({
            "alg": "RS256",
            "typ": "JWT"
        }))?);
        let payload = base64_url_encode(&serde_json::to_vec(&claims)?);
        let unsigned = format!("{header}.{payload}");

        let signature = sign_rs256(unsigned.as_bytes(), &key.private_key)?;
        let jwt = format!("{unsigned}.{}", base64_url_encode(&signature));

        let resp: TokenResponse = self
            .client
            .post(&key.token_uri)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", &jwt),
            ])
            .send()
            .await?
            .json()
            .await?;

        Ok(resp.access_token)
    }

    async fn token_from_metadata_server(&self) -> Result<String, anyhow::Error> {
        let resp: TokenResponse = self
            .client
            .get("http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token")
            .header("Metadata-Flavor", "Google")
            .send()
            .await?
            .json()
            .await?;

        Ok(resp.access_token)
    }

    /// Send an authorized request, refreshing the access token once on a 401.
    async fn execute<F>(&self, build: F) -> Result<Response, ObjectStoreError>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        let token = self.access_token.read().await.clone();
        let resp = build(&self.client)
            .bearer_auth(&token)
            .send()
            .await
            .map_err(|e| ObjectStoreError::Backend(e.to_string()))?;

        if resp.status() != StatusCode::UNAUTHORIZED {
            return Ok(resp);
        }

        tracing::debug!("GCS access token rejected, refreshing");
        self.refresh_token()
            .await
            .map_err(|e| ObjectStoreError::Backend(format!("token refresh failed: {e}")))?;

        let token = self.access_token.read().await.clone();
        build(&self.client)
            .bearer_auth(&token)
            .send()
            .await
            .map_err(|e| ObjectStoreError::Backend(e.to_string()))
    }

    fn upload_url(bucket: &str, key: &str) -> String {
        format!(
            "https://{STORAGE_HOST}/upload/storage/v1/b/{bucket}/o?uploadType=media&name={}",
            urlencoding::encode(key)
        )
    }

    fn object_url(bucket: &str, key: &str) -> String {
        format!(
            "https://{STORAGE_HOST}/storage/v1/b/{bucket}/o/{}",
            urlencoding::encode(key)
        )
    }

    /// Build a V4 signed GET URL using the service account's private key.
    fn sign_url(
        &self,
        bucket: &str,
        key: &str,
        ttl: Duration,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<String, ObjectStoreError> {
        let account = self.service_account.as_ref().ok_or_else(|| {
            ObjectStoreError::Signing(
                "signed URLs require a service account (GCS_CREDENTIALS_FILE)".to_string(),
            )
        })?;

        let ttl = ttl.min(MAX_SIGNED_URL_TTL);
        let datetime = now.format("%Y%m%dT%H%M%SZ").to_string();
        let date = now.format("%Y%m%d").to_string();
        let scope = format!("{date}/auto/storage/goog4_request");
        let credential = format!("{}/{scope}", account.client_email);

        let path = key
            .split('/')
            .map(|seg| urlencoding::encode(seg).into_owned())
            .collect::<Vec<_>>()
            .join("/");
        let canonical_uri = format!("/{bucket}/{path}");

        // Parameters must be in sorted order.
        let query = format!(
            "X-Goog-Algorithm=GOOG4-RSA-SHA256&X-Goog-Credential={}&X-Goog-Date={datetime}&X-Goog-Expires={}&X-Goog-SignedHeaders=host",
            urlencoding::encode(&credential),
            ttl.as_secs(),
        );

        let canonical_request = format!(
            "GET\n{canonical_uri}\n{query}\nhost:{STORAGE_HOST}\n\nhost\nUNSIGNED-PAYLOAD"
        );
        let request_hash = hex_encode(
            ring::digest::digest(&ring::digest::SHA256, canonical_request.as_bytes()).as_ref(),
        );
        let string_to_sign = format!("GOOG4-RSA-SHA256\n{datetime}\n{scope}\n{request_hash}");

        let signature = sign_rs256(string_to_sign.as_bytes(), &account.private_key)
            .map_err(|e| ObjectStoreError::Signing(e.to_string()))?;

        Ok(format!(
            "https://{STORAGE_HOST}{canonical_uri}?{query}&X-Goog-Signature={}",
            hex_encode(&signature)
        ))
    }
}

#[async_trait]
impl ObjectStore for GcsStore {
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
        content_type: &str,
    ) -> Result<(), ObjectStoreError> {
        validate_key(key)?;
        let url = Self::upload_url(bucket, key);

        let resp = self
            .execute(|client| {
                client
                    .post(&url)
                    .header("Content-Type", content_type)
                    .body(data.clone())
            })
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(ObjectStoreError::Backend(format!(
                "GCS upload failed ({status}): {body}"
            )));
        }

        Ok(())
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<Bytes, ObjectStoreError> {
        let url = format!("{}?alt=media", Self::object_url(bucket, key));
        let resp = self.execute(|client| client.get(&url)).await?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Err(ObjectStoreError::NotFound(format!("{bucket}/{key}")));
        }

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(ObjectStoreError::Backend(format!(
                "GCS download failed ({status}): {body}"
            )));
        }

        let data = resp
            .bytes()
            .await
            .map_err(|e| ObjectStoreError::Backend(e.to_string()))?;

        Ok(data)
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<(), ObjectStoreError> {
        let url = Self::object_url(bucket, key);
        let resp = self.execute(|client| client.delete(&url)).await?;

        // 404 is fine -- object already gone
        if !resp.status().is_success() && resp.status() != StatusCode::NOT_FOUND {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(ObjectStoreError::Backend(format!(
                "GCS delete failed ({status}): {body}"
            )));
        }

        Ok(())
    }

    async fn exists(&self, bucket: &str, key: &str) -> Result<bool, ObjectStoreError> {
        let url = Self::object_url(bucket, key);
        let resp = self.execute(|client| client.get(&url)).await?;

        Ok(resp.status().is_success())
    }

    async fn presigned_url(
        &self,
        bucket: &str,
        key: &str,
        ttl: Duration,
    ) -> Result<String, ObjectStoreError> {
        validate_key(key)?;
        self.sign_url(bucket, key, ttl, chrono::Utc::now())
    }
}

fn base64_url_encode(data: &[u8]) -> String {
    use base64::Engine;
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(data)
}

fn hex_encode(data: &[u8]) -> String {
    data.iter().map(|b| format!("{b:02x}")).collect()
}

fn sign_rs256(data: &[u8], private_key_pem: &str) -> Result<Vec<u8>, anyhow::Error> {
    // Strip PEM headers and decode base64
    let der_b64: String = private_key_pem
        .lines()
        .filter(|line| !line.starts_with("-----"))
        .map(str::trim)
        .collect();
    let der = base64::Engine::decode(&base64::engine::general_purpose::STANDARD, &der_b64)?;

    let key_pair = ring::signature::RsaKeyPair::from_pkcs8(&der)
        .map_err(|e| anyhow::anyhow!("Failed to parse RSA key: {e}"))?;

    let mut signature = vec![0u8; key_pair.public().modulus_len()];
    key_pair
        .sign(
            &ring::signature::RSA_PKCS1_SHA256,
            &ring::rand::SystemRandom::new(),
            data,
            &mut signature,
        )
        .map_err(|e| anyhow::anyhow!("Failed to sign: {e}"))?;

    Ok(signature)
}
